//! Denorm Core - Entity Types and Boundary Contracts
//!
//! Data model shared by every denorm crate: descriptors, normalized and
//! denormalized entities, status metadata, the error taxonomy, configuration,
//! and the narrow traits through which the cache consumes the repository, the
//! graph denormalizer and the status stamper.

mod config;
mod entities;
mod error;
mod graph;
mod identity;
mod repository;
mod status;

pub use config::{CyclePolicy, DenormConfig};
pub use entities::{
    Attributes, CollectionDescriptor, CollectionKey, CollectionStatus, DenormalizedCollection,
    DenormalizedEntity, DenormalizedRelationship, EntityStatus, Node, NormalizedEntity,
    ObservedRelationship, ObservedStatuses, RelationshipRef, StatusMeta,
};
pub use error::{
    ConfigError, DenormError, DenormResult, DescriptorError, ResolutionError, StorageError,
};
pub use graph::{GraphDenormalizer, Nested, NestedResolver, StandardGraphDenormalizer};
pub use identity::{Descriptor, EntityId, SchemaName, StatusToken, Timestamp};
pub use repository::{NormalizedRepository, Partition, RepositorySource};
pub use status::{DefaultStatusStamper, StatusStamper};
