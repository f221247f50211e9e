//! Read-side contract of the normalized repository.
//!
//! The repository is owned and mutated elsewhere. The cache only reads it, and
//! reads exactly one snapshot per top-level call.

use crate::{Descriptor, DenormResult, EntityId, NormalizedEntity, SchemaName, StatusToken};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Storage partition of one schema: every stored entity keyed by id.
pub type Partition = BTreeMap<EntityId, Arc<NormalizedEntity>>;

/// Accessor into a normalized repository snapshot.
pub trait NormalizedRepository: Send + Sync {
    /// Current normalized entity for a descriptor, or `None` if absent.
    fn entity(&self, descriptor: &Descriptor) -> Option<Arc<NormalizedEntity>>;

    /// Current storage partition for a schema, or `None` if the schema has
    /// no partition at all.
    fn partition(&self, schema: &SchemaName) -> Option<&Partition>;

    /// Current status token of a descriptor's entity.
    fn status_token(&self, descriptor: &Descriptor) -> Option<StatusToken> {
        self.entity(descriptor).map(|entity| entity.status.token.clone())
    }
}

/// Provider of the latest repository snapshot.
///
/// Lets a denormalizer find storage on its own instead of receiving it on
/// every call.
pub trait RepositorySource: Send + Sync {
    fn snapshot(&self) -> DenormResult<Arc<dyn NormalizedRepository>>;
}
