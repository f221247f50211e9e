//! Denorm Cache - Incremental Denormalization
//!
//! Memoizes denormalized entities and collections across calls. Each cached
//! entity remembers its own status token and, per relationship, the reference
//! and the status token of every target it was computed against. On the next
//! call only the relationships whose inputs changed are re-expanded; everything
//! else is reused by reference, so consumers can detect "unchanged" with
//! [`Arc::ptr_eq`](std::sync::Arc::ptr_eq).
//!
//! ```ignore
//! let denorm = Denormalizer::new(CacheHandle::new());
//! let article = denorm.denormalize_item(&ItemInput::reference("1", "articles"), None, &repo)?;
//! let again = denorm.denormalize_item(&ItemInput::reference("1", "articles"), None, &repo)?;
//! assert!(Arc::ptr_eq(&article, &again));
//! ```

pub mod denormalizer;
pub mod descriptor;
pub mod resolver;
pub mod store;

pub use denormalizer::Denormalizer;
pub use descriptor::{build_collection_descriptor, build_item_descriptor, CollectionInput, ItemInput};
pub use resolver::{
    observe_relationship, observe_relationships, CacheResolver, CollectionResolution,
    MemberResolution, Membership, Resolution, ResolutionKind,
};
pub use store::{CacheEntry, CacheHandle, CacheStats, CollectionRecord, DenormalizationCache};

// Re-export the shared data model so most callers need one dependency.
pub use denorm_core::*;
