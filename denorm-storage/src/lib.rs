//! Denorm Storage - Normalized Repository Implementations
//!
//! Concrete accessors for the normalized repository the cache reads:
//! an in-memory repository with atomic snapshot replacement, and an adapter
//! that locates schema partitions inside a JSON application store.

pub mod json_store;
pub mod memory;

pub use json_store::{parse_entity, JsonStoreRepository, JsonStoreSource, SchemaPaths};
pub use memory::{InMemoryRepository, SharedRepository};
