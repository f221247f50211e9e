//! Denormalization cache store.
//!
//! One [`CacheEntry`] per descriptor and one [`CollectionRecord`] per
//! collection key. Entries are replaced wholesale on recomputation and only
//! ever removed by [`DenormalizationCache::flush`]; there is no eviction.

use chrono::Utc;
use denorm_core::{
    CollectionKey, DenormError, DenormResult, DenormalizedCollection, DenormalizedEntity,
    Descriptor, ObservedStatuses, StatusToken, StorageError, Timestamp,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Last computed value of one entity plus what it was computed against.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub descriptor: Descriptor,
    pub value: Arc<DenormalizedEntity>,
    /// The entity's own status token at computation time.
    pub own_status: StatusToken,
    /// Per relationship: the reference and each target's token.
    pub observed: ObservedStatuses,
    pub cached_at: Timestamp,
}

impl CacheEntry {
    pub fn new(
        descriptor: Descriptor,
        value: Arc<DenormalizedEntity>,
        own_status: StatusToken,
        observed: ObservedStatuses,
    ) -> Self {
        Self {
            descriptor,
            value,
            own_status,
            observed,
            cached_at: Utc::now(),
        }
    }
}

/// Last computed value of one collection, including its exact membership.
#[derive(Debug, Clone)]
pub struct CollectionRecord {
    /// Member descriptors as requested, in order.
    pub membership: Vec<Descriptor>,
    pub value: Arc<DenormalizedCollection>,
    pub cached_at: Timestamp,
}

impl CollectionRecord {
    pub fn new(membership: Vec<Descriptor>, value: Arc<DenormalizedCollection>) -> Self {
        Self {
            membership,
            value,
            cached_at: Utc::now(),
        }
    }

    pub fn members(&self) -> &[Descriptor] {
        &self.membership
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Item resolutions served unchanged from cache.
    pub hits: u64,
    /// Item resolutions that merged a partial recomputation into a cached value.
    pub stale_hits: u64,
    /// Item resolutions computed from scratch.
    pub misses: u64,
    /// Items absent from storage answered with their last cached value.
    pub fallbacks: u64,
    /// Collections served unchanged from cache.
    pub collection_hits: u64,
    /// Collections rebuilt from per-item resolution.
    pub collection_rebuilds: u64,
    /// Relationships re-expanded during partial recomputation.
    pub relationships_recomputed: u64,
}

impl CacheStats {
    /// Fraction of item resolutions that reused a cached value (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let reused = self.hits + self.stale_hits;
        let total = reused + self.misses;
        if total == 0 {
            0.0
        } else {
            reused as f64 / total as f64
        }
    }
}

/// The cache itself. Not synchronized; see [`CacheHandle`] for sharing.
#[derive(Debug, Default)]
pub struct DenormalizationCache {
    entries: HashMap<Descriptor, CacheEntry>,
    collections: HashMap<CollectionKey, CollectionRecord>,
    stats: CacheStats,
}

impl DenormalizationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, descriptor: &Descriptor) -> Option<&CacheEntry> {
        self.entries.get(descriptor)
    }

    /// Store an entry, replacing any previous entry for the same descriptor.
    pub fn insert_entry(&mut self, entry: CacheEntry) -> Arc<DenormalizedEntity> {
        let value = Arc::clone(&entry.value);
        self.entries.insert(entry.descriptor.clone(), entry);
        value
    }

    pub fn collection(&self, key: &CollectionKey) -> Option<&CollectionRecord> {
        self.collections.get(key)
    }

    /// Store a collection record, replacing any previous one for the key.
    pub fn insert_collection(
        &mut self,
        membership: Vec<Descriptor>,
        value: Arc<DenormalizedCollection>,
    ) -> Arc<DenormalizedCollection> {
        let record = CollectionRecord::new(membership, Arc::clone(&value));
        self.collections.insert(value.key.clone(), record);
        value
    }

    /// Drop every entry and collection record.
    ///
    /// Statistics survive a flush.
    pub fn flush(&mut self) {
        self.entries = HashMap::new();
        self.collections = HashMap::new();
    }

    /// Number of cached entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.collections.is_empty()
    }

    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut CacheStats {
        &mut self.stats
    }
}

/// Explicitly constructed, shareable handle to one cache.
///
/// Every denormalizer holding a clone of the same handle reads and writes the
/// same cache. Each top-level call holds the lock for its whole duration, so
/// calls are serialized and observe each other's writes in order.
#[derive(Debug, Clone, Default)]
pub struct CacheHandle {
    inner: Arc<Mutex<DenormalizationCache>>,
}

impl CacheHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> DenormResult<MutexGuard<'_, DenormalizationCache>> {
        self.inner
            .lock()
            .map_err(|_| DenormError::Storage(StorageError::LockPoisoned))
    }

    pub fn flush(&self) -> DenormResult<()> {
        self.lock()?.flush();
        Ok(())
    }

    pub fn stats(&self) -> DenormResult<CacheStats> {
        Ok(self.lock()?.stats())
    }

    /// True if both handles refer to the same cache.
    pub fn same_cache(&self, other: &CacheHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
