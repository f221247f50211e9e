//! In-memory normalized repository.

use denorm_core::{
    Attributes, DenormError, DenormResult, Descriptor, EntityStatus, NormalizedEntity,
    NormalizedRepository, Partition, RelationshipRef, RepositorySource, SchemaName, StatusToken,
    StorageError,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Normalized repository held entirely in memory, one partition per schema.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    partitions: HashMap<SchemaName, Partition>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entity with the status it carries, replacing any previous one.
    pub fn insert(&mut self, entity: NormalizedEntity) -> Option<Arc<NormalizedEntity>> {
        let partition = self
            .partitions
            .entry(entity.descriptor.schema.clone())
            .or_default();
        partition.insert(entity.descriptor.id.clone(), Arc::new(entity))
    }

    /// Store an entity, deriving its status token from its content.
    ///
    /// Writing identical content twice yields the same token, so readers only
    /// observe a change when the stored representation actually changed.
    pub fn upsert(
        &mut self,
        descriptor: Descriptor,
        attributes: Attributes,
        relationships: BTreeMap<String, RelationshipRef>,
    ) -> DenormResult<StatusToken> {
        let content = serde_json::to_vec(&(&attributes, &relationships)).map_err(|e| {
            DenormError::Storage(StorageError::InvalidEntity {
                schema: descriptor.schema.clone(),
                reason: e.to_string(),
            })
        })?;
        let token = StatusToken::from_content(&content);
        self.insert(NormalizedEntity {
            descriptor,
            attributes,
            relationships,
            status: EntityStatus::new(token.clone()),
        });
        Ok(token)
    }

    pub fn remove(&mut self, descriptor: &Descriptor) -> Option<Arc<NormalizedEntity>> {
        self.partitions
            .get_mut(&descriptor.schema)
            .and_then(|partition| partition.remove(&descriptor.id))
    }

    /// Total number of stored entities.
    pub fn len(&self) -> usize {
        self.partitions.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn schemas(&self) -> impl Iterator<Item = &SchemaName> {
        self.partitions.keys()
    }

    /// Make sure a partition exists for the schema, even when empty.
    pub fn ensure_partition(&mut self, schema: SchemaName) {
        self.partitions.entry(schema).or_default();
    }
}

impl NormalizedRepository for InMemoryRepository {
    fn entity(&self, descriptor: &Descriptor) -> Option<Arc<NormalizedEntity>> {
        self.partitions
            .get(&descriptor.schema)
            .and_then(|partition| partition.get(&descriptor.id))
            .cloned()
    }

    fn partition(&self, schema: &SchemaName) -> Option<&Partition> {
        self.partitions.get(schema)
    }
}

/// Shared, atomically replaceable repository.
///
/// Writers publish a whole new snapshot; readers that already took a
/// snapshot keep seeing the old one until their call completes.
#[derive(Debug, Clone, Default)]
pub struct SharedRepository {
    current: Arc<RwLock<Arc<InMemoryRepository>>>,
}

impl SharedRepository {
    pub fn new(repository: InMemoryRepository) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(repository))),
        }
    }

    /// The snapshot currently published.
    pub fn current(&self) -> DenormResult<Arc<InMemoryRepository>> {
        let current = self
            .current
            .read()
            .map_err(|_| DenormError::Storage(StorageError::LockPoisoned))?;
        Ok(Arc::clone(&current))
    }

    /// Publish a new snapshot.
    pub fn replace(&self, repository: InMemoryRepository) -> DenormResult<()> {
        let mut current = self
            .current
            .write()
            .map_err(|_| DenormError::Storage(StorageError::LockPoisoned))?;
        *current = Arc::new(repository);
        Ok(())
    }

    /// Copy the current snapshot, apply `f`, then publish the copy.
    pub fn update<R>(&self, f: impl FnOnce(&mut InMemoryRepository) -> R) -> DenormResult<R> {
        let mut current = self
            .current
            .write()
            .map_err(|_| DenormError::Storage(StorageError::LockPoisoned))?;
        let mut next = InMemoryRepository::clone(&current);
        let result = f(&mut next);
        *current = Arc::new(next);
        Ok(result)
    }
}

impl RepositorySource for SharedRepository {
    fn snapshot(&self) -> DenormResult<Arc<dyn NormalizedRepository>> {
        let snapshot: Arc<dyn NormalizedRepository> = self.current()?;
        Ok(snapshot)
    }
}
