//! The denormalizer facade.
//!
//! Every public call locks the cache once, resolves against one repository
//! snapshot, and writes back whatever it recomputed. Nested references are
//! resolved through the same session so they hit the cache too.

use crate::descriptor::{
    build_collection_descriptor, build_item_descriptor, CollectionInput, ItemInput,
};
use crate::resolver::{observe_relationships, CacheResolver, Resolution, ResolutionKind};
use crate::store::{CacheEntry, CacheHandle, CacheStats, DenormalizationCache};
use denorm_core::{
    CollectionDescriptor, CyclePolicy, DefaultStatusStamper, DenormConfig, DenormError,
    DenormResult, DenormalizedCollection, DenormalizedEntity, Descriptor, GraphDenormalizer,
    Nested, NestedResolver, NormalizedEntity, NormalizedRepository, RepositorySource,
    ResolutionError, SchemaName, StandardGraphDenormalizer, StatusStamper, StorageError,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Cache-aware denormalizer.
///
/// Cheap to clone; clones share the cache handle. Two denormalizers built
/// from the same [`CacheHandle`] share one cache.
#[derive(Clone)]
pub struct Denormalizer<G = StandardGraphDenormalizer, S = DefaultStatusStamper> {
    cache: CacheHandle,
    graph: G,
    stamper: S,
    config: DenormConfig,
    source: Option<Arc<dyn RepositorySource>>,
}

impl Denormalizer {
    /// Denormalizer with the stock graph denormalizer and status stamper.
    pub fn new(cache: CacheHandle) -> Self {
        Self::with_parts(cache, StandardGraphDenormalizer, DefaultStatusStamper)
    }
}

impl<G: GraphDenormalizer, S: StatusStamper> Denormalizer<G, S> {
    pub fn with_parts(cache: CacheHandle, graph: G, stamper: S) -> Self {
        Self {
            cache,
            graph,
            stamper,
            config: DenormConfig::default(),
            source: None,
        }
    }

    /// Attach the repository source used by the `find_*` calls.
    pub fn with_source(mut self, source: Arc<dyn RepositorySource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_config(mut self, config: DenormConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DenormConfig {
        &self.config
    }

    /// Handle to the cache this denormalizer reads and writes.
    pub fn cache(&self) -> CacheHandle {
        self.cache.clone()
    }

    pub fn stats(&self) -> DenormResult<CacheStats> {
        self.cache.stats()
    }

    /// Denormalize one entity against the given repository.
    ///
    /// Returns the cached value itself (same `Arc`) when nothing it depends on
    /// changed. An entity absent from the repository is answered with its last
    /// cached value if there is one.
    pub fn denormalize_item(
        &self,
        input: &ItemInput,
        schema: Option<&SchemaName>,
        repo: &dyn NormalizedRepository,
    ) -> DenormResult<Arc<DenormalizedEntity>> {
        let descriptor = build_item_descriptor(input, schema)?;
        let mut cache = self.cache.lock()?;
        self.session(&mut cache, repo).top_level(&descriptor)
    }

    /// Denormalize an ordered collection against the given repository.
    pub fn denormalize_collection(
        &self,
        input: &CollectionInput,
        schema: Option<&SchemaName>,
        repo: &dyn NormalizedRepository,
    ) -> DenormResult<Arc<DenormalizedCollection>> {
        let collection = build_collection_descriptor(input, schema)?;
        let mut cache = self.cache.lock()?;
        self.session(&mut cache, repo).collection(&collection)
    }

    /// [`denormalize_item`](Self::denormalize_item) against the configured source.
    pub fn find_item(
        &self,
        input: &ItemInput,
        schema: Option<&SchemaName>,
    ) -> DenormResult<Arc<DenormalizedEntity>> {
        let repo = self.snapshot()?;
        self.denormalize_item(input, schema, repo.as_ref())
    }

    /// [`denormalize_collection`](Self::denormalize_collection) against the
    /// configured source.
    pub fn find_collection(
        &self,
        input: &CollectionInput,
        schema: Option<&SchemaName>,
    ) -> DenormResult<Arc<DenormalizedCollection>> {
        let repo = self.snapshot()?;
        self.denormalize_collection(input, schema, repo.as_ref())
    }

    /// Report what a call for this item would do, without computing anything.
    pub fn probe_item(
        &self,
        input: &ItemInput,
        schema: Option<&SchemaName>,
        repo: &dyn NormalizedRepository,
    ) -> DenormResult<ResolutionKind> {
        let descriptor = build_item_descriptor(input, schema)?;
        let cache = self.cache.lock()?;
        Ok(CacheResolver::new(&cache, repo).resolve_descriptor(&descriptor))
    }

    /// Drop every cached entity and collection.
    pub fn flush_cache(&self) -> DenormResult<()> {
        let mut cache = self.cache.lock()?;
        let entries = cache.len();
        let collections = cache.collection_count();
        cache.flush();
        tracing::info!(entries, collections, "Denormalization cache flushed");
        Ok(())
    }

    fn snapshot(&self) -> DenormResult<Arc<dyn NormalizedRepository>> {
        match &self.source {
            Some(source) => source.snapshot(),
            None => Err(DenormError::Storage(StorageError::SourceNotConfigured)),
        }
    }

    fn session<'a>(
        &'a self,
        cache: &'a mut DenormalizationCache,
        repo: &'a dyn NormalizedRepository,
    ) -> Session<'a, G, S> {
        Session {
            graph: &self.graph,
            stamper: &self.stamper,
            config: &self.config,
            cache,
            repo,
            path: Vec::new(),
        }
    }
}

/// State of one top-level call.
struct Session<'a, G, S> {
    graph: &'a G,
    stamper: &'a S,
    config: &'a DenormConfig,
    cache: &'a mut DenormalizationCache,
    repo: &'a dyn NormalizedRepository,
    /// Entities currently being expanded, outermost first.
    path: Vec<Descriptor>,
}

impl<G: GraphDenormalizer, S: StatusStamper> Session<'_, G, S> {
    fn top_level(&mut self, descriptor: &Descriptor) -> DenormResult<Arc<DenormalizedEntity>> {
        self.item(descriptor)?.ok_or_else(|| {
            ResolutionError::EntityNotFound {
                descriptor: descriptor.clone(),
            }
            .into()
        })
    }

    /// `None` when the entity is neither in the repository nor cached.
    fn item(&mut self, descriptor: &Descriptor) -> DenormResult<Option<Arc<DenormalizedEntity>>> {
        let Some(entity) = self.repo.entity(descriptor) else {
            return Ok(self.fallback(descriptor));
        };

        self.path.push(descriptor.clone());
        let result = self.compute(&entity);
        self.path.pop();

        result.map(Some)
    }

    fn fallback(&mut self, descriptor: &Descriptor) -> Option<Arc<DenormalizedEntity>> {
        let value = Arc::clone(&self.cache.entry(descriptor)?.value);
        self.cache.stats_mut().fallbacks += 1;
        tracing::warn!(
            schema = %descriptor.schema,
            id = %descriptor.id,
            "Entity absent from storage, serving last cached value"
        );
        Some(value)
    }

    fn compute(&mut self, entity: &NormalizedEntity) -> DenormResult<Arc<DenormalizedEntity>> {
        let resolution = CacheResolver::new(self.cache, self.repo)
            .with_ancestors(&self.path)
            .resolve_item(entity);
        let graph = self.graph;

        match resolution {
            Resolution::Valid(value) => {
                self.cache.stats_mut().hits += 1;
                tracing::debug!(descriptor = %entity.descriptor, "Cache hit");
                Ok(value)
            }
            Resolution::Missing => {
                tracing::debug!(descriptor = %entity.descriptor, "Cache miss");
                let value = graph.denormalize_full(entity, self)?;
                self.cache.stats_mut().misses += 1;
                Ok(self.store(entity, value))
            }
            Resolution::Stale {
                ref cached,
                own_changed,
                ..
            } => {
                let recompute = resolution.recompute_set();
                tracing::debug!(
                    descriptor = %entity.descriptor,
                    own_changed,
                    relationships = recompute.len(),
                    "Cache entry stale"
                );

                let mut relationships = BTreeMap::new();
                for (name, reference) in &entity.relationships {
                    let relationship = match cached.relationships.get(name) {
                        Some(existing) if !recompute.contains(name) => existing.clone(),
                        _ => {
                            tracing::trace!(
                                descriptor = %entity.descriptor,
                                relationship = %name,
                                "Recomputing relationship"
                            );
                            self.cache.stats_mut().relationships_recomputed += 1;
                            graph.denormalize_relationship(reference, self)?
                        }
                    };
                    relationships.insert(name.clone(), relationship);
                }

                let value = DenormalizedEntity {
                    descriptor: entity.descriptor.clone(),
                    attributes: graph.denormalize_attributes(entity),
                    relationships,
                    status: None,
                };
                self.cache.stats_mut().stale_hits += 1;
                Ok(self.store(entity, value))
            }
        }
    }

    /// Stamp a freshly computed value and make it the entity's cache entry.
    fn store(&mut self, entity: &NormalizedEntity, value: DenormalizedEntity) -> Arc<DenormalizedEntity> {
        let observed = observe_relationships(self.repo, entity);
        let stamped = self.stamper.stamp_item(entity, &observed, value);
        self.cache.insert_entry(CacheEntry::new(
            entity.descriptor.clone(),
            Arc::new(stamped),
            entity.status.token.clone(),
            observed,
        ))
    }

    fn collection(
        &mut self,
        collection: &CollectionDescriptor,
    ) -> DenormResult<Arc<DenormalizedCollection>> {
        let resolution = CacheResolver::new(self.cache, self.repo).resolve_collection(collection);
        if resolution.is_valid() {
            if let Some(cached) = resolution.cached {
                self.cache.stats_mut().collection_hits += 1;
                tracing::debug!(
                    schema = %collection.key.schema,
                    members = collection.members.len(),
                    "Collection cache hit"
                );
                return Ok(cached);
            }
        }

        let mut items = Vec::with_capacity(collection.members.len());
        for member in &collection.members {
            match self.item(member)? {
                Some(value) => items.push(value),
                None if self.config.skip_missing_members => {
                    tracing::warn!(
                        schema = %member.schema,
                        id = %member.id,
                        "Skipping collection member absent from storage"
                    );
                }
                None => {
                    return Err(ResolutionError::EntityNotFound {
                        descriptor: member.clone(),
                    }
                    .into())
                }
            }
        }

        let status = self.stamper.stamp_collection(&collection.key, &items);
        let value = Arc::new(DenormalizedCollection {
            key: collection.key.clone(),
            members: items.iter().map(|item| item.descriptor.clone()).collect(),
            items,
            status,
        });
        self.cache.stats_mut().collection_rebuilds += 1;
        tracing::debug!(
            schema = %collection.key.schema,
            members = value.len(),
            membership = ?resolution.membership,
            "Collection rebuilt"
        );
        Ok(self
            .cache
            .insert_collection(collection.members.clone(), value))
    }
}

impl<G: GraphDenormalizer, S: StatusStamper> NestedResolver for Session<'_, G, S> {
    fn resolve_nested(&mut self, descriptor: &Descriptor) -> DenormResult<Nested> {
        if self.path.contains(descriptor) {
            return match self.config.cycle_policy {
                CyclePolicy::BackReference => Ok(Nested::BackReference),
                CyclePolicy::Error => {
                    let mut path = self.path.clone();
                    path.push(descriptor.clone());
                    Err(ResolutionError::CycleDetected { path }.into())
                }
            };
        }
        Ok(match self.item(descriptor)? {
            Some(value) => Nested::Resolved(value),
            None => Nested::Unresolved,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use denorm_core::{EntityStatus, Node, RelationshipRef, StatusToken};
    use denorm_storage::InMemoryRepository;
    use serde_json::json;

    fn person(id: &str, name: &str, token: &str) -> NormalizedEntity {
        NormalizedEntity::new(
            Descriptor::new(id, "people"),
            EntityStatus::new(StatusToken::new(token)),
        )
        .with_attribute("name", json!(name))
    }

    fn article(token: &str) -> NormalizedEntity {
        NormalizedEntity::new(
            Descriptor::new("1", "articles"),
            EntityStatus::new(StatusToken::new(token)),
        )
        .with_attribute("title", json!("Hello"))
        .with_relationship("author", RelationshipRef::One(Descriptor::new("7", "people")))
        .with_relationship(
            "comments",
            RelationshipRef::Many(vec![Descriptor::new("c1", "comments")]),
        )
    }

    fn comment() -> NormalizedEntity {
        NormalizedEntity::new(
            Descriptor::new("c1", "comments"),
            EntityStatus::new(StatusToken::new("k0")),
        )
        .with_attribute("body", json!("First"))
    }

    fn repo() -> InMemoryRepository {
        let mut repo = InMemoryRepository::new();
        repo.insert(person("7", "Ada", "p0"));
        repo.insert(comment());
        repo.insert(article("s0"));
        repo
    }

    fn article_input() -> ItemInput {
        ItemInput::reference("1", "articles")
    }

    #[test]
    fn test_first_call_expands_and_stamps() {
        let denorm = Denormalizer::new(CacheHandle::new());
        let value = denorm.denormalize_item(&article_input(), None, &repo()).unwrap();

        assert_eq!(value.attribute("title"), Some(&json!("Hello")));
        let author = value.relationship("author").and_then(|r| r.one()).unwrap();
        assert_eq!(author.attribute("name"), Some(&json!("Ada")));

        let meta = value.status.as_ref().unwrap();
        assert_eq!(meta.own.token, StatusToken::new("s0"));
        assert_eq!(
            meta.observed["author"].tokens,
            vec![Some(StatusToken::new("p0"))]
        );
        let stats = denorm.stats().unwrap();
        assert_eq!(stats.misses, 3);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_second_call_returns_same_value() {
        let denorm = Denormalizer::new(CacheHandle::new());
        let repo = repo();
        let first = denorm.denormalize_item(&article_input(), None, &repo).unwrap();
        let second = denorm.denormalize_item(&article_input(), None, &repo).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(denorm.stats().unwrap().hits, 1);
    }

    #[test]
    fn test_partial_recompute_keeps_unchanged_relationship() {
        let denorm = Denormalizer::new(CacheHandle::new());
        let mut repo = repo();
        let before = denorm.denormalize_item(&article_input(), None, &repo).unwrap();

        repo.insert(person("7", "Grace", "p1"));
        let after = denorm.denormalize_item(&article_input(), None, &repo).unwrap();

        assert!(!Arc::ptr_eq(&before, &after));
        let name = |v: &DenormalizedEntity| {
            v.relationship("author")
                .and_then(|r| r.one())
                .and_then(|a| a.attribute("name").cloned())
        };
        assert_eq!(name(&after), Some(json!("Grace")));

        let comments = |v: &DenormalizedEntity| {
            v.relationship("comments").unwrap().nodes()[0]
                .entity()
                .cloned()
                .unwrap()
        };
        assert!(Arc::ptr_eq(&comments(&before), &comments(&after)));

        // The article and its author were both merged; only `author` was re-expanded.
        let stats = denorm.stats().unwrap();
        assert_eq!(stats.stale_hits, 2);
        assert_eq!(stats.relationships_recomputed, 1);
    }

    #[test]
    fn test_own_change_rederives_attributes() {
        let denorm = Denormalizer::new(CacheHandle::new());
        let mut repo = repo();
        denorm.denormalize_item(&article_input(), None, &repo).unwrap();

        repo.insert(article("s1").with_attribute("title", json!("Updated")));
        let after = denorm.denormalize_item(&article_input(), None, &repo).unwrap();
        assert_eq!(after.attribute("title"), Some(&json!("Updated")));
        assert_eq!(after.status.as_ref().unwrap().own.token, StatusToken::new("s1"));
    }

    #[test]
    fn test_unresolved_nested_reference() {
        let denorm = Denormalizer::new(CacheHandle::new());
        let mut repo = InMemoryRepository::new();
        repo.insert(article("s0"));
        let value = denorm.denormalize_item(&article_input(), None, &repo).unwrap();
        assert_eq!(
            value.relationship("author").unwrap().nodes(),
            &[Node::Unresolved(Descriptor::new("7", "people"))]
        );
    }

    #[test]
    fn test_not_found_without_cache() {
        let denorm = Denormalizer::new(CacheHandle::new());
        let err = denorm
            .denormalize_item(&ItemInput::id("9"), Some(&SchemaName::new("articles")), &repo())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_self_reference_uses_back_reference() {
        let denorm = Denormalizer::new(CacheHandle::new());
        let mut repo = InMemoryRepository::new();
        repo.insert(
            person("7", "Ada", "p0")
                .with_relationship("manager", RelationshipRef::One(Descriptor::new("7", "people"))),
        );
        let value = denorm
            .denormalize_item(&ItemInput::reference("7", "people"), None, &repo)
            .unwrap();
        assert_eq!(
            value.relationship("manager").unwrap().nodes(),
            &[Node::BackReference(Descriptor::new("7", "people"))]
        );
    }

    #[test]
    fn test_find_without_source_fails() {
        let denorm = Denormalizer::new(CacheHandle::new());
        let err = denorm.find_item(&article_input(), None).unwrap_err();
        assert_eq!(err, DenormError::Storage(StorageError::SourceNotConfigured));
    }

    #[test]
    fn test_flush_then_probe_is_missing() {
        let denorm = Denormalizer::new(CacheHandle::new());
        let repo = repo();
        denorm.denormalize_item(&article_input(), None, &repo).unwrap();
        assert_eq!(
            denorm.probe_item(&article_input(), None, &repo).unwrap(),
            ResolutionKind::Valid
        );

        denorm.flush_cache().unwrap();
        assert_eq!(
            denorm.probe_item(&article_input(), None, &repo).unwrap(),
            ResolutionKind::Missing
        );
    }

    #[test]
    fn test_collection_hit_after_build() {
        let denorm = Denormalizer::new(CacheHandle::new());
        let repo = repo();
        let input = CollectionInput::of_ids(["1"]).with_schema("articles");
        let first = denorm.denormalize_collection(&input, None, &repo).unwrap();
        let second = denorm.denormalize_collection(&input, None, &repo).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.status.valid);

        let stats = denorm.stats().unwrap();
        assert_eq!(stats.collection_rebuilds, 1);
        assert_eq!(stats.collection_hits, 1);
    }
}
