//! Denorm Test Utilities
//!
//! Shared test infrastructure for the denorm workspace:
//! - Proptest generators for identities and whole entity graphs
//! - Fixtures for the article/person scenario, cycles and JSON stores
//! - Custom assertions for denorm-specific validation

// Re-export repositories from their source crate
pub use denorm_storage::{InMemoryRepository, JsonStoreRepository, SchemaPaths, SharedRepository};

// Re-export core types for convenience
pub use denorm_core::{
    Attributes, CyclePolicy, DenormConfig, DenormError, DenormResult, DenormalizedEntity,
    DenormalizedRelationship, Descriptor, DescriptorError, EntityId, EntityStatus, Node,
    NormalizedEntity, NormalizedRepository, RelationshipRef, ResolutionError, SchemaName,
    StatusToken, StorageError,
};

use std::sync::Arc;

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for denorm identities and entity graphs.

    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    /// Generate an entity id in any of the shapes callers use.
    pub fn arb_entity_id() -> impl Strategy<Value = EntityId> {
        prop_oneof![
            (1u64..100_000).prop_map(EntityId::from),
            "[a-z0-9]{1,12}".prop_map(EntityId::new),
            any::<[u8; 16]>().prop_map(|bytes| EntityId::from(Uuid::from_bytes(bytes))),
        ]
    }

    pub fn arb_schema_name() -> impl Strategy<Value = SchemaName> {
        prop_oneof![
            Just(SchemaName::new("articles")),
            Just(SchemaName::new("people")),
            Just(SchemaName::new("comments")),
            Just(SchemaName::new("companies")),
        ]
    }

    pub fn arb_descriptor() -> impl Strategy<Value = Descriptor> {
        (arb_entity_id(), arb_schema_name()).prop_map(|(id, schema)| Descriptor::new(id, schema))
    }

    pub fn arb_status_token() -> impl Strategy<Value = StatusToken> {
        "[a-f0-9]{8}".prop_map(StatusToken::new)
    }

    /// Generate a small attribute map of scalar JSON values.
    pub fn arb_attributes() -> impl Strategy<Value = Attributes> {
        let scalar = prop_oneof![
            any::<bool>().prop_map(serde_json::Value::from),
            any::<i64>().prop_map(serde_json::Value::from),
            "[ -~]{0,16}".prop_map(serde_json::Value::from),
        ];
        prop::collection::btree_map("[a-z]{1,8}", scalar, 0..4)
    }

    /// Generate a blog graph: people, comments, and articles that reference
    /// one author and any number of comments each.
    pub fn arb_blog_graph() -> impl Strategy<Value = fixtures::BlogGraph> {
        (1usize..5, 1usize..6, 1usize..7)
            .prop_flat_map(|(people, comments, articles)| {
                let article = (
                    0..people,
                    prop::collection::vec(0..comments, 0..4),
                    arb_status_token(),
                );
                (
                    Just(people),
                    Just(comments),
                    prop::collection::vec(article, articles),
                )
            })
            .prop_map(|(people, comments, articles)| {
                fixtures::BlogGraph::build(people, comments, &articles)
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built repositories for common testing scenarios.

    use super::*;
    use serde_json::{json, Value};

    fn entity(id: &str, schema: &str, token: &str) -> NormalizedEntity {
        NormalizedEntity::new(
            Descriptor::new(id, schema),
            EntityStatus::new(StatusToken::new(token)),
        )
    }

    fn one(id: &str, schema: &str) -> RelationshipRef {
        RelationshipRef::One(Descriptor::new(id, schema))
    }

    fn many(ids: &[&str], schema: &str) -> RelationshipRef {
        RelationshipRef::Many(ids.iter().map(|id| Descriptor::new(*id, schema)).collect())
    }

    pub fn person(id: &str, name: &str, token: &str) -> NormalizedEntity {
        entity(id, "people", token).with_attribute("name", json!(name))
    }

    pub fn comment(id: &str, body: &str, token: &str) -> NormalizedEntity {
        entity(id, "comments", token).with_attribute("body", json!(body))
    }

    pub fn company(id: &str, name: &str, token: &str) -> NormalizedEntity {
        entity(id, "companies", token).with_attribute("name", json!(name))
    }

    pub fn article(
        id: &str,
        title: &str,
        token: &str,
        author: &str,
        comments: &[&str],
    ) -> NormalizedEntity {
        entity(id, "articles", token)
            .with_attribute("title", json!(title))
            .with_relationship("author", one(author, "people"))
            .with_relationship("comments", many(comments, "comments"))
    }

    pub fn article_ref(id: &str) -> Descriptor {
        Descriptor::new(id, "articles")
    }

    pub fn person_ref(id: &str) -> Descriptor {
        Descriptor::new(id, "people")
    }

    /// Two articles by two authors:
    ///
    /// - `articles#1` by `people#7` with comments `c1`, `c2`
    /// - `articles#2` by `people#8` with comment `c3`
    /// - `people#7` works for `companies#3`
    pub fn blog_repo() -> InMemoryRepository {
        let mut repo = InMemoryRepository::new();
        repo.insert(company("3", "Analytical Engines", "k0"));
        repo.insert(
            person("7", "Ada", "p0").with_relationship("employer", one("3", "companies")),
        );
        repo.insert(person("8", "Grace", "p0"));
        repo.insert(comment("c1", "First", "c0"));
        repo.insert(comment("c2", "Second", "c0"));
        repo.insert(comment("c3", "Third", "c0"));
        repo.insert(article("1", "Hello", "s0", "7", &["c1", "c2"]));
        repo.insert(article("2", "World", "s0", "8", &["c3"]));
        repo
    }

    /// `people#1` and `people#2` name each other as `friend`.
    pub fn cyclic_repo() -> InMemoryRepository {
        let mut repo = InMemoryRepository::new();
        repo.insert(person("1", "Ada", "p0").with_relationship("friend", one("2", "people")));
        repo.insert(person("2", "Grace", "p0").with_relationship("friend", one("1", "people")));
        repo
    }

    /// Store the entity again under a new status token.
    ///
    /// Returns false if the entity is not in the repository.
    pub fn retoken(repo: &mut InMemoryRepository, descriptor: &Descriptor, token: &str) -> bool {
        let Some(current) = repo.entity(descriptor) else {
            return false;
        };
        let mut updated = NormalizedEntity::clone(&current);
        updated.status.token = StatusToken::new(token);
        repo.insert(updated);
        true
    }

    /// JSON application store with entities under `api.<schema>`.
    pub fn json_store() -> Value {
        json!({
            "api": {
                "articles": {
                    "1": {
                        "id": "1",
                        "type": "articles",
                        "attributes": { "title": "Hello" },
                        "relationships": {
                            "author": { "data": { "id": "7", "type": "people" } },
                            "comments": { "data": [{ "id": "c1", "type": "comments" }] }
                        },
                        "status": { "token": "s0" }
                    }
                },
                "people": {
                    "7": {
                        "id": 7,
                        "type": "people",
                        "attributes": { "name": "Ada" }
                    }
                },
                "comments": {
                    "c1": {
                        "id": "c1",
                        "type": "comments",
                        "attributes": { "body": "First" },
                        "status": { "token": "c0", "loading": true }
                    }
                }
            }
        })
    }

    pub fn schema_paths() -> SchemaPaths {
        SchemaPaths::new()
            .with("articles", "api.articles")
            .with("people", "api.people")
            .with("comments", "api.comments")
    }

    /// Generated blog graph plus the descriptors it contains.
    #[derive(Debug, Clone)]
    pub struct BlogGraph {
        pub repository: InMemoryRepository,
        pub people: Vec<Descriptor>,
        pub comments: Vec<Descriptor>,
        pub articles: Vec<Descriptor>,
    }

    impl BlogGraph {
        /// Build from `(author index, comment indices, token)` per article.
        pub fn build(
            people: usize,
            comments: usize,
            articles: &[(usize, Vec<usize>, StatusToken)],
        ) -> Self {
            let mut repository = InMemoryRepository::new();
            let people: Vec<Descriptor> = (0..people)
                .map(|i| {
                    let p = person(&format!("p{}", i), &format!("Person {}", i), "p0");
                    let descriptor = p.descriptor.clone();
                    repository.insert(p);
                    descriptor
                })
                .collect();
            let comments: Vec<Descriptor> = (0..comments)
                .map(|i| {
                    let c = comment(&format!("c{}", i), &format!("Comment {}", i), "c0");
                    let descriptor = c.descriptor.clone();
                    repository.insert(c);
                    descriptor
                })
                .collect();
            let articles = articles
                .iter()
                .enumerate()
                .map(|(i, (author, picked, token))| {
                    let mut a = entity(&format!("a{}", i), "articles", token.as_str())
                        .with_attribute("title", json!(format!("Article {}", i)))
                        .with_relationship("author", RelationshipRef::One(people[*author].clone()));
                    a = a.with_relationship(
                        "comments",
                        RelationshipRef::Many(picked.iter().map(|c| comments[*c].clone()).collect()),
                    );
                    let descriptor = a.descriptor.clone();
                    repository.insert(a);
                    descriptor
                })
                .collect();
            Self {
                repository,
                people,
                comments,
                articles,
            }
        }

        /// Articles whose author is `person`.
        pub fn articles_by(&self, person: &Descriptor) -> Vec<Descriptor> {
            self.articles
                .iter()
                .filter(|article| {
                    self.repository
                        .entity(article)
                        .and_then(|a| a.relationships.get("author").cloned())
                        == Some(RelationshipRef::One(person.clone()))
                })
                .cloned()
                .collect()
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for denorm-specific validation.

    use super::*;

    /// Assert that two values are the same allocation, not merely equal.
    #[track_caller]
    pub fn assert_same_arc<T: std::fmt::Debug>(a: &Arc<T>, b: &Arc<T>) {
        assert!(
            Arc::ptr_eq(a, b),
            "Expected the same value, got two allocations:\n{:?}\n{:?}",
            a,
            b
        );
    }

    /// Assert that a value was recomputed.
    #[track_caller]
    pub fn assert_new_arc<T>(a: &Arc<T>, b: &Arc<T>) {
        assert!(!Arc::ptr_eq(a, b), "Expected a recomputed value, got the cached one");
    }

    /// Assert that a DenormResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &DenormResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a DenormResult is Err.
    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &DenormResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    /// Assert that a DenormResult is EntityNotFound for `descriptor`.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &DenormResult<T>, descriptor: &Descriptor) {
        match result {
            Err(DenormError::Resolution(ResolutionError::EntityNotFound { descriptor: d })) => {
                assert_eq!(d, descriptor, "Wrong descriptor in EntityNotFound error");
            }
            other => panic!("Expected EntityNotFound for {}, got: {:?}", descriptor, other),
        }
    }

    #[track_caller]
    pub fn assert_malformed<T: std::fmt::Debug>(result: &DenormResult<T>) {
        match result {
            Err(DenormError::Descriptor(DescriptorError::MalformedReference { .. })) => {}
            other => panic!("Expected MalformedReference error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_ambiguous<T: std::fmt::Debug>(result: &DenormResult<T>) {
        match result {
            Err(DenormError::Descriptor(DescriptorError::AmbiguousSchema { .. })) => {}
            other => panic!("Expected AmbiguousSchema error, got: {:?}", other),
        }
    }

    /// Assert a CycleDetected error and return its path.
    #[track_caller]
    pub fn assert_cycle_detected<T: std::fmt::Debug>(result: &DenormResult<T>) -> Vec<Descriptor> {
        match result {
            Err(DenormError::Resolution(ResolutionError::CycleDetected { path })) => path.clone(),
            other => panic!("Expected CycleDetected error, got: {:?}", other),
        }
    }

    /// Assert that relationship `name` embeds exactly one expanded entity and
    /// return it.
    #[track_caller]
    pub fn assert_embedded(entity: &DenormalizedEntity, name: &str) -> Arc<DenormalizedEntity> {
        match entity.relationship(name) {
            Some(DenormalizedRelationship::One(Node::Entity(target))) => Arc::clone(target),
            other => panic!("Expected `{}` to embed one entity, got: {:?}", name, other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_blog_repo_fixture() {
        let repo = fixtures::blog_repo();
        assert_eq!(repo.len(), 8);
        let article = repo.entity(&fixtures::article_ref("1")).unwrap();
        assert_eq!(
            article.relationships["author"],
            RelationshipRef::One(fixtures::person_ref("7"))
        );
    }

    #[test]
    fn test_retoken_changes_only_the_token() {
        let mut repo = fixtures::blog_repo();
        let d = fixtures::person_ref("7");
        let before = repo.entity(&d).unwrap();
        assert!(fixtures::retoken(&mut repo, &d, "p1"));
        let after = repo.entity(&d).unwrap();
        assert_eq!(after.status.token, StatusToken::new("p1"));
        assert_eq!(after.attributes, before.attributes);

        assert!(!fixtures::retoken(&mut repo, &fixtures::person_ref("99"), "p1"));
    }

    #[test]
    fn test_json_store_fixture_loads() {
        let repo =
            JsonStoreRepository::from_store(&fixtures::json_store(), &fixtures::schema_paths())
                .unwrap();
        assert_eq!(repo.len(), 3);
        assert!(repo.entity(&fixtures::person_ref("7")).is_some());
    }

    #[test]
    fn test_assertion_not_found() {
        let d = fixtures::article_ref("1");
        let result: DenormResult<()> =
            Err(ResolutionError::EntityNotFound { descriptor: d.clone() }.into());
        assertions::assert_not_found(&result, &d);
    }

    #[test]
    fn test_assertion_cycle_path() {
        let path = vec![fixtures::person_ref("1"), fixtures::person_ref("2")];
        let result: DenormResult<()> =
            Err(ResolutionError::CycleDetected { path: path.clone() }.into());
        assert_eq!(assertions::assert_cycle_detected(&result), path);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_generated_descriptor_displays_schema(d in generators::arb_descriptor()) {
            assert!(d.to_string().starts_with(d.schema.as_str()));
        }

        #[test]
        fn prop_generated_graph_is_closed(graph in generators::arb_blog_graph()) {
            // Every reference points at an entity that exists.
            for article in &graph.articles {
                let entity = graph.repository.entity(article).unwrap();
                for reference in entity.relationships.values() {
                    for target in reference.targets() {
                        assert!(graph.repository.entity(target).is_some());
                    }
                }
            }
        }

        #[test]
        fn prop_articles_by_partitions_articles(graph in generators::arb_blog_graph()) {
            let total: usize = graph.people.iter().map(|p| graph.articles_by(p).len()).sum();
            assert_eq!(total, graph.articles.len());
        }

        #[test]
        fn prop_generated_attributes_are_small(attributes in generators::arb_attributes()) {
            assert!(attributes.len() < 4);
        }
    }
}
