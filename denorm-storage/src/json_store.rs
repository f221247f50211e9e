//! Normalized repository backed by a JSON application store.
//!
//! The store keeps each schema's partition somewhere inside one large JSON
//! document. [`SchemaPaths`] says where: `{"articles": "api.articles"}` means
//! the `articles` partition is the object at `store.api.articles`, keyed by id.
//!
//! Entities use the JSON:API shape:
//!
//! ```json
//! {
//!   "id": "1",
//!   "type": "articles",
//!   "attributes": { "title": "Hello" },
//!   "relationships": { "author": { "data": { "id": "7", "type": "people" } } },
//!   "status": { "token": "s0", "valid": true, "loading": false }
//! }
//! ```
//!
//! `status` is optional; without a token one is derived from the content.

use crate::memory::InMemoryRepository;
use denorm_core::{
    Attributes, DenormError, DenormResult, Descriptor, EntityId, EntityStatus, NormalizedEntity,
    NormalizedRepository, RelationshipRef, RepositorySource, SchemaName, StatusToken,
    StorageError, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Location of every schema partition inside the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaPaths(BTreeMap<SchemaName, String>);

impl SchemaPaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, schema: impl Into<SchemaName>, path: impl Into<String>) -> Self {
        self.0.insert(schema.into(), path.into());
        self
    }

    pub fn path(&self, schema: &SchemaName) -> Option<&str> {
        self.0.get(schema).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SchemaName, &str)> {
        self.0.iter().map(|(schema, path)| (schema, path.as_str()))
    }
}

/// Follow a dotted path through nested objects.
fn lookup<'a>(store: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(store, |value, segment| value.get(segment))
}

fn invalid(schema: &SchemaName, reason: impl Into<String>) -> DenormError {
    DenormError::Storage(StorageError::InvalidEntity {
        schema: schema.clone(),
        reason: reason.into(),
    })
}

fn parse_id(schema: &SchemaName, value: Option<&Value>) -> DenormResult<EntityId> {
    match value {
        Some(Value::String(id)) => Ok(EntityId::new(id.clone())),
        Some(Value::Number(id)) => Ok(EntityId::new(id.to_string())),
        other => Err(invalid(schema, format!("unusable id {:?}", other))),
    }
}

fn parse_descriptor(schema: &SchemaName, value: &Value) -> DenormResult<Descriptor> {
    let id = parse_id(schema, value.get("id"))?;
    let target = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(schema, format!("reference {} has no type", id)))?;
    Ok(Descriptor::new(id, target))
}

fn parse_relationship(schema: &SchemaName, value: &Value) -> DenormResult<RelationshipRef> {
    // Accept both `{ "data": ... }` wrappers and bare linkage.
    let data = value.get("data").unwrap_or(value);
    match data {
        Value::Null => Ok(RelationshipRef::Null),
        Value::Array(items) => items
            .iter()
            .map(|item| parse_descriptor(schema, item))
            .collect::<DenormResult<Vec<_>>>()
            .map(RelationshipRef::Many),
        Value::Object(_) => parse_descriptor(schema, data).map(RelationshipRef::One),
        other => Err(invalid(schema, format!("unusable relationship {}", other))),
    }
}

fn parse_status(
    schema: &SchemaName,
    raw: Option<&Value>,
    attributes: &Attributes,
    relationships: &BTreeMap<String, RelationshipRef>,
) -> DenormResult<EntityStatus> {
    let token = match raw.and_then(|status| status.get("token")) {
        Some(Value::String(token)) => StatusToken::new(token.clone()),
        Some(Value::Number(token)) => StatusToken::new(token.to_string()),
        _ => {
            let content = serde_json::to_vec(&(attributes, relationships))
                .map_err(|e| invalid(schema, e.to_string()))?;
            StatusToken::from_content(&content)
        }
    };

    let flag = |name: &str, default: bool| {
        raw.and_then(|status| status.get(name))
            .and_then(Value::as_bool)
            .unwrap_or(default)
    };

    let updated_at = match raw.and_then(|status| status.get("updated_at")) {
        Some(value @ Value::String(_)) => Some(
            serde_json::from_value::<Timestamp>(value.clone())
                .map_err(|e| invalid(schema, format!("bad updated_at: {}", e)))?,
        ),
        _ => None,
    };

    Ok(EntityStatus {
        token,
        valid: flag("valid", true),
        loading: flag("loading", false),
        updated_at,
    })
}

/// Parse one JSON:API-shaped entity stored under `schema`.
pub fn parse_entity(schema: &SchemaName, value: &Value) -> DenormResult<NormalizedEntity> {
    let object = value
        .as_object()
        .ok_or_else(|| invalid(schema, "entity is not an object"))?;

    let id = parse_id(schema, object.get("id"))?;
    let declared = object.get("type").and_then(Value::as_str);
    if let Some(declared) = declared {
        if declared != schema.as_str() {
            return Err(invalid(
                schema,
                format!("entity {} declares type {}", id, declared),
            ));
        }
    }

    let attributes: Attributes = match object.get("attributes") {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Some(Value::Null) | None => Attributes::new(),
        Some(_) => return Err(invalid(schema, format!("attributes of {} not an object", id))),
    };

    let mut relationships = BTreeMap::new();
    if let Some(Value::Object(map)) = object.get("relationships") {
        for (name, raw) in map {
            relationships.insert(name.clone(), parse_relationship(schema, raw)?);
        }
    }

    let status = parse_status(schema, object.get("status"), &attributes, &relationships)?;

    Ok(NormalizedEntity {
        descriptor: Descriptor::new(id, schema.clone()),
        attributes,
        relationships,
        status,
    })
}

fn load_partition(
    repository: &mut InMemoryRepository,
    schema: &SchemaName,
    path: &str,
    partition: &Map<String, Value>,
) -> DenormResult<()> {
    repository.ensure_partition(schema.clone());
    for raw in partition.values() {
        repository.insert(parse_entity(schema, raw)?);
    }
    debug!(schema = %schema, path, entities = partition.len(), "loaded partition");
    Ok(())
}

/// Repository view over a JSON store.
pub struct JsonStoreRepository;

impl JsonStoreRepository {
    /// Build a repository from every partition named in `paths`.
    ///
    /// A path that does not exist yields an empty partition; a path holding
    /// something other than an object is an error.
    pub fn from_store(store: &Value, paths: &SchemaPaths) -> DenormResult<InMemoryRepository> {
        let mut repository = InMemoryRepository::new();
        for (schema, path) in paths.iter() {
            match lookup(store, path) {
                Some(Value::Object(partition)) => {
                    load_partition(&mut repository, schema, path, partition)?
                }
                None | Some(Value::Null) => repository.ensure_partition(schema.clone()),
                Some(_) => {
                    return Err(DenormError::Storage(StorageError::PathNotAnObject {
                        schema: schema.clone(),
                        path: path.to_string(),
                    }))
                }
            }
        }
        Ok(repository)
    }
}

/// Finds storage on demand: reads the latest store and maps it through
/// [`SchemaPaths`] on every snapshot.
pub struct JsonStoreSource<F>
where
    F: Fn() -> Arc<Value> + Send + Sync,
{
    get_store: F,
    paths: SchemaPaths,
}

impl<F> JsonStoreSource<F>
where
    F: Fn() -> Arc<Value> + Send + Sync,
{
    pub fn new(get_store: F, paths: SchemaPaths) -> Self {
        Self { get_store, paths }
    }

    pub fn paths(&self) -> &SchemaPaths {
        &self.paths
    }
}

impl<F> RepositorySource for JsonStoreSource<F>
where
    F: Fn() -> Arc<Value> + Send + Sync,
{
    fn snapshot(&self) -> DenormResult<Arc<dyn NormalizedRepository>> {
        let store = (self.get_store)();
        let repository: Arc<dyn NormalizedRepository> =
            Arc::new(JsonStoreRepository::from_store(&store, &self.paths)?);
        Ok(repository)
    }
}
