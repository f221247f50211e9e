//! Identity types for normalized and denormalized entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Name of a schema (the `type` half of a reference), e.g. `"articles"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaName(String);

impl SchemaName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SchemaName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SchemaName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of an entity within its schema.
///
/// Repositories key entities by arbitrary identifiers (numeric database ids,
/// UUIDs, slugs), so the identifier is kept in its textual form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<Uuid> for EntityId {
    fn from(value: Uuid) -> Self {
        Self(value.to_string())
    }
}

/// Minimal `{id, type}` identity of an entity, independent of expansion state.
///
/// Two descriptors denote the same entity iff both id and schema are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Descriptor {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub schema: SchemaName,
}

impl Descriptor {
    pub fn new(id: impl Into<EntityId>, schema: impl Into<SchemaName>) -> Self {
        Self {
            id: id.into(),
            schema: schema.into(),
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.schema, self.id)
    }
}

/// Opaque value that changes whenever an entity's stored representation changes.
///
/// Only equality is meaningful. No ordering or timestamp semantics are implied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusToken(String);

impl StatusToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Derive a token from the stored bytes of an entity (hex SHA-256).
    pub fn from_content(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StatusToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_equality_is_id_and_schema() {
        let a = Descriptor::new("1", "articles");
        let b = Descriptor::new(1u64, "articles");
        let c = Descriptor::new("1", "people");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_descriptor_display() {
        assert_eq!(Descriptor::new("7", "people").to_string(), "people#7");
    }

    #[test]
    fn test_descriptor_serializes_schema_as_type() {
        let json = serde_json::to_value(Descriptor::new("7", "people")).unwrap();
        assert_eq!(json, serde_json::json!({ "id": "7", "type": "people" }));
    }

    #[test]
    fn test_status_token_from_content_tracks_bytes() {
        let a = StatusToken::from_content(b"{\"title\":\"a\"}");
        let b = StatusToken::from_content(b"{\"title\":\"a\"}");
        let c = StatusToken::from_content(b"{\"title\":\"b\"}");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_entity_id_from_uuid() {
        let id = Uuid::nil();
        assert_eq!(
            EntityId::from(id).as_str(),
            "00000000-0000-0000-0000-000000000000"
        );
    }
}
