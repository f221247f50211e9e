//! Normalized and denormalized entity structures

use crate::{Descriptor, EntityId, SchemaName, StatusToken, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Plain attribute values of an entity, keyed by attribute name.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Status block carried by every normalized entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStatus {
    /// Changes iff the stored representation changes.
    pub token: StatusToken,
    /// Whether the stored value is considered valid (not invalidated upstream).
    pub valid: bool,
    /// Whether a refresh of this entity is in flight upstream.
    pub loading: bool,
    pub updated_at: Option<Timestamp>,
}

impl EntityStatus {
    /// A valid, settled status with the given token.
    pub fn new(token: StatusToken) -> Self {
        Self {
            token,
            valid: true,
            loading: false,
            updated_at: None,
        }
    }
}

/// A relationship as stored in normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipRef {
    One(Descriptor),
    Many(Vec<Descriptor>),
    Null,
}

impl RelationshipRef {
    /// Referenced descriptors in declaration order.
    pub fn targets(&self) -> &[Descriptor] {
        match self {
            RelationshipRef::One(descriptor) => std::slice::from_ref(descriptor),
            RelationshipRef::Many(descriptors) => descriptors,
            RelationshipRef::Null => &[],
        }
    }
}

/// Entity in normalized form: attributes plus references.
///
/// Owned by the repository; read-only to the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEntity {
    pub descriptor: Descriptor,
    pub attributes: Attributes,
    pub relationships: BTreeMap<String, RelationshipRef>,
    pub status: EntityStatus,
}

impl NormalizedEntity {
    pub fn new(descriptor: Descriptor, status: EntityStatus) -> Self {
        Self {
            descriptor,
            attributes: Attributes::new(),
            relationships: BTreeMap::new(),
            status,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn with_relationship(mut self, name: impl Into<String>, reference: RelationshipRef) -> Self {
        self.relationships.insert(name.into(), reference);
        self
    }

    pub fn id(&self) -> &EntityId {
        &self.descriptor.id
    }

    pub fn schema(&self) -> &SchemaName {
        &self.descriptor.schema
    }

    pub fn token(&self) -> &StatusToken {
        &self.status.token
    }
}

/// One expanded position inside a denormalized relationship.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Entity(Arc<DenormalizedEntity>),
    /// Placeholder for a reference back to an entity still being expanded.
    BackReference(Descriptor),
    /// Reference whose target is absent from the repository.
    Unresolved(Descriptor),
}

impl Node {
    pub fn entity(&self) -> Option<&Arc<DenormalizedEntity>> {
        match self {
            Node::Entity(entity) => Some(entity),
            Node::BackReference(_) | Node::Unresolved(_) => None,
        }
    }
}

/// A relationship with its references replaced by expanded entities.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DenormalizedRelationship {
    One(Node),
    Many(Vec<Node>),
    Null,
}

impl DenormalizedRelationship {
    pub fn nodes(&self) -> &[Node] {
        match self {
            DenormalizedRelationship::One(node) => std::slice::from_ref(node),
            DenormalizedRelationship::Many(nodes) => nodes,
            DenormalizedRelationship::Null => &[],
        }
    }

    /// The single expanded entity of a to-one relationship.
    pub fn one(&self) -> Option<&Arc<DenormalizedEntity>> {
        match self {
            DenormalizedRelationship::One(node) => node.entity(),
            _ => None,
        }
    }
}

/// The reference a relationship held at computation time and the status
/// token each target had then (`None` when the target was absent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedRelationship {
    pub reference: RelationshipRef,
    pub tokens: Vec<Option<StatusToken>>,
}

/// Observed relationship statuses keyed by relationship name.
pub type ObservedStatuses = BTreeMap<String, ObservedRelationship>;

/// Status metadata stamped onto a denormalized entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMeta {
    pub own: EntityStatus,
    pub observed: ObservedStatuses,
}

/// Entity in denormalized (expanded) form.
///
/// Immutable once cached: recomputation produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DenormalizedEntity {
    pub descriptor: Descriptor,
    pub attributes: Attributes,
    pub relationships: BTreeMap<String, DenormalizedRelationship>,
    pub status: Option<StatusMeta>,
}

impl DenormalizedEntity {
    pub fn id(&self) -> &EntityId {
        &self.descriptor.id
    }

    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }

    pub fn relationship(&self, name: &str) -> Option<&DenormalizedRelationship> {
        self.relationships.get(name)
    }
}

/// Identity of a cached collection: the schema plus a caller-supplied tag
/// distinguishing semantically different views of the same schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionKey {
    pub schema: SchemaName,
    pub tag: Option<String>,
}

/// Ordered collection of member descriptors plus collection metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    pub key: CollectionKey,
    pub members: Vec<Descriptor>,
}

impl CollectionDescriptor {
    pub fn schema(&self) -> &SchemaName {
        &self.key.schema
    }
}

/// Aggregate status stamped onto a denormalized collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStatus {
    /// False if any member is invalid.
    pub valid: bool,
    /// True if any member is loading.
    pub loading: bool,
    pub len: usize,
}

/// Ordered sequence of denormalized members as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DenormalizedCollection {
    pub key: CollectionKey,
    pub members: Vec<Descriptor>,
    pub items: Vec<Arc<DenormalizedEntity>>,
    pub status: CollectionStatus,
}

impl DenormalizedCollection {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
