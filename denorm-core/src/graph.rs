//! Graph denormalization boundary.
//!
//! A [`GraphDenormalizer`] expands one entity. It never reaches into storage
//! for related entities itself: every nested reference goes back through a
//! [`NestedResolver`], which is where the caching layer hooks in.

use crate::{
    Attributes, Descriptor, DenormResult, DenormalizedEntity, DenormalizedRelationship, Node,
    NormalizedEntity, RelationshipRef,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of resolving one nested reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Nested {
    Resolved(Arc<DenormalizedEntity>),
    /// The descriptor is already being expanded further up the call.
    BackReference,
    /// The descriptor is absent from the repository and has no cached value.
    Unresolved,
}

impl Nested {
    fn into_node(self, descriptor: &Descriptor) -> Node {
        match self {
            Nested::Resolved(entity) => Node::Entity(entity),
            Nested::BackReference => Node::BackReference(descriptor.clone()),
            Nested::Unresolved => Node::Unresolved(descriptor.clone()),
        }
    }
}

/// Callback used by the graph walker to expand related entities.
pub trait NestedResolver {
    fn resolve_nested(&mut self, descriptor: &Descriptor) -> DenormResult<Nested>;
}

/// Expands normalized entities into their denormalized form.
pub trait GraphDenormalizer: Send + Sync {
    /// Resolve only the entity's own attributes.
    fn denormalize_attributes(&self, entity: &NormalizedEntity) -> Attributes;

    /// Expand one relationship, resolving every target through `nested`.
    fn denormalize_relationship(
        &self,
        reference: &RelationshipRef,
        nested: &mut dyn NestedResolver,
    ) -> DenormResult<DenormalizedRelationship> {
        match reference {
            RelationshipRef::Null => Ok(DenormalizedRelationship::Null),
            RelationshipRef::One(descriptor) => {
                let node = nested.resolve_nested(descriptor)?.into_node(descriptor);
                Ok(DenormalizedRelationship::One(node))
            }
            RelationshipRef::Many(descriptors) => {
                let mut nodes = Vec::with_capacity(descriptors.len());
                for descriptor in descriptors {
                    nodes.push(nested.resolve_nested(descriptor)?.into_node(descriptor));
                }
                Ok(DenormalizedRelationship::Many(nodes))
            }
        }
    }

    /// Expand the entity and every reachable relationship.
    fn denormalize_full(
        &self,
        entity: &NormalizedEntity,
        nested: &mut dyn NestedResolver,
    ) -> DenormResult<DenormalizedEntity> {
        let attributes = self.denormalize_attributes(entity);
        let mut relationships = BTreeMap::new();
        for (name, reference) in &entity.relationships {
            relationships.insert(name.clone(), self.denormalize_relationship(reference, nested)?);
        }
        Ok(DenormalizedEntity {
            descriptor: entity.descriptor.clone(),
            attributes,
            relationships,
            status: None,
        })
    }
}

/// Stock graph denormalizer: attributes are carried over verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardGraphDenormalizer;

impl GraphDenormalizer for StandardGraphDenormalizer {
    fn denormalize_attributes(&self, entity: &NormalizedEntity) -> Attributes {
        entity.attributes.clone()
    }
}
