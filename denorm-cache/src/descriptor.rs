//! Descriptor construction from caller input.
//!
//! Callers name entities either by a bare id (which needs a schema from
//! somewhere) or by an already-typed reference. Everything is turned into
//! [`Descriptor`]s once, at the API boundary.

use denorm_core::{
    CollectionDescriptor, CollectionKey, DenormResult, Descriptor, DescriptorError, EntityId,
    SchemaName,
};

/// One entity as named by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemInput {
    /// Bare identifier; the schema must be supplied separately.
    Id(EntityId),
    /// Reference that may already carry its schema.
    Reference {
        id: EntityId,
        schema: Option<SchemaName>,
    },
}

impl ItemInput {
    pub fn id(id: impl Into<EntityId>) -> Self {
        Self::Id(id.into())
    }

    pub fn reference(id: impl Into<EntityId>, schema: impl Into<SchemaName>) -> Self {
        Self::Reference {
            id: id.into(),
            schema: Some(schema.into()),
        }
    }

    fn entity_id(&self) -> &EntityId {
        match self {
            ItemInput::Id(id) | ItemInput::Reference { id, .. } => id,
        }
    }

    fn own_schema(&self) -> Option<&SchemaName> {
        match self {
            ItemInput::Id(_) => None,
            ItemInput::Reference { schema, .. } => schema.as_ref(),
        }
    }
}

impl From<Descriptor> for ItemInput {
    fn from(descriptor: Descriptor) -> Self {
        Self::Reference {
            id: descriptor.id,
            schema: Some(descriptor.schema),
        }
    }
}

/// An ordered collection as named by a caller, with its own metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionInput {
    pub items: Vec<ItemInput>,
    /// Schema recorded on the collection itself.
    pub schema: Option<SchemaName>,
    /// Distinguishes semantically different views of the same schema.
    pub tag: Option<String>,
}

impl CollectionInput {
    pub fn new(items: impl IntoIterator<Item = ItemInput>) -> Self {
        Self {
            items: items.into_iter().collect(),
            schema: None,
            tag: None,
        }
    }

    /// Collection of bare ids.
    pub fn of_ids<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EntityId>,
    {
        Self::new(ids.into_iter().map(|id| ItemInput::Id(id.into())))
    }

    pub fn with_schema(mut self, schema: impl Into<SchemaName>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Build the descriptor for a single item.
///
/// With an explicit schema the input is used as a bare identifier. Without
/// one the input must be a reference that carries its own schema.
pub fn build_item_descriptor(
    input: &ItemInput,
    explicit_schema: Option<&SchemaName>,
) -> DenormResult<Descriptor> {
    let id = input.entity_id().clone();
    if let Some(schema) = explicit_schema {
        return Ok(Descriptor::new(id, schema.clone()));
    }
    match input.own_schema() {
        Some(schema) => Ok(Descriptor::new(id, schema.clone())),
        None => Err(DescriptorError::MalformedReference {
            id,
            reason: "reference has no type and no schema was given".to_string(),
        }
        .into()),
    }
}

/// Derive the collection schema when the caller did not name one.
fn derive_schema(input: &CollectionInput) -> DenormResult<SchemaName> {
    let mut candidates: Vec<SchemaName> = Vec::new();
    let declared = input.schema.iter();
    let typed = input.items.iter().filter_map(ItemInput::own_schema);
    for schema in declared.chain(typed) {
        if !candidates.contains(schema) {
            candidates.push(schema.clone());
        }
    }

    match candidates.len() {
        0 => Err(DescriptorError::MalformedReference {
            id: input
                .items
                .first()
                .map(|item| item.entity_id().clone())
                .unwrap_or_else(|| EntityId::new("")),
            reason: "collection has no type and no schema was given".to_string(),
        }
        .into()),
        1 => Ok(candidates.remove(0)),
        _ => Err(DescriptorError::AmbiguousSchema { candidates }.into()),
    }
}

/// Build the descriptor for an ordered collection.
///
/// The collection schema is the explicit one if given, otherwise the single
/// schema that the collection's own metadata and every typed member agree on.
/// Bare ids take that schema. With an explicit schema every member is treated
/// as a bare identifier.
pub fn build_collection_descriptor(
    input: &CollectionInput,
    explicit_schema: Option<&SchemaName>,
) -> DenormResult<CollectionDescriptor> {
    let schema = match explicit_schema {
        Some(schema) => schema.clone(),
        None => derive_schema(input)?,
    };

    // Typed members already agree with `schema` unless it was explicit, in
    // which case they are bare identifiers by definition.
    let members = input
        .items
        .iter()
        .map(|item| build_item_descriptor(item, Some(&schema)))
        .collect::<DenormResult<Vec<_>>>()?;

    Ok(CollectionDescriptor {
        key: CollectionKey {
            schema,
            tag: input.tag.clone(),
        },
        members,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use denorm_core::DenormError;

    fn articles() -> SchemaName {
        SchemaName::new("articles")
    }

    #[test]
    fn test_item_with_explicit_schema() {
        let d = build_item_descriptor(&ItemInput::id(1u64), Some(&articles())).unwrap();
        assert_eq!(d, Descriptor::new("1", "articles"));
    }

    #[test]
    fn test_item_explicit_schema_overrides_reference_type() {
        let d = build_item_descriptor(&ItemInput::reference("1", "people"), Some(&articles()))
            .unwrap();
        assert_eq!(d, Descriptor::new("1", "articles"));
    }

    #[test]
    fn test_item_typed_reference() {
        let d = build_item_descriptor(&ItemInput::reference("7", "people"), None).unwrap();
        assert_eq!(d, Descriptor::new("7", "people"));
    }

    #[test]
    fn test_item_without_type_is_malformed() {
        let err = build_item_descriptor(&ItemInput::id("7"), None).unwrap_err();
        assert!(matches!(
            err,
            DenormError::Descriptor(DescriptorError::MalformedReference { .. })
        ));

        let untyped = ItemInput::Reference {
            id: EntityId::new("7"),
            schema: None,
        };
        assert!(build_item_descriptor(&untyped, None).is_err());
    }

    #[test]
    fn test_collection_of_ids_with_explicit_schema() {
        let input = CollectionInput::of_ids(["1", "2", "3"]).with_tag("recent");
        let c = build_collection_descriptor(&input, Some(&articles())).unwrap();
        assert_eq!(c.key.schema, articles());
        assert_eq!(c.key.tag.as_deref(), Some("recent"));
        assert_eq!(
            c.members,
            vec![
                Descriptor::new("1", "articles"),
                Descriptor::new("2", "articles"),
                Descriptor::new("3", "articles"),
            ]
        );
    }

    #[test]
    fn test_collection_schema_from_own_metadata() {
        let input = CollectionInput::of_ids([1u64, 2]).with_schema("articles");
        let c = build_collection_descriptor(&input, None).unwrap();
        assert_eq!(c.key.schema, articles());
        assert_eq!(c.members[1], Descriptor::new("2", "articles"));
    }

    #[test]
    fn test_collection_schema_inferred_from_references() {
        let input = CollectionInput::new([
            ItemInput::reference("1", "articles"),
            ItemInput::reference("2", "articles"),
        ]);
        let c = build_collection_descriptor(&input, None).unwrap();
        assert_eq!(c.key.schema, articles());
        assert!(c.key.tag.is_none());
    }

    #[test]
    fn test_mixed_collection_without_schema_is_ambiguous() {
        let input = CollectionInput::new([
            ItemInput::reference("1", "articles"),
            ItemInput::reference("7", "people"),
        ]);
        let err = build_collection_descriptor(&input, None).unwrap_err();
        match err {
            DenormError::Descriptor(DescriptorError::AmbiguousSchema { candidates }) => {
                assert_eq!(candidates, vec![articles(), SchemaName::new("people")]);
            }
            other => panic!("expected AmbiguousSchema, got {:?}", other),
        }
    }

    #[test]
    fn test_mixed_collection_with_explicit_schema_is_accepted() {
        let input = CollectionInput::new([
            ItemInput::reference("1", "articles"),
            ItemInput::reference("7", "people"),
        ]);
        let c = build_collection_descriptor(&input, Some(&articles())).unwrap();
        assert!(c.members.iter().all(|d| d.schema == articles()));
    }

    #[test]
    fn test_reference_disagreeing_with_declared_schema_is_ambiguous() {
        let input = CollectionInput::new([ItemInput::reference("7", "people")]).with_schema("articles");
        assert!(build_collection_descriptor(&input, None).is_err());
    }

    #[test]
    fn test_untyped_collection_is_malformed() {
        let err = build_collection_descriptor(&CollectionInput::default(), None).unwrap_err();
        assert!(matches!(
            err,
            DenormError::Descriptor(DescriptorError::MalformedReference { .. })
        ));

        let bare = CollectionInput::of_ids(["1", "2"]);
        match build_collection_descriptor(&bare, None).unwrap_err() {
            DenormError::Descriptor(DescriptorError::MalformedReference { id, .. }) => {
                assert_eq!(id, EntityId::new("1"));
            }
            other => panic!("expected MalformedReference, got {:?}", other),
        }
    }
}
