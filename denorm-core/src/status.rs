//! Status stamping for denormalized values.

use crate::{
    CollectionKey, CollectionStatus, DenormalizedEntity, NormalizedEntity, ObservedStatuses,
    StatusMeta,
};
use std::sync::Arc;

/// Stamps externally-visible status metadata onto denormalized values.
pub trait StatusStamper: Send + Sync {
    /// Attach status derived from `source` and the relationship statuses
    /// observed while computing `target`.
    fn stamp_item(
        &self,
        source: &NormalizedEntity,
        observed: &ObservedStatuses,
        target: DenormalizedEntity,
    ) -> DenormalizedEntity;

    /// Aggregate member statuses into a collection status.
    fn stamp_collection(
        &self,
        key: &CollectionKey,
        items: &[Arc<DenormalizedEntity>],
    ) -> CollectionStatus;
}

/// Copies the normalized status block and observed tokens verbatim.
///
/// A collection is valid only if every member is valid, and loading if any
/// member is loading. Members without stamped status count as valid.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStatusStamper;

impl StatusStamper for DefaultStatusStamper {
    fn stamp_item(
        &self,
        source: &NormalizedEntity,
        observed: &ObservedStatuses,
        mut target: DenormalizedEntity,
    ) -> DenormalizedEntity {
        target.status = Some(StatusMeta {
            own: source.status.clone(),
            observed: observed.clone(),
        });
        target
    }

    fn stamp_collection(
        &self,
        _key: &CollectionKey,
        items: &[Arc<DenormalizedEntity>],
    ) -> CollectionStatus {
        let statuses = items.iter().filter_map(|item| item.status.as_ref());
        let (valid, loading) = statuses.fold((true, false), |(valid, loading), meta| {
            (valid && meta.own.valid, loading || meta.own.loading)
        });
        CollectionStatus {
            valid,
            loading,
            len: items.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Attributes, Descriptor, EntityStatus, ObservedRelationship, RelationshipRef, SchemaName,
        StatusToken,
    };
    use std::collections::BTreeMap;

    fn entity(id: &str, valid: bool, loading: bool) -> NormalizedEntity {
        let mut status = EntityStatus::new(StatusToken::new(format!("t{}", id)));
        status.valid = valid;
        status.loading = loading;
        NormalizedEntity::new(Descriptor::new(id, "people"), status)
    }

    fn bare(id: &str) -> DenormalizedEntity {
        DenormalizedEntity {
            descriptor: Descriptor::new(id, "people"),
            attributes: Attributes::new(),
            relationships: BTreeMap::new(),
            status: None,
        }
    }

    #[test]
    fn test_stamp_item_copies_status_and_observed() {
        let source = entity("7", true, false);
        let mut observed = ObservedStatuses::new();
        observed.insert(
            "friend".to_string(),
            ObservedRelationship {
                reference: RelationshipRef::One(Descriptor::new("8", "people")),
                tokens: vec![Some(StatusToken::new("t8"))],
            },
        );

        let stamped = DefaultStatusStamper.stamp_item(&source, &observed, bare("7"));
        let meta = stamped.status.unwrap();
        assert_eq!(meta.own.token, StatusToken::new("t7"));
        assert_eq!(meta.observed, observed);
    }

    #[test]
    fn test_stamp_collection_aggregates() {
        let key = CollectionKey {
            schema: SchemaName::new("people"),
            tag: None,
        };
        let stamp = |id: &str, valid: bool, loading: bool| {
            Arc::new(DefaultStatusStamper.stamp_item(
                &entity(id, valid, loading),
                &ObservedStatuses::new(),
                bare(id),
            ))
        };

        let all_valid = vec![stamp("1", true, false), stamp("2", true, false)];
        let status = DefaultStatusStamper.stamp_collection(&key, &all_valid);
        assert!(status.valid);
        assert!(!status.loading);
        assert_eq!(status.len, 2);

        let one_invalid = vec![stamp("1", true, false), stamp("2", false, true)];
        let status = DefaultStatusStamper.stamp_collection(&key, &one_invalid);
        assert!(!status.valid);
        assert!(status.loading);

        let empty = DefaultStatusStamper.stamp_collection(&key, &[]);
        assert!(empty.valid);
        assert_eq!(empty.len, 0);
    }
}
