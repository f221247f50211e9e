//! Staleness detection and delta computation.
//!
//! An entry is judged one level deep first: its own status token, then the
//! reference and target token of every direct relationship. Relationships that
//! pass that check are then followed through the cache to make sure the
//! expanded subgraph the entry embeds is still the current one. Those are
//! reported separately (`nested`) because the relationship itself did not
//! change; re-expanding it lets the nested descriptor report its own change.
//!
//! A cached back-reference holds only while its target is still being
//! expanded by the caller; see [`CacheResolver::with_ancestors`].

use crate::store::{CacheEntry, DenormalizationCache};
use denorm_core::{
    CollectionDescriptor, DenormalizedCollection, DenormalizedEntity, DenormalizedRelationship,
    Descriptor, Node, NormalizedEntity, NormalizedRepository, ObservedRelationship,
    ObservedStatuses, RelationshipRef,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Cache state of one descriptor against the current repository.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// No entry exists.
    Missing,
    /// The entry is current and can be returned as is.
    Valid(Arc<DenormalizedEntity>),
    /// The entry exists but part of it is out of date.
    Stale {
        cached: Arc<DenormalizedEntity>,
        /// Relationships whose reference or target status changed.
        changed: BTreeSet<String>,
        /// Unchanged relationships whose expanded subgraph is out of date.
        nested: BTreeSet<String>,
        /// The entity's own status changed.
        own_changed: bool,
    },
}

impl Resolution {
    pub fn kind(&self) -> ResolutionKind {
        match self {
            Resolution::Missing => ResolutionKind::Missing,
            Resolution::Valid(_) => ResolutionKind::Valid,
            Resolution::Stale { .. } => ResolutionKind::Stale,
        }
    }

    /// Every relationship that has to be re-expanded.
    pub fn recompute_set(&self) -> BTreeSet<String> {
        match self {
            Resolution::Stale {
                changed, nested, ..
            } => changed.union(nested).cloned().collect(),
            Resolution::Missing | Resolution::Valid(_) => BTreeSet::new(),
        }
    }
}

/// Outcome of a resolution without the values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    Missing,
    Valid,
    Stale,
    /// Cached, but the entity is gone from the repository.
    Orphaned,
}

/// Whether a collection's membership matches its cached record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Missing,
    Changed,
    Unchanged,
}

/// Cache state of one collection member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberResolution {
    Present(ResolutionKind),
    /// Not in the schema's storage partition.
    Absent,
}

/// Cache state of a collection against the current repository.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionResolution {
    pub membership: Membership,
    pub members: Vec<MemberResolution>,
    pub cached: Option<Arc<DenormalizedCollection>>,
}

impl CollectionResolution {
    /// Servable unchanged: same membership, every member valid, and the
    /// record still holds each member's current value.
    pub fn is_valid(&self) -> bool {
        self.membership == Membership::Unchanged
            && self.cached.is_some()
            && self
                .members
                .iter()
                .all(|member| *member == MemberResolution::Present(ResolutionKind::Valid))
    }
}

/// Status tokens of every target of a relationship, in reference order.
pub fn observe_relationship(
    repo: &dyn NormalizedRepository,
    reference: &RelationshipRef,
) -> ObservedRelationship {
    ObservedRelationship {
        reference: reference.clone(),
        tokens: reference
            .targets()
            .iter()
            .map(|target| repo.status_token(target))
            .collect(),
    }
}

/// Observed statuses for every relationship of an entity.
pub fn observe_relationships(
    repo: &dyn NormalizedRepository,
    entity: &NormalizedEntity,
) -> ObservedStatuses {
    entity
        .relationships
        .iter()
        .map(|(name, reference)| (name.clone(), observe_relationship(repo, reference)))
        .collect()
}

fn relationship_changed(
    repo: &dyn NormalizedRepository,
    observed: Option<&ObservedRelationship>,
    current: Option<&RelationshipRef>,
) -> bool {
    match (observed, current) {
        (Some(observed), Some(current)) => {
            observed.reference != *current
                || observed
                    .reference
                    .targets()
                    .iter()
                    .zip(&observed.tokens)
                    .any(|(target, token)| repo.status_token(target) != *token)
        }
        (None, None) => false,
        // Added or deleted.
        _ => true,
    }
}

/// Read-only view over one cache and one repository snapshot.
pub struct CacheResolver<'a> {
    cache: &'a DenormalizationCache,
    repo: &'a dyn NormalizedRepository,
    ancestors: &'a [Descriptor],
}

/// State of one subgraph walk.
struct Walk {
    /// Entities being expanded above the node under inspection.
    stack: Vec<Descriptor>,
    memo: HashMap<Descriptor, bool>,
    /// Verdicts that depended on `stack`; those are not memoized.
    contextual: usize,
}

impl<'a> CacheResolver<'a> {
    pub fn new(cache: &'a DenormalizationCache, repo: &'a dyn NormalizedRepository) -> Self {
        Self {
            cache,
            repo,
            ancestors: &[],
        }
    }

    /// Entities the caller is currently expanding, outermost first.
    ///
    /// A cached back-reference only holds while its target is one of them.
    pub fn with_ancestors(mut self, ancestors: &'a [Descriptor]) -> Self {
        self.ancestors = ancestors;
        self
    }

    /// Classify the entry for `entity` and compute its recomputation delta.
    pub fn resolve_item(&self, entity: &NormalizedEntity) -> Resolution {
        let Some(entry) = self.cache.entry(&entity.descriptor) else {
            return Resolution::Missing;
        };

        let own_changed = entry.own_status != entity.status.token;
        let names: BTreeSet<&String> = entry
            .observed
            .keys()
            .chain(entity.relationships.keys())
            .collect();

        let mut changed = BTreeSet::new();
        let mut nested = BTreeSet::new();
        let mut walk = Walk {
            stack: self.ancestors.to_vec(),
            memo: HashMap::new(),
            contextual: 0,
        };
        if walk.stack.last() != Some(&entity.descriptor) {
            walk.stack.push(entity.descriptor.clone());
        }

        for name in names {
            let direct = own_changed
                || relationship_changed(
                    self.repo,
                    entry.observed.get(name),
                    entity.relationships.get(name),
                );
            if direct {
                changed.insert(name.clone());
                continue;
            }
            match entry.value.relationships.get(name) {
                Some(relationship) if self.subgraph_current(relationship, &mut walk) => {}
                Some(_) => {
                    nested.insert(name.clone());
                }
                None => {
                    changed.insert(name.clone());
                }
            }
        }

        if !own_changed && changed.is_empty() && nested.is_empty() {
            Resolution::Valid(Arc::clone(&entry.value))
        } else {
            Resolution::Stale {
                cached: Arc::clone(&entry.value),
                changed,
                nested,
                own_changed,
            }
        }
    }

    /// Like [`resolve_item`](Self::resolve_item) but starting from a
    /// descriptor, which may be absent from the repository.
    pub fn resolve_descriptor(&self, descriptor: &Descriptor) -> ResolutionKind {
        match self.repo.entity(descriptor) {
            Some(entity) => self.resolve_item(&entity).kind(),
            None if self.cache.entry(descriptor).is_some() => ResolutionKind::Orphaned,
            None => ResolutionKind::Missing,
        }
    }

    /// Classify a collection: membership against the record, then every member.
    pub fn resolve_collection(&self, collection: &CollectionDescriptor) -> CollectionResolution {
        let record = self.cache.collection(&collection.key);
        let membership = match record {
            None => Membership::Missing,
            Some(record) if record.members() == collection.members.as_slice() => {
                Membership::Unchanged
            }
            Some(_) => Membership::Changed,
        };

        let partition = self.repo.partition(collection.schema());
        let members = collection
            .members
            .iter()
            .map(|member| {
                let entity = if member.schema == *collection.schema() {
                    partition.and_then(|p| p.get(&member.id)).cloned()
                } else {
                    self.repo.entity(member)
                };
                match entity {
                    Some(entity) => MemberResolution::Present(self.resolve_item(&entity).kind()),
                    None => MemberResolution::Absent,
                }
            })
            .collect();

        // The record may hold an older value of a member that was since
        // recomputed through a different path.
        let cached = record.map(|record| Arc::clone(&record.value));
        let holds_current = cached.as_ref().map_or(false, |value| {
            value.items.iter().all(|item| {
                self.cache
                    .entry(&item.descriptor)
                    .map_or(false, |entry| Arc::ptr_eq(&entry.value, item))
            })
        });
        let membership = match membership {
            Membership::Unchanged if !holds_current => Membership::Changed,
            other => other,
        };

        CollectionResolution {
            membership,
            members,
            cached,
        }
    }

    fn subgraph_current(&self, relationship: &DenormalizedRelationship, walk: &mut Walk) -> bool {
        relationship.nodes().iter().all(|node| match node {
            // An ancestor embedded by value: a fresh expansion would stop at
            // a back-reference here.
            Node::Entity(value) if walk.stack.contains(&value.descriptor) => {
                walk.contextual += 1;
                false
            }
            Node::Entity(value) => match self.cache.entry(&value.descriptor) {
                Some(entry) => Arc::ptr_eq(&entry.value, value) && self.entry_current(entry, walk),
                None => false,
            },
            Node::BackReference(target) => {
                walk.contextual += 1;
                walk.stack.contains(target)
            }
            // Appearance of the target is covered by the token check.
            Node::Unresolved(_) => true,
        })
    }

    /// Whether an entry and everything it embeds reflect the repository
    /// when expanded below the walk's stack.
    fn entry_current(&self, entry: &CacheEntry, walk: &mut Walk) -> bool {
        if let Some(&current) = walk.memo.get(&entry.descriptor) {
            return current;
        }
        let contextual = walk.contextual;
        walk.stack.push(entry.descriptor.clone());

        let current = match self.repo.entity(&entry.descriptor) {
            // Gone from storage: the cached value is what gets served.
            None => true,
            Some(entity) => {
                entry.own_status == entity.status.token
                    && entry
                        .observed
                        .keys()
                        .chain(entity.relationships.keys())
                        .all(|name| {
                            !relationship_changed(
                                self.repo,
                                entry.observed.get(name),
                                entity.relationships.get(name),
                            )
                        })
                    && entry
                        .value
                        .relationships
                        .values()
                        .all(|relationship| self.subgraph_current(relationship, walk))
            }
        };

        walk.stack.pop();
        if walk.contextual == contextual {
            walk.memo.insert(entry.descriptor.clone(), current);
        }
        current
    }
}
