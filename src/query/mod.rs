//! Entity queries (§4.3): a lazy, restartable scan over the entity header table, filtered by
//! component membership, authority membership, lifecycle, and (optionally) a masked predicate
//! over the header's `type_tag`.

use crate::component::Component;
use crate::entity::{Entity, Lifecycle};
use crate::error::Result;
use crate::mask::BitMask256;
use crate::repository::EntityRepository;
use crate::storage::ChunkedColumn;

/// A masked equality test against an entity header's `type_tag`: `header.type_tag & mask ==
/// expect`. Lets a query filter on an opaque caller-defined tag without the repository knowing
/// its meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeTagFilter {
    pub mask: u64,
    pub expect: u64,
}

/// Builds an [`EntityQuery`] over a repository's entities.
///
/// Defaults: no component requirements, no authority requirements, and `lifecycle` restricted to
/// [`Lifecycle::Active`] — a query sees only fully-constructed, non-tearing-down entities unless
/// the caller explicitly widens it.
pub struct QueryBuilder<'r> {
    repository: &'r EntityRepository,
    include: BitMask256,
    exclude: BitMask256,
    authority_include: BitMask256,
    authority_exclude: BitMask256,
    lifecycle: Option<Lifecycle>,
    type_tag: Option<TypeTagFilter>,
}

impl<'r> QueryBuilder<'r> {
    pub(crate) fn new(repository: &'r EntityRepository) -> Self {
        Self {
            repository,
            include: BitMask256::EMPTY,
            exclude: BitMask256::EMPTY,
            authority_include: BitMask256::EMPTY,
            authority_exclude: BitMask256::EMPTY,
            lifecycle: Some(Lifecycle::Active),
            type_tag: None,
        }
    }

    /// Require component `T` to be present.
    pub fn with<T: crate::component::Component>(mut self) -> Self {
        if let Some(id) = self.repository.registry().get::<T>() {
            self.include.set(id.value());
        }
        self
    }

    /// Require component `T` to be absent.
    pub fn without<T: crate::component::Component>(mut self) -> Self {
        if let Some(id) = self.repository.registry().get::<T>() {
            self.exclude.set(id.value());
        }
        self
    }

    /// Require authority bit `id` to be set on the entity's authority mask.
    pub fn with_authority(mut self, id: u16) -> Self {
        self.authority_include.set(id);
        self
    }

    /// Require authority bit `id` to be clear on the entity's authority mask.
    pub fn without_authority(mut self, id: u16) -> Self {
        self.authority_exclude.set(id);
        self
    }

    /// Override the default `Active`-only lifecycle filter. Pass `None` to see entities in any
    /// lifecycle state, including `Constructing`, `TearDown`, and `Ghost`.
    pub fn lifecycle(mut self, lifecycle: Option<Lifecycle>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Require `header.type_tag & filter.mask == filter.expect`.
    pub fn type_tag(mut self, filter: TypeTagFilter) -> Self {
        self.type_tag = Some(filter);
        self
    }

    fn matches(&self, header: &crate::storage::EntityHeader) -> bool {
        if !header.alive {
            return false;
        }
        if let Some(lifecycle) = self.lifecycle {
            if header.lifecycle != lifecycle {
                return false;
            }
        }
        if !header.component_mask.is_superset(&self.include) {
            return false;
        }
        if !header.component_mask.is_disjoint(&self.exclude) {
            return false;
        }
        if !header.authority_mask.is_superset(&self.authority_include) {
            return false;
        }
        if !header.authority_mask.is_disjoint(&self.authority_exclude) {
            return false;
        }
        if let Some(filter) = self.type_tag {
            if header.type_tag & filter.mask != filter.expect {
                return false;
            }
        }
        true
    }

    /// Build the restartable, lazy query iterator.
    pub fn build(self) -> EntityQuery<'r> {
        EntityQuery {
            repository: self.repository,
            include: self.include,
            exclude: self.exclude,
            authority_include: self.authority_include,
            authority_exclude: self.authority_exclude,
            lifecycle: self.lifecycle,
            type_tag: self.type_tag,
            cursor: 0,
        }
    }
}

/// A lazy, restartable iterator over entities matching a [`QueryBuilder`]'s filters, in
/// ascending entity-index order.
pub struct EntityQuery<'r> {
    repository: &'r EntityRepository,
    include: BitMask256,
    exclude: BitMask256,
    authority_include: BitMask256,
    authority_exclude: BitMask256,
    lifecycle: Option<Lifecycle>,
    type_tag: Option<TypeTagFilter>,
    cursor: usize,
}

impl<'r> EntityQuery<'r> {
    fn matches(&self, header: &crate::storage::EntityHeader) -> bool {
        if !header.alive {
            return false;
        }
        if let Some(lifecycle) = self.lifecycle {
            if header.lifecycle != lifecycle {
                return false;
            }
        }
        if !header.component_mask.is_superset(&self.include) {
            return false;
        }
        if !header.component_mask.is_disjoint(&self.exclude) {
            return false;
        }
        if !header.authority_mask.is_superset(&self.authority_include) {
            return false;
        }
        if !header.authority_mask.is_disjoint(&self.authority_exclude) {
            return false;
        }
        if let Some(filter) = self.type_tag {
            if header.type_tag & filter.mask != filter.expect {
                return false;
            }
        }
        true
    }

    /// Rewind to the start of the header table. Re-running after this re-applies the same
    /// filters against the table's current contents.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// How many entities currently match. Shadows [`Iterator::count`] deliberately: that method
    /// consumes the iterator from its current cursor, which is rarely what a caller reaching
    /// for "how many" wants; this counts the full table regardless of cursor position without
    /// consuming anything. Use `Iterator::count(query)` (UFCS) if the consuming form is truly
    /// intended.
    pub fn count(&self) -> usize {
        self.repository
            .headers()
            .iter()
            .filter(|header| self.matches(header))
            .count()
    }

    /// Whether no entity currently matches.
    pub fn is_empty(&self) -> bool {
        self.repository
            .headers()
            .iter()
            .all(|header| !self.matches(header))
    }

    /// Chunk-yielding iteration (spec.md §4.1): walk `T`'s column chunk by chunk, yielding the
    /// whole chunk as a `&[Option<T>]` slice wherever every slot in it is both allocated and
    /// passes this query's filters. A chunk with even one non-matching or vacant slot is skipped
    /// entirely — a consumer that needs the partial match should fall back to per-entity
    /// `Iterator` instead.
    ///
    /// # Errors
    /// [`crate::error::Error::SchemaError`] if `T` isn't registered as an unmanaged component.
    pub fn chunks<T: Component + Clone>(&self) -> Result<impl Iterator<Item = &'r [Option<T>]>> {
        let column: &'r ChunkedColumn<T> = self.repository.get_component_table::<T>()?;
        let headers = self.repository.headers();
        let capacity = column.capacity();
        let matches = move |header: &crate::storage::EntityHeader| self.matches(header);
        Ok((0..column.chunk_count()).filter_map(move |chunk_idx| {
            let span = column.span(chunk_idx)?;
            let start = chunk_idx * capacity;
            let end = (start + capacity).min(headers.len());
            if end - start < capacity {
                return None;
            }
            headers[start..end].iter().all(matches).then_some(span)
        }))
    }
}

impl<'r> Iterator for EntityQuery<'r> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        let headers = self.repository.headers();
        while self.cursor < headers.len() {
            let idx = self.cursor;
            self.cursor += 1;
            let header = &headers[idx];
            if self.matches(header) {
                return Some(Entity::new(idx.into(), header.generation));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{RetentionPolicy, StorageKind};
    use crate::repository::EntityRepository;

    #[derive(Debug, Clone)]
    struct Position;
    #[derive(Debug, Clone)]
    struct Velocity;

    fn repo_with(count: usize) -> EntityRepository {
        let mut repo = EntityRepository::new(4);
        repo.register_component::<Position>(StorageKind::Unmanaged, RetentionPolicy::Persistent)
            .unwrap();
        repo.register_component::<Velocity>(StorageKind::Unmanaged, RetentionPolicy::Persistent)
            .unwrap();
        for _ in 0..count {
            repo.create_entity();
        }
        repo
    }

    #[test]
    fn default_query_sees_only_active_entities() {
        let mut repo = repo_with(0);
        repo.create_entity();
        repo.create_staged_entity();

        let matched: Vec<_> = repo.query().build().collect();
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn with_filters_to_entities_carrying_the_component() {
        let mut repo = repo_with(0);
        let moving = repo.create_entity();
        repo.add_component(moving, Position).unwrap();
        repo.add_component(moving, Velocity).unwrap();
        repo.create_entity();

        let matched: Vec<_> = repo.query().with::<Position>().with::<Velocity>().build().collect();
        assert_eq!(matched, vec![moving]);
    }

    #[test]
    fn without_excludes_entities_carrying_the_component() {
        let mut repo = repo_with(0);
        let still = repo.create_entity();
        repo.add_component(still, Position).unwrap();
        let moving = repo.create_entity();
        repo.add_component(moving, Position).unwrap();
        repo.add_component(moving, Velocity).unwrap();

        let matched: Vec<_> = repo.query().with::<Position>().without::<Velocity>().build().collect();
        assert_eq!(matched, vec![still]);
    }

    #[test]
    fn lifecycle_override_can_see_constructing_entities() {
        let mut repo = repo_with(0);
        let staged = repo.create_staged_entity();

        let matched: Vec<_> = repo
            .query()
            .lifecycle(Some(Lifecycle::Constructing))
            .build()
            .collect();
        assert_eq!(matched, vec![staged]);
    }

    #[test]
    fn reset_replays_the_same_filters() {
        let mut repo = repo_with(0);
        repo.create_entity();
        repo.create_entity();

        let mut query = repo.query().build();
        let first_pass: Vec<_> = query.by_ref().collect();
        query.reset();
        let second_pass: Vec<_> = query.collect();

        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn count_matching_and_is_empty_agree_with_iteration() {
        let mut repo = repo_with(0);
        let query = repo.query().build();
        assert!(query.is_empty());
        assert_eq!(query.count(), 0);

        repo.create_entity();
        let query = repo.query().build();
        assert!(!query.is_empty());
        assert_eq!(query.count(), 1);
    }

    #[test]
    fn chunks_yields_a_full_chunk_only_when_every_slot_matches() {
        let mut repo = repo_with(0);
        // chunk_capacity is 4 (see `repo_with`): one full chunk of matching entities, then a
        // second, partially-filled chunk that must be skipped entirely.
        for _ in 0..4 {
            let e = repo.create_entity();
            repo.add_component(e, Position).unwrap();
        }
        let partial = repo.create_entity();
        repo.add_component(partial, Position).unwrap();

        let query = repo.query().with::<Position>().build();
        let chunks: Vec<_> = query.chunks::<Position>().unwrap().collect();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 4);
        assert!(chunks[0].iter().all(Option::is_some));
    }

    #[test]
    fn chunks_skips_a_chunk_with_any_non_matching_slot() {
        let mut repo = repo_with(0);
        let e0 = repo.create_entity();
        repo.add_component(e0, Position).unwrap();
        repo.create_entity();
        repo.create_entity();
        repo.create_entity();

        let query = repo.query().with::<Position>().build();
        let chunks: Vec<_> = query.chunks::<Position>().unwrap().collect();

        assert!(chunks.is_empty());
    }

    #[test]
    fn chunks_errors_for_an_unregistered_component() {
        let repo = repo_with(0);
        #[derive(Debug, Clone)]
        struct Unregistered;

        let query = repo.query().build();
        assert!(query.chunks::<Unregistered>().is_err());
    }

    #[test]
    fn type_tag_filter_matches_masked_value() {
        let mut repo = repo_with(0);
        let tagged = repo.create_entity();
        repo.set_type_tag(tagged, 0b1010).unwrap();

        let matched: Vec<_> = repo
            .query()
            .type_tag(TypeTagFilter {
                mask: 0b1111,
                expect: 0b1010,
            })
            .build()
            .collect();
        assert_eq!(matched, vec![tagged]);
    }
}
