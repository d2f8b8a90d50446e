//! The entity index: the allocator plus the header table it backs, kept together because every
//! slot operation touches both.

use crate::entity::lifecycle::Lifecycle;
use crate::entity::{Allocator, Entity};
use crate::storage::EntityHeader;

/// Headers and allocator for one repository's entity slots.
#[derive(Default, Clone)]
pub struct EntityIndex {
    allocator: Allocator,
    headers: Vec<EntityHeader>,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a slot and activate its header at `lifecycle`.
    pub fn create(&mut self, lifecycle: Lifecycle) -> Entity {
        let entity = self.allocator.alloc();
        let idx = entity.index().as_usize();
        if idx >= self.headers.len() {
            self.headers.resize_with(idx + 1, EntityHeader::vacant);
        }
        self.headers[idx].activate(entity.generation(), lifecycle);
        entity
    }

    /// If `entity` is alive and its generation matches the slot, deactivate the header and
    /// return the slot to the allocator's free-list. Idempotent: returns `false` on a stale or
    /// already-dead handle without side effects.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        let Some(idx) = self.check_live(entity) else {
            return false;
        };
        self.headers[idx].deactivate();
        self.allocator.free(entity);
        true
    }

    /// The slot index for `entity` if it is alive and its generation matches the slot's
    /// current one.
    pub fn check_live(&self, entity: Entity) -> Option<usize> {
        let idx = entity.index().as_usize();
        let header = self.headers.get(idx)?;
        (header.alive && header.generation == entity.generation()).then_some(idx)
    }

    pub fn header(&self, idx: usize) -> Option<&EntityHeader> {
        self.headers.get(idx)
    }

    pub fn header_mut(&mut self, idx: usize) -> Option<&mut EntityHeader> {
        self.headers.get_mut(idx)
    }

    /// The full header table, ascending by entity index — the order queries iterate in.
    pub fn headers(&self) -> &[EntityHeader] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Return every currently-live slot to the free-list and deactivate its header, without
    /// shrinking the header table. Used by `soft_clear` when recycling a replica into a pool.
    pub fn soft_clear(&mut self) {
        for idx in 0..self.headers.len() {
            if self.headers[idx].alive {
                let entity = Entity::new(idx.into(), self.headers[idx].generation);
                self.headers[idx].deactivate();
                self.allocator.free(entity);
            }
        }
    }

    /// Overwrite this index to mirror `source`: headers and allocator state are copied wholesale.
    /// Headers carry no per-slot version, so unlike component chunks there is no dirty check —
    /// every `sync_from` call copies the full table.
    pub fn sync_from(&mut self, source: &EntityIndex) {
        self.headers.clone_from(&source.headers);
        self.allocator.clone_from(&source.allocator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_activates_header_at_requested_lifecycle() {
        let mut index = EntityIndex::new();
        let entity = index.create(Lifecycle::Constructing);

        let header = index.header(entity.index().as_usize()).unwrap();
        assert!(header.alive);
        assert_eq!(header.lifecycle, Lifecycle::Constructing);
    }

    #[test]
    fn destroy_is_idempotent_on_a_stale_handle() {
        let mut index = EntityIndex::new();
        let entity = index.create(Lifecycle::Active);

        assert!(index.destroy(entity));
        assert!(!index.destroy(entity));
    }

    #[test]
    fn check_live_rejects_stale_generation() {
        let mut index = EntityIndex::new();
        let first = index.create(Lifecycle::Active);
        index.destroy(first);
        let second = index.create(Lifecycle::Active);

        assert_eq!(first.index(), second.index());
        assert!(index.check_live(first).is_none());
        assert!(index.check_live(second).is_some());
    }

    #[test]
    fn soft_clear_frees_every_live_slot_without_shrinking_table() {
        let mut index = EntityIndex::new();
        index.create(Lifecycle::Active);
        index.create(Lifecycle::Active);
        let len_before = index.len();

        index.soft_clear();

        assert_eq!(index.len(), len_before);
        assert!(index.headers().iter().all(|h| !h.alive));
    }

    #[test]
    fn sync_from_mirrors_headers_and_allocator_state() {
        let mut source = EntityIndex::new();
        source.create(Lifecycle::Active);
        source.create(Lifecycle::Active);

        let mut dest = EntityIndex::new();
        dest.sync_from(&source);

        assert_eq!(dest.len(), source.len());
        assert_eq!(
            dest.header(0).unwrap().generation,
            source.header(0).unwrap().generation
        );
    }
}
