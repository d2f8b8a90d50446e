//! The managed column (§3): a per-type mapping from entity index to an opaque shared handle,
//! for reference-typed components where identity (not value) is what matters. Replicas that
//! `sync_from` a managed column get a reference copy of the same instances, never a deep clone.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// A type-erased, shared handle to one entity's managed component value.
pub type Handle = Arc<dyn Any + Send + Sync>;

/// Entity-index-keyed storage for one managed component type.
#[derive(Default)]
pub struct ManagedColumn {
    entries: HashMap<usize, Handle>,
}

impl ManagedColumn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `handle` to `slot`, replacing any existing value.
    pub fn set(&mut self, slot: usize, handle: Handle) {
        self.entries.insert(slot, handle);
    }

    /// The handle at `slot`, if any.
    pub fn get(&self, slot: usize) -> Option<&Handle> {
        self.entries.get(&slot)
    }

    /// The handle at `slot` downcast to `T`, if present and of that concrete type.
    pub fn get_as<T: 'static>(&self, slot: usize) -> Option<&T> {
        self.get(slot)?.downcast_ref::<T>()
    }

    /// Detach `slot`'s value, returning whether one was present.
    pub fn remove(&mut self, slot: usize) -> bool {
        self.entries.remove(&slot).is_some()
    }

    /// Reference-copy every entry from `source`, overwriting whatever this column held. Used by
    /// `sync_from`: managed values are shared, not deep-cloned, across replicas.
    pub fn sync_from(&mut self, source: &ManagedColumn) {
        self.entries.clone_from(&source.entries);
    }

    /// Drop every entry without shrinking the underlying map's capacity — used by `soft_clear`.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips_by_concrete_type() {
        let mut column = ManagedColumn::new();
        column.set(0, Arc::new(String::from("hello")));

        assert_eq!(column.get_as::<String>(0).unwrap(), "hello");
        assert!(column.get_as::<u32>(0).is_none());
    }

    #[test]
    fn sync_from_shares_the_same_instance() {
        let mut source = ManagedColumn::new();
        let handle: Handle = Arc::new(42u32);
        source.set(0, Arc::clone(&handle));

        let mut dest = ManagedColumn::new();
        dest.sync_from(&source);

        assert!(Arc::ptr_eq(dest.get(0).unwrap(), &handle));
    }

    #[test]
    fn remove_reports_whether_a_value_was_present() {
        let mut column = ManagedColumn::new();
        column.set(0, Arc::new(1u32));

        assert!(column.remove(0));
        assert!(!column.remove(0));
    }
}
