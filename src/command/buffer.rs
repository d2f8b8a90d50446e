//! A per-thread buffer of recorded operations, merged and played back against the live world
//! once per frame by [`super::merge_and_play`] (§4.5).

use crate::component::Component;
use crate::entity::Lifecycle;
use crate::event::Event;
use crate::mask::BitMask256;

use super::record::{
    PendingEntity, Record, RemoveMarker, Target,
};
use super::thread_id::ThreadId;

/// Records operations for later, deterministic playback. Safe to fill from any thread; never
/// touches the repository directly.
pub struct CommandBuffer {
    thread_id: ThreadId,
    records: Vec<Record>,
    next_pending: u32,
}

impl CommandBuffer {
    pub fn new(thread_id: ThreadId, initial_records: usize) -> Self {
        Self {
            thread_id,
            records: Vec::with_capacity(initial_records),
            next_pending: 0,
        }
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn reserve_pending(&mut self) -> PendingEntity {
        let pending = PendingEntity(self.next_pending);
        self.next_pending += 1;
        pending
    }

    /// Reserve a handle for an entity that will become `Active` once this buffer is played back.
    pub fn create_entity(&mut self) -> PendingEntity {
        let pending = self.reserve_pending();
        self.records.push(Record::CreateEntity {
            pending,
            staged: false,
        });
        pending
    }

    /// Reserve a handle for an entity that will become `Constructing` once this buffer is played
    /// back, for a staged-spawn handshake.
    pub fn create_staged_entity(&mut self) -> PendingEntity {
        let pending = self.reserve_pending();
        self.records.push(Record::CreateEntity {
            pending,
            staged: true,
        });
        pending
    }

    pub fn destroy_entity(&mut self, target: impl Into<Target>) {
        self.records.push(Record::DestroyEntity {
            target: target.into(),
        });
    }

    pub fn add_component<T: Component + Clone>(&mut self, target: impl Into<Target>, value: T) {
        self.records.push(Record::WriteComponent {
            target: target.into(),
            write: Box::new(value),
        });
    }

    /// Identical to [`add_component`](Self::add_component); both names are exposed for symmetry
    /// with [`crate::repository::EntityRepository::set_component`].
    pub fn set_component<T: Component + Clone>(&mut self, target: impl Into<Target>, value: T) {
        self.add_component(target, value);
    }

    pub fn remove_component<T: Component + Clone>(&mut self, target: impl Into<Target>) {
        self.records.push(Record::RemoveComponent {
            target: target.into(),
            remove: Box::new(RemoveMarker::<T>::new()),
        });
    }

    pub fn add_managed<T: Component>(&mut self, target: impl Into<Target>, value: T) {
        self.records.push(Record::AddManaged {
            target: target.into(),
            write: Box::new(value),
        });
    }

    pub fn remove_managed<T: Component>(&mut self, target: impl Into<Target>) {
        self.records.push(Record::RemoveManaged {
            target: target.into(),
            remove: Box::new(RemoveMarker::<T>::new()),
        });
    }

    pub fn set_lifecycle(&mut self, target: impl Into<Target>, lifecycle: Lifecycle) {
        self.records.push(Record::SetLifecycle {
            target: target.into(),
            lifecycle,
        });
    }

    /// Record an overwrite of a target's `authority_mask` (§3), for playback via
    /// [`crate::repository::EntityRepository::set_authority`].
    pub fn set_authority(&mut self, target: impl Into<Target>, mask: BitMask256) {
        self.records.push(Record::SetAuthority {
            target: target.into(),
            mask,
        });
    }

    pub fn publish_event<E: Event>(&mut self, event: E) {
        self.records.push(Record::PublishEvent {
            publish: Box::new(event),
        });
    }

    /// Hand the accumulated records to the merge step, leaving this buffer empty and ready for
    /// the next frame.
    pub(crate) fn take_records(&mut self) -> Vec<Record> {
        self.next_pending = 0;
        std::mem::take(&mut self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::super::thread_id::ThreadRegistry;
    use super::*;

    #[derive(Debug, Clone)]
    struct Position {
        x: f32,
    }

    #[test]
    fn recording_operations_does_not_touch_the_world() {
        let registry = ThreadRegistry::new();
        let mut buffer = CommandBuffer::new(registry.id_for_current_thread(), 8);

        let pending = buffer.create_entity();
        buffer.add_component(pending, Position { x: 1.0 });
        buffer.set_lifecycle(pending, Lifecycle::Active);

        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn take_records_empties_the_buffer_and_resets_pending_ids() {
        let registry = ThreadRegistry::new();
        let mut buffer = CommandBuffer::new(registry.id_for_current_thread(), 8);
        buffer.create_entity();

        let taken = buffer.take_records();
        assert_eq!(taken.len(), 1);
        assert!(buffer.is_empty());

        let pending = buffer.create_entity();
        assert_eq!(pending.value(), 0);
    }
}
