//! Thread-local command buffers and their deterministic merge into the live world (§4.5).
//!
//! Any thread (a parallel-policy module's workers, in particular) records operations into its
//! own [`CommandBuffer`] during a frame without touching the repository. Once every module has
//! run, [`merge_and_play`] merges every buffer in ascending [`ThreadId`] order — assigned in
//! first-seen order, not by anything OS-scheduling-dependent — and plays every record back in
//! a fixed phase order, regardless of which buffer or thread recorded it:
//!
//! 1. `CreateEntity` (so later phases can resolve the entities they reserved)
//! 2. `WriteComponent` / `AddManaged` / `RemoveManaged` / `SetLifecycle`, in recorded order
//! 3. `RemoveComponent`
//! 4. `PublishEvent`
//! 5. `DestroyEntity`
//!
//! A record that targets a stale or never-resolved entity is dropped and counted, never
//! fatal — see [`PlaybackStats::stale_dropped`].

pub mod buffer;
pub mod record;
pub mod thread_id;

pub use buffer::CommandBuffer;
pub use record::{PendingEntity, Record, Target};
pub use thread_id::{ThreadId, ThreadRegistry};

use std::collections::HashMap;

use crate::entity::Entity;
use crate::repository::EntityRepository;

/// Counters from one [`merge_and_play`] call, for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub commands_played: u64,
    pub stale_dropped: u64,
}

fn resolve(target: Target, buffer_idx: usize, pending: &[HashMap<u32, Entity>]) -> Option<Entity> {
    match target {
        Target::Existing(entity) => Some(entity),
        Target::Pending(id) => pending[buffer_idx].get(&id.value()).copied(),
    }
}

/// Merge every buffer's records into `world` in the fixed phase order, draining each buffer.
pub fn merge_and_play(buffers: &mut [CommandBuffer], world: &mut EntityRepository) -> PlaybackStats {
    let mut order: Vec<usize> = (0..buffers.len()).collect();
    order.sort_by_key(|&i| buffers[i].thread_id());

    let mut slots: Vec<Vec<Option<Record>>> = buffers
        .iter_mut()
        .map(|buffer| buffer.take_records().into_iter().map(Some).collect())
        .collect();

    let mut pending: Vec<HashMap<u32, Entity>> = vec![HashMap::new(); slots.len()];
    let mut stats = PlaybackStats::default();

    for &i in &order {
        for slot in slots[i].iter_mut() {
            if !matches!(slot, Some(Record::CreateEntity { .. })) {
                continue;
            }
            if let Some(Record::CreateEntity { pending: id, staged }) = slot.take() {
                let entity = if staged {
                    world.create_staged_entity()
                } else {
                    world.create_entity()
                };
                pending[i].insert(id.value(), entity);
                stats.commands_played += 1;
            }
        }
    }

    for &i in &order {
        for slot in slots[i].iter_mut() {
            let is_phase_two = matches!(
                slot,
                Some(Record::WriteComponent { .. })
                    | Some(Record::AddManaged { .. })
                    | Some(Record::RemoveManaged { .. })
                    | Some(Record::SetLifecycle { .. })
                    | Some(Record::SetAuthority { .. })
            );
            if !is_phase_two {
                continue;
            }
            match slot.take().unwrap() {
                Record::WriteComponent { target, write } => match resolve(target, i, &pending) {
                    Some(entity) if write.apply(world, entity) => stats.commands_played += 1,
                    _ => stats.stale_dropped += 1,
                },
                Record::AddManaged { target, write } => match resolve(target, i, &pending) {
                    Some(entity) if write.apply(world, entity) => stats.commands_played += 1,
                    _ => stats.stale_dropped += 1,
                },
                Record::RemoveManaged { target, remove } => match resolve(target, i, &pending) {
                    Some(entity) if remove.apply(world, entity) => stats.commands_played += 1,
                    _ => stats.stale_dropped += 1,
                },
                Record::SetLifecycle { target, lifecycle } => match resolve(target, i, &pending) {
                    Some(entity) if world.set_lifecycle(entity, lifecycle).is_ok() => {
                        stats.commands_played += 1
                    }
                    _ => stats.stale_dropped += 1,
                },
                Record::SetAuthority { target, mask } => match resolve(target, i, &pending) {
                    Some(entity) if world.set_authority(entity, mask).is_ok() => {
                        stats.commands_played += 1
                    }
                    _ => stats.stale_dropped += 1,
                },
                _ => unreachable!("phase-two filter only matches these variants"),
            }
        }
    }

    for &i in &order {
        for slot in slots[i].iter_mut() {
            if !matches!(slot, Some(Record::RemoveComponent { .. })) {
                continue;
            }
            if let Some(Record::RemoveComponent { target, remove }) = slot.take() {
                match resolve(target, i, &pending) {
                    Some(entity) if remove.apply(world, entity) => stats.commands_played += 1,
                    _ => stats.stale_dropped += 1,
                }
            }
        }
    }

    for &i in &order {
        for slot in slots[i].iter_mut() {
            if !matches!(slot, Some(Record::PublishEvent { .. })) {
                continue;
            }
            if let Some(Record::PublishEvent { publish }) = slot.take() {
                if publish.apply(world) {
                    stats.commands_played += 1;
                } else {
                    stats.stale_dropped += 1;
                }
            }
        }
    }

    for &i in &order {
        for slot in slots[i].iter_mut() {
            if !matches!(slot, Some(Record::DestroyEntity { .. })) {
                continue;
            }
            if let Some(Record::DestroyEntity { target }) = slot.take() {
                match resolve(target, i, &pending) {
                    Some(entity) if world.destroy_entity(entity) => stats.commands_played += 1,
                    _ => stats.stale_dropped += 1,
                }
            }
        }
    }

    log::trace!(
        "merge_and_play: {} commands played, {} stale records dropped",
        stats.commands_played,
        stats.stale_dropped
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{RetentionPolicy, StorageKind};
    use crate::event::{Event, EventId};

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        x: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Spawned {
        count: u32,
    }
    impl Event for Spawned {
        const ID: EventId = EventId::new(1);
    }

    fn world() -> EntityRepository {
        let mut world = EntityRepository::new(4);
        world
            .register_component::<Position>(StorageKind::Unmanaged, RetentionPolicy::Persistent)
            .unwrap();
        world.register_event::<Spawned>().unwrap();
        world
    }

    #[test]
    fn create_then_write_in_the_same_buffer_resolves_the_pending_handle() {
        let registry = ThreadRegistry::new();
        let mut world = world();
        let mut buffer = CommandBuffer::new(registry.id_for_current_thread(), 8);

        let pending = buffer.create_entity();
        buffer.add_component(pending, Position { x: 2.0 });

        let stats = merge_and_play(&mut [buffer], &mut world);

        assert_eq!(stats.stale_dropped, 0);
        assert_eq!(stats.commands_played, 2);
        let entities: Vec<_> = world.query().build().collect();
        assert_eq!(entities.len(), 1);
        assert_eq!(
            *world.get_component_ro::<Position>(entities[0]).unwrap(),
            Position { x: 2.0 }
        );
    }

    #[test]
    fn destroy_runs_after_every_other_phase() {
        let registry = ThreadRegistry::new();
        let mut world = world();
        let existing = world.create_entity();
        let mut buffer = CommandBuffer::new(registry.id_for_current_thread(), 8);

        buffer.add_component(existing, Position { x: 1.0 });
        buffer.destroy_entity(existing);

        let stats = merge_and_play(&mut [buffer], &mut world);

        assert_eq!(stats.stale_dropped, 0);
        assert!(!world.is_alive(existing));
    }

    #[test]
    fn stale_handle_operations_are_dropped_and_counted_not_fatal() {
        let registry = ThreadRegistry::new();
        let mut world = world();
        let gone = world.create_entity();
        world.destroy_entity(gone);
        let mut buffer = CommandBuffer::new(registry.id_for_current_thread(), 8);

        buffer.add_component(gone, Position { x: 1.0 });

        let stats = merge_and_play(&mut [buffer], &mut world);

        assert_eq!(stats.stale_dropped, 1);
        assert_eq!(stats.commands_played, 0);
    }

    #[test]
    fn buffers_merge_in_ascending_thread_id_order() {
        let registry = ThreadRegistry::new();
        let mut world = world();
        let entity = world.create_entity();

        let mut first = CommandBuffer::new(ThreadId::sequential(0), 4);
        let mut second = CommandBuffer::new(ThreadId::sequential(1), 4);
        first.add_component(entity, Position { x: 10.0 });
        second.add_component(entity, Position { x: 20.0 });

        merge_and_play(&mut [second, first], &mut world);

        assert_eq!(*world.get_component_ro::<Position>(entity).unwrap(), Position { x: 20.0 });
    }

    #[test]
    fn set_authority_is_played_back_in_phase_two() {
        let registry = ThreadRegistry::new();
        let mut world = world();
        let entity = world.create_entity();
        let mut buffer = CommandBuffer::new(registry.id_for_current_thread(), 4);

        let mut mask = crate::mask::BitMask256::EMPTY;
        mask.set(5);
        buffer.set_authority(entity, mask);

        let stats = merge_and_play(&mut [buffer], &mut world);

        assert_eq!(stats.stale_dropped, 0);
        assert_eq!(stats.commands_played, 1);
        assert!(world.query().with_authority(5).build().any(|e| e == entity));
    }

    #[test]
    fn publish_event_becomes_readable_after_tick() {
        let registry = ThreadRegistry::new();
        let mut world = world();
        let mut buffer = CommandBuffer::new(registry.id_for_current_thread(), 4);

        buffer.publish_event(Spawned { count: 1 });
        merge_and_play(&mut [buffer], &mut world);
        world.tick();

        assert_eq!(world.consume_events::<Spawned>(), &[Spawned { count: 1 }]);
    }
}
