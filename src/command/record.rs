//! The recorded operations a [`super::CommandBuffer`] holds, and the type-erased trait objects
//! that let one `Vec<Record>` carry writes for arbitrary component and event types (§4.5).
//!
//! A small set of POD-ish variants carrying a boxed payload, played back against the world later
//! rather than applied immediately.

use std::marker::PhantomData;

use crate::component::Component;
use crate::entity::{Entity, Lifecycle};
use crate::event::Event;
use crate::mask::BitMask256;
use crate::repository::EntityRepository;

/// A handle to an entity created earlier in the *same* command buffer, not yet a real
/// [`Entity`] until [`super::merge_and_play`] runs its `CreateEntity` phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingEntity(pub(crate) u32);

impl PendingEntity {
    #[inline]
    pub fn value(self) -> u32 {
        self.0
    }
}

/// What a record's operations apply to: an entity that already existed when the command was
/// recorded, or one reserved by an earlier `create_entity`/`create_staged_entity` call in the
/// same buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Existing(Entity),
    Pending(PendingEntity),
}

impl From<Entity> for Target {
    fn from(entity: Entity) -> Self {
        Target::Existing(entity)
    }
}

impl From<PendingEntity> for Target {
    fn from(pending: PendingEntity) -> Self {
        Target::Pending(pending)
    }
}

/// A type-erased write of one unmanaged component value, applied during playback's
/// add/set-component phase.
pub trait ComponentWrite: Send {
    fn apply(self: Box<Self>, world: &mut EntityRepository, entity: Entity) -> bool;
}

impl<T: Component + Clone> ComponentWrite for T {
    fn apply(self: Box<Self>, world: &mut EntityRepository, entity: Entity) -> bool {
        world.set_component(entity, *self).is_ok()
    }
}

/// A type-erased removal of one unmanaged component, applied during playback's
/// remove-component phase.
pub trait ComponentRemove: Send {
    fn apply(self: Box<Self>, world: &mut EntityRepository, entity: Entity) -> bool;
}

/// A type-erased write of one managed component value.
pub trait ManagedWrite: Send {
    fn apply(self: Box<Self>, world: &mut EntityRepository, entity: Entity) -> bool;
}

impl<T: Component> ManagedWrite for T {
    fn apply(self: Box<Self>, world: &mut EntityRepository, entity: Entity) -> bool {
        world.add_managed(entity, *self).is_ok()
    }
}

/// A type-erased removal of one managed component.
pub trait ManagedRemove: Send {
    fn apply(self: Box<Self>, world: &mut EntityRepository, entity: Entity) -> bool;
}

/// A phantom payload naming which component type to remove, since removal needs no value.
pub(crate) struct RemoveMarker<T>(PhantomData<T>);

impl<T> RemoveMarker<T> {
    pub(crate) fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: Component + Clone> ComponentRemove for RemoveMarker<T> {
    fn apply(self: Box<Self>, world: &mut EntityRepository, entity: Entity) -> bool {
        world.remove_component::<T>(entity).is_ok()
    }
}

impl<T: Component> ManagedRemove for RemoveMarker<T> {
    fn apply(self: Box<Self>, world: &mut EntityRepository, entity: Entity) -> bool {
        world.remove_managed::<T>(entity).is_ok()
    }
}

/// A type-erased event publish, applied during playback's publish-event phase.
pub trait EventPublish: Send {
    fn apply(self: Box<Self>, world: &mut EntityRepository) -> bool;
}

impl<E: Event> EventPublish for E {
    fn apply(self: Box<Self>, world: &mut EntityRepository) -> bool {
        world.publish_event(*self).is_ok()
    }
}

/// One recorded operation. Playback order is fixed, not recorded order: see
/// [`super::merge_and_play`].
pub enum Record {
    CreateEntity {
        pending: PendingEntity,
        staged: bool,
    },
    WriteComponent {
        target: Target,
        write: Box<dyn ComponentWrite>,
    },
    RemoveComponent {
        target: Target,
        remove: Box<dyn ComponentRemove>,
    },
    AddManaged {
        target: Target,
        write: Box<dyn ManagedWrite>,
    },
    RemoveManaged {
        target: Target,
        remove: Box<dyn ManagedRemove>,
    },
    SetLifecycle {
        target: Target,
        lifecycle: Lifecycle,
    },
    SetAuthority {
        target: Target,
        mask: BitMask256,
    },
    PublishEvent {
        publish: Box<dyn EventPublish>,
    },
    DestroyEntity {
        target: Target,
    },
}
