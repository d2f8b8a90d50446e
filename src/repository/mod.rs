//! The entity repository (§3/§4.1): the live world, and the shape every replica mirrors.
//!
//! An `EntityRepository` owns one entity index, one column per registered component type, and
//! one event broker. A replica is a second `EntityRepository` sharing the same component
//! [`Registry`](crate::component::Registry) (so ids agree across the pair) but with its own,
//! independently-populated storage — a provider (see [`crate::snapshot`]) builds a replica by
//! calling [`register_component`](EntityRepository::register_component) /
//! [`register_event`](EntityRepository::register_event) against it the same way the live world
//! was built, then keeps it current with [`sync_from`](EntityRepository::sync_from).

pub mod index;

pub use index::EntityIndex;

use std::collections::HashMap;
use std::sync::Arc;

use crate::component::{Component, ComponentId, Registry, RetentionPolicy, StorageKind};
use crate::entity::{Entity, Lifecycle};
use crate::error::{Error, Result};
use crate::event::{AccumulatorRegistry, Broker, Event};
use crate::mask::BitMask256;
use crate::storage::{ChunkedColumn, ErasedColumn, ManagedColumn};

/// The live world or one of its replicas: entities, component storage, and the event bus.
pub struct EntityRepository {
    chunk_capacity: usize,
    event_history_frames: usize,
    registry: Arc<Registry>,
    index: EntityIndex,
    unmanaged: HashMap<ComponentId, Box<dyn ErasedColumn>>,
    managed: HashMap<ComponentId, ManagedColumn>,
    events: Broker,
    accumulators: AccumulatorRegistry,
    tick: u64,
}

impl EntityRepository {
    /// A fresh, empty repository with its own component registry. This is how a process's one
    /// live world is built; replicas are built with [`new_replica`](Self::new_replica) instead
    /// so that ids stay consistent with the world they mirror.
    pub fn new(chunk_capacity: usize) -> Self {
        Self {
            chunk_capacity,
            event_history_frames: 180,
            registry: Arc::new(Registry::new()),
            index: EntityIndex::new(),
            unmanaged: HashMap::new(),
            managed: HashMap::new(),
            events: Broker::new(),
            accumulators: AccumulatorRegistry::new(),
            tick: 0,
        }
    }

    /// Override the default 180-frame accumulator depth. Must be called before the first
    /// `register_event`/`register_event_with_capacity` call to take effect.
    pub fn with_event_history_frames(mut self, frames: usize) -> Self {
        self.event_history_frames = frames;
        self
    }

    /// An empty repository sharing this one's component registry, for use as a snapshot
    /// replica. The caller must re-run every `register_component`/`register_event` call made
    /// against `self` to give the replica matching storage before the first `sync_from`.
    pub fn new_replica(&self) -> Self {
        Self {
            chunk_capacity: self.chunk_capacity,
            event_history_frames: self.event_history_frames,
            registry: Arc::clone(&self.registry),
            index: EntityIndex::new(),
            unmanaged: HashMap::new(),
            managed: HashMap::new(),
            events: Broker::new(),
            accumulators: AccumulatorRegistry::new(),
            tick: self.tick,
        }
    }

    /// The shared component registry, for a provider that needs to replay registration onto a
    /// replica it owns.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Register a component type, giving it backing storage in this repository. Rejected once
    /// any entity has been created (see [`Registry::register`]).
    pub fn register_component<T: Component + Clone>(
        &mut self,
        storage: StorageKind,
        policy: RetentionPolicy,
    ) -> Result<ComponentId> {
        let id = self.registry.register::<T>(storage, policy)?;
        match storage {
            StorageKind::Unmanaged => {
                self.unmanaged
                    .entry(id)
                    .or_insert_with(|| Box::new(ChunkedColumn::<T>::new(self.chunk_capacity)));
            }
            StorageKind::Managed => {
                self.managed.entry(id).or_insert_with(ManagedColumn::new);
            }
        }
        Ok(id)
    }

    /// Register an event type on this repository's bus, with the default per-frame capacity.
    /// Also gives `E` an accumulator ring at this repository's configured history depth, unless
    /// `E::POLICY` is `Transient` (§4.4).
    pub fn register_event<E: Event>(&mut self) -> Result<()> {
        self.events.register::<E>()?;
        self.accumulators.register::<E>(self.event_history_frames)
    }

    /// Register an event type with an explicit per-frame capacity.
    pub fn register_event_with_capacity<E: Event>(&mut self, capacity: usize) -> Result<()> {
        self.events.register_with_capacity::<E>(capacity)?;
        self.accumulators.register::<E>(self.event_history_frames)
    }

    /// Create an entity that is immediately `Active`. Closes component/event registration on
    /// this repository's registry the first time it's called (§4.1).
    pub fn create_entity(&mut self) -> Entity {
        self.registry.lock();
        self.index.create(Lifecycle::Active)
    }

    /// Create an entity in the `Constructing` lifecycle state, for the staged-spawn handshake
    /// driven by [`crate::lifecycle`].
    pub fn create_staged_entity(&mut self) -> Entity {
        self.registry.lock();
        self.index.create(Lifecycle::Constructing)
    }

    /// Create `n` entities that are immediately `Active`, amortizing the registry lock over the
    /// whole batch rather than re-checking it per entity.
    pub fn create_entities(&mut self, n: usize) -> Vec<Entity> {
        self.registry.lock();
        (0..n).map(|_| self.index.create(Lifecycle::Active)).collect()
    }

    /// Batch form of [`create_staged_entity`](Self::create_staged_entity).
    pub fn create_staged_entities(&mut self, n: usize) -> Vec<Entity> {
        self.registry.lock();
        (0..n).map(|_| self.index.create(Lifecycle::Constructing)).collect()
    }

    /// Destroy an entity. Idempotent: returns `false` without side effects if `entity` is
    /// already dead or stale.
    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        self.index.destroy(entity)
    }

    /// Whether `entity` currently refers to a live slot at its own generation.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.index.check_live(entity).is_some()
    }

    /// Read an entity's lifecycle state, if it is live.
    pub fn lifecycle(&self, entity: Entity) -> Option<Lifecycle> {
        let idx = self.index.check_live(entity)?;
        self.index.header(idx).map(|header| header.lifecycle)
    }

    /// Move a live entity to a new lifecycle state. Used by the lifecycle coordinator to move a
    /// staged entity `Constructing -> Active` or `Active -> TearDown -> Ghost`.
    pub fn set_lifecycle(&mut self, entity: Entity, lifecycle: Lifecycle) -> Result<()> {
        let idx = self
            .index
            .check_live(entity)
            .ok_or(Error::StaleHandle { entity })?;
        self.index.header_mut(idx).unwrap().lifecycle = lifecycle;
        Ok(())
    }

    /// Set the opaque caller-defined `type_tag` bits on a live entity's header, for queries that
    /// filter with [`crate::query::TypeTagFilter`].
    pub fn set_type_tag(&mut self, entity: Entity, type_tag: u64) -> Result<()> {
        let idx = self
            .index
            .check_live(entity)
            .ok_or(Error::StaleHandle { entity })?;
        self.index.header_mut(idx).unwrap().type_tag = type_tag;
        Ok(())
    }

    /// Overwrite a live entity's `authority_mask` wholesale: which columns this node owns (§3),
    /// for [`crate::query::QueryBuilder::with_authority`]/`without_authority` to filter on.
    pub fn set_authority(&mut self, entity: Entity, mask: BitMask256) -> Result<()> {
        let idx = self
            .index
            .check_live(entity)
            .ok_or(Error::StaleHandle { entity })?;
        self.index.header_mut(idx).unwrap().authority_mask = mask;
        Ok(())
    }

    /// Grant a live entity authority bit `id`, leaving the rest of its authority mask untouched.
    pub fn grant_authority(&mut self, entity: Entity, id: u16) -> Result<()> {
        let idx = self
            .index
            .check_live(entity)
            .ok_or(Error::StaleHandle { entity })?;
        self.index.header_mut(idx).unwrap().authority_mask.set(id);
        Ok(())
    }

    /// Revoke a live entity's authority bit `id`, leaving the rest of its authority mask
    /// untouched.
    pub fn revoke_authority(&mut self, entity: Entity, id: u16) -> Result<()> {
        let idx = self
            .index
            .check_live(entity)
            .ok_or(Error::StaleHandle { entity })?;
        self.index.header_mut(idx).unwrap().authority_mask.clear(id);
        Ok(())
    }

    /// Start building a query over this repository's entities (§4.3).
    pub fn query(&self) -> crate::query::QueryBuilder<'_> {
        crate::query::QueryBuilder::new(self)
    }

    /// The full header table, ascending by entity index — queries iterate this order.
    pub fn headers(&self) -> &[crate::storage::EntityHeader] {
        self.index.headers()
    }

    fn component_id<T: Component>(&self) -> Result<ComponentId> {
        self.registry.get::<T>().ok_or_else(|| Error::SchemaError {
            message: format!("component {} not registered", std::any::type_name::<T>()),
        })
    }

    /// Whether `entity` currently carries component `T`. Never errors: an unregistered type or
    /// a stale handle both read as absent.
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        let Some(id) = self.registry.get::<T>() else {
            return false;
        };
        let Some(idx) = self.index.check_live(entity) else {
            return false;
        };
        self.index.header(idx).unwrap().component_mask.test(id.value())
    }

    fn unmanaged_column<T: Component + Clone>(&self, id: ComponentId) -> Result<&ChunkedColumn<T>> {
        self.unmanaged
            .get(&id)
            .and_then(|column| column.as_any().downcast_ref::<ChunkedColumn<T>>())
            .ok_or_else(|| Error::SchemaError {
                message: format!(
                    "{} is not registered as an unmanaged column",
                    std::any::type_name::<T>()
                ),
            })
    }

    fn unmanaged_column_mut<T: Component + Clone>(
        &mut self,
        id: ComponentId,
    ) -> Result<&mut ChunkedColumn<T>> {
        self.unmanaged
            .get_mut(&id)
            .and_then(|column| column.as_any_mut().downcast_mut::<ChunkedColumn<T>>())
            .ok_or_else(|| Error::SchemaError {
                message: format!(
                    "{} is not registered as an unmanaged column",
                    std::any::type_name::<T>()
                ),
            })
    }

    /// Write `value` into `entity`'s `T` slot, creating the association if absent.
    pub fn add_component<T: Component + Clone>(&mut self, entity: Entity, value: T) -> Result<()> {
        self.set_component(entity, value)
    }

    /// Write `value` into `entity`'s `T` slot. Identical to `add_component`; both names are
    /// exposed because `set_component` reads more naturally at an already-present call site.
    pub fn set_component<T: Component + Clone>(&mut self, entity: Entity, value: T) -> Result<()> {
        let id = self.component_id::<T>()?;
        let idx = self
            .index
            .check_live(entity)
            .ok_or(Error::StaleHandle { entity })?;
        self.unmanaged_column_mut::<T>(id)?.write(idx, value);
        self.index.header_mut(idx).unwrap().component_mask.set(id.value());
        Ok(())
    }

    /// Remove `entity`'s `T` value, if present. A no-op (not an error) if the entity never had
    /// one.
    pub fn remove_component<T: Component + Clone>(&mut self, entity: Entity) -> Result<()> {
        let id = self.component_id::<T>()?;
        let idx = self
            .index
            .check_live(entity)
            .ok_or(Error::StaleHandle { entity })?;
        self.unmanaged_column_mut::<T>(id)?.clear(idx);
        self.index.header_mut(idx).unwrap().component_mask.clear(id.value());
        Ok(())
    }

    /// Read `entity`'s `T` value.
    ///
    /// # Errors
    /// [`Error::StaleHandle`] if the handle is stale; [`Error::SchemaError`] if `T` isn't
    /// registered as unmanaged or `entity` doesn't currently carry one.
    pub fn get_component_ro<T: Component + Clone>(&self, entity: Entity) -> Result<&T> {
        let id = self.component_id::<T>()?;
        let idx = self
            .index
            .check_live(entity)
            .ok_or(Error::StaleHandle { entity })?;
        if !self.index.header(idx).unwrap().component_mask.test(id.value()) {
            return Err(Error::SchemaError {
                message: format!(
                    "entity does not carry component {}",
                    std::any::type_name::<T>()
                ),
            });
        }
        Ok(self.unmanaged_column::<T>(id)?.read(idx))
    }

    /// Mutably read `entity`'s `T` value. Same errors as [`get_component_ro`](Self::get_component_ro).
    pub fn get_component_rw<T: Component + Clone>(&mut self, entity: Entity) -> Result<&mut T> {
        let id = self.component_id::<T>()?;
        let idx = self
            .index
            .check_live(entity)
            .ok_or(Error::StaleHandle { entity })?;
        if !self.index.header(idx).unwrap().component_mask.test(id.value()) {
            return Err(Error::SchemaError {
                message: format!(
                    "entity does not carry component {}",
                    std::any::type_name::<T>()
                ),
            });
        }
        Ok(self.unmanaged_column_mut::<T>(id)?.read_mut(idx))
    }

    /// The whole chunked column backing `T`, for a query that wants to walk it chunk-by-chunk
    /// directly rather than one slot at a time. Callers must still gate individual slots by
    /// `component_mask`.
    pub fn get_component_table<T: Component + Clone>(&self) -> Result<&ChunkedColumn<T>> {
        let id = self.component_id::<T>()?;
        self.unmanaged_column::<T>(id)
    }

    fn managed_column(&self, id: ComponentId) -> Result<&ManagedColumn> {
        self.managed.get(&id).ok_or_else(|| Error::SchemaError {
            message: "component is not registered as a managed column".to_string(),
        })
    }

    fn managed_column_mut(&mut self, id: ComponentId) -> Result<&mut ManagedColumn> {
        self.managed.get_mut(&id).ok_or_else(|| Error::SchemaError {
            message: "component is not registered as a managed column".to_string(),
        })
    }

    /// Attach a managed (reference-typed) component value to `entity`.
    pub fn add_managed<T: Component>(&mut self, entity: Entity, value: T) -> Result<()> {
        let id = self.component_id::<T>()?;
        let idx = self
            .index
            .check_live(entity)
            .ok_or(Error::StaleHandle { entity })?;
        self.managed_column_mut(id)?.set(idx, Arc::new(value));
        self.index.header_mut(idx).unwrap().component_mask.set(id.value());
        Ok(())
    }

    /// Detach `entity`'s managed `T` value, if present.
    pub fn remove_managed<T: Component>(&mut self, entity: Entity) -> Result<()> {
        let id = self.component_id::<T>()?;
        let idx = self
            .index
            .check_live(entity)
            .ok_or(Error::StaleHandle { entity })?;
        self.managed_column_mut(id)?.remove(idx);
        self.index.header_mut(idx).unwrap().component_mask.clear(id.value());
        Ok(())
    }

    /// Read `entity`'s managed `T` value.
    pub fn get_managed_ro<T: Component>(&self, entity: Entity) -> Result<&T> {
        let id = self.component_id::<T>()?;
        let idx = self
            .index
            .check_live(entity)
            .ok_or(Error::StaleHandle { entity })?;
        self.managed_column(id)?
            .get_as::<T>(idx)
            .ok_or_else(|| Error::SchemaError {
                message: format!(
                    "entity does not carry managed component {}",
                    std::any::type_name::<T>()
                ),
            })
    }

    /// Publish an event to this repository's bus. The event becomes readable after the next
    /// [`tick`](Self::tick).
    pub fn publish_event<E: Event>(&mut self, event: E) -> Result<()> {
        self.events
            .stream_mut::<E>()
            .ok_or_else(|| Error::SchemaError {
                message: format!("event {} not registered", std::any::type_name::<E>()),
            })?
            .send(event);
        Ok(())
    }

    /// Every `E` event readable this frame, in send order. Empty (not an error) if `E` isn't
    /// registered.
    pub fn consume_events<E: Event>(&self) -> &[E] {
        self.events
            .stream::<E>()
            .map(|stream| stream.as_slice())
            .unwrap_or(&[])
    }

    /// The shared event broker, for providers and the accumulator registry that need to drive
    /// every registered stream generically.
    pub fn events(&self) -> &Broker {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut Broker {
        &mut self.events
    }

    /// The event-history accumulator registry, for a provider's `refresh` to flush retained
    /// frames into its own replica's broker.
    pub fn accumulators(&self) -> &AccumulatorRegistry {
        &self.accumulators
    }

    /// Capture every persistent event type's current stable buffer into its accumulator, tagged
    /// with the current (pre-swap) tick. Called once per frame at the host's sync point, before
    /// `events_mut().swap_all()`.
    pub fn capture_accumulators(&mut self) {
        self.accumulators.capture_all(&self.events, self.tick);
    }

    /// Advance the tick counter without touching event buffers. The host kernel calls this at
    /// the end of a frame, after [`events_mut`](Self::events_mut)`().swap_all()` already ran at
    /// the sync point; [`tick`](Self::tick) does both at once for simpler standalone use.
    pub fn advance_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// The current tick counter. A read-only accessor for modules; only [`tick`](Self::tick)
    /// itself advances it.
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Swap every event stream's buffers and advance the tick counter. Called once per frame by
    /// the host kernel's sync point (§4.8), never by a module.
    pub fn tick(&mut self) -> u64 {
        self.events.swap_all();
        self.tick += 1;
        self.tick
    }

    /// Overwrite this repository's entities, components, and (persistent) managed values from
    /// `source`, restricted to `mask` if given or every registered component id otherwise (§3).
    /// Unmanaged columns copy only chunks strictly newer at the source; managed columns are
    /// reference-copied wholesale for every id in scope.
    pub fn sync_from(&mut self, source: &EntityRepository, mask: Option<BitMask256>) {
        let mask = mask.unwrap_or_else(|| self.registry.all_ids());
        self.index.sync_from(&source.index);
        for (id, column) in self.unmanaged.iter_mut() {
            if !mask.test(id.value()) {
                continue;
            }
            if let Some(source_column) = source.unmanaged.get(id) {
                column.sync_all_chunks_from(source_column.as_ref());
            }
        }
        for (id, column) in self.managed.iter_mut() {
            if !mask.test(id.value()) {
                continue;
            }
            if let Some(source_column) = source.managed.get(id) {
                column.sync_from(source_column);
            }
        }
    }

    /// Zero out every live entity and every event stream's buffers, without deallocating chunk
    /// or column capacity. Used to recycle a pooled replica between loans.
    pub fn soft_clear(&mut self) {
        self.index.soft_clear();
        self.events.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Name(String);

    #[derive(Debug, Clone, PartialEq)]
    struct Tick {
        value: u32,
    }
    impl Event for Tick {
        const ID: crate::event::EventId = crate::event::EventId::new(1);
    }

    #[test]
    fn register_component_then_add_and_read_round_trips() {
        let mut repo = EntityRepository::new(4);
        repo.register_component::<Position>(StorageKind::Unmanaged, RetentionPolicy::Persistent)
            .unwrap();

        let entity = repo.create_entity();
        repo.add_component(entity, Position { x: 1.0, y: 2.0 }).unwrap();

        assert!(repo.has_component::<Position>(entity));
        assert_eq!(*repo.get_component_ro::<Position>(entity).unwrap(), Position { x: 1.0, y: 2.0 });
    }

    #[test]
    fn remove_component_clears_mask_and_presence() {
        let mut repo = EntityRepository::new(4);
        repo.register_component::<Position>(StorageKind::Unmanaged, RetentionPolicy::Persistent)
            .unwrap();
        let entity = repo.create_entity();
        repo.add_component(entity, Position { x: 0.0, y: 0.0 }).unwrap();

        repo.remove_component::<Position>(entity).unwrap();

        assert!(!repo.has_component::<Position>(entity));
        assert!(repo.get_component_ro::<Position>(entity).is_err());
    }

    #[test]
    fn stale_handle_is_rejected_on_read_and_write() {
        let mut repo = EntityRepository::new(4);
        repo.register_component::<Position>(StorageKind::Unmanaged, RetentionPolicy::Persistent)
            .unwrap();
        let entity = repo.create_entity();
        repo.destroy_entity(entity);

        let result = repo.add_component(entity, Position { x: 0.0, y: 0.0 });
        assert!(matches!(result, Err(Error::StaleHandle { .. })));

        assert!(!repo.has_component::<Position>(entity));
    }

    #[test]
    fn unregistered_component_is_a_schema_error() {
        let mut repo = EntityRepository::new(4);
        let entity = repo.create_entity();

        let result = repo.add_component(entity, Position { x: 0.0, y: 0.0 });
        assert!(matches!(result, Err(Error::SchemaError { .. })));
    }

    #[test]
    fn registering_after_an_entity_exists_is_rejected() {
        let mut repo = EntityRepository::new(4);
        repo.create_entity();

        let result =
            repo.register_component::<Position>(StorageKind::Unmanaged, RetentionPolicy::Persistent);
        assert!(matches!(result, Err(Error::SchemaError { .. })));
    }

    #[test]
    fn managed_component_round_trips_and_shares_instance_across_replicas() {
        let mut repo = EntityRepository::new(4);
        repo.register_component::<Name>(StorageKind::Managed, RetentionPolicy::Persistent)
            .unwrap();
        let entity = repo.create_entity();
        repo.add_managed(entity, Name("alice".to_string())).unwrap();

        assert_eq!(repo.get_managed_ro::<Name>(entity).unwrap(), &Name("alice".to_string()));

        let mut replica = repo.new_replica();
        replica
            .register_component::<Name>(StorageKind::Managed, RetentionPolicy::Persistent)
            .unwrap();
        replica.sync_from(&repo, None);

        assert_eq!(replica.get_managed_ro::<Name>(entity).unwrap(), &Name("alice".to_string()));
    }

    #[test]
    fn sync_from_mirrors_entities_and_component_values() {
        let mut repo = EntityRepository::new(4);
        repo.register_component::<Position>(StorageKind::Unmanaged, RetentionPolicy::Persistent)
            .unwrap();
        let entity = repo.create_entity();
        repo.add_component(entity, Position { x: 3.0, y: 4.0 }).unwrap();

        let mut replica = repo.new_replica();
        replica
            .register_component::<Position>(StorageKind::Unmanaged, RetentionPolicy::Persistent)
            .unwrap();
        replica.sync_from(&repo, None);

        assert!(replica.is_alive(entity));
        assert_eq!(*replica.get_component_ro::<Position>(entity).unwrap(), Position { x: 3.0, y: 4.0 });
    }

    #[test]
    fn sync_from_respects_an_explicit_mask() {
        let mut repo = EntityRepository::new(4);
        let pos_id = repo
            .register_component::<Position>(StorageKind::Unmanaged, RetentionPolicy::Persistent)
            .unwrap();
        repo.register_component::<Name>(StorageKind::Managed, RetentionPolicy::Persistent)
            .unwrap();
        let entity = repo.create_entity();
        repo.add_component(entity, Position { x: 1.0, y: 1.0 }).unwrap();
        repo.add_managed(entity, Name("bob".to_string())).unwrap();

        let mut replica = repo.new_replica();
        replica
            .register_component::<Position>(StorageKind::Unmanaged, RetentionPolicy::Persistent)
            .unwrap();
        replica
            .register_component::<Name>(StorageKind::Managed, RetentionPolicy::Persistent)
            .unwrap();

        let mut mask = BitMask256::EMPTY;
        mask.set(pos_id.value());
        replica.sync_from(&repo, Some(mask));

        assert!(replica.get_component_ro::<Position>(entity).is_ok());
        assert!(replica.get_managed_ro::<Name>(entity).is_err());
    }

    #[test]
    fn publish_then_tick_makes_events_readable() {
        let mut repo = EntityRepository::new(4);
        repo.register_event::<Tick>().unwrap();

        repo.publish_event(Tick { value: 1 }).unwrap();
        assert!(repo.consume_events::<Tick>().is_empty());

        repo.tick();

        assert_eq!(repo.consume_events::<Tick>(), &[Tick { value: 1 }]);
        assert_eq!(repo.current_tick(), 1);
    }

    #[test]
    fn soft_clear_frees_entities_and_drops_event_data_without_losing_registration() {
        let mut repo = EntityRepository::new(4);
        repo.register_event::<Tick>().unwrap();
        repo.publish_event(Tick { value: 1 }).unwrap();
        repo.tick();
        let entity = repo.create_entity();

        repo.soft_clear();

        assert!(!repo.is_alive(entity));
        assert!(repo.consume_events::<Tick>().is_empty());
        assert!(repo.events().is_registered::<Tick>());
    }

    #[test]
    fn capture_accumulators_then_advance_tick_matches_combined_tick() {
        let mut repo = EntityRepository::new(4);
        repo.register_event::<Tick>().unwrap();
        repo.publish_event(Tick { value: 7 }).unwrap();

        repo.capture_accumulators();
        repo.events_mut().swap_all();
        let advanced = repo.advance_tick();

        assert_eq!(advanced, 1);
        assert_eq!(repo.consume_events::<Tick>(), &[Tick { value: 7 }]);
        assert_eq!(repo.accumulators().get::<Tick>().unwrap().len(), 1);
    }

    #[test]
    fn create_entities_returns_distinct_active_entities() {
        let mut repo = EntityRepository::new(4);
        let batch = repo.create_entities(3);

        assert_eq!(batch.len(), 3);
        for entity in &batch {
            assert_eq!(repo.lifecycle(*entity), Some(Lifecycle::Active));
        }
        assert_ne!(batch[0], batch[1]);
    }

    #[test]
    fn set_lifecycle_updates_a_live_entitys_state() {
        let mut repo = EntityRepository::new(4);
        let entity = repo.create_staged_entity();
        assert_eq!(repo.lifecycle(entity), Some(Lifecycle::Constructing));

        repo.set_lifecycle(entity, Lifecycle::Active).unwrap();

        assert_eq!(repo.lifecycle(entity), Some(Lifecycle::Active));
    }

    #[test]
    fn grant_and_revoke_authority_flip_a_single_bit() {
        let mut repo = EntityRepository::new(4);
        let entity = repo.create_entity();

        repo.grant_authority(entity, 3).unwrap();
        assert!(repo.query().with_authority(3).build().any(|e| e == entity));

        repo.revoke_authority(entity, 3).unwrap();
        assert!(!repo.query().with_authority(3).build().any(|e| e == entity));
    }

    #[test]
    fn set_authority_overwrites_the_whole_mask() {
        let mut repo = EntityRepository::new(4);
        let entity = repo.create_entity();
        repo.grant_authority(entity, 1).unwrap();

        let mut mask = BitMask256::EMPTY;
        mask.set(7);
        repo.set_authority(entity, mask).unwrap();

        assert!(!repo.query().with_authority(1).build().any(|e| e == entity));
        assert!(repo.query().with_authority(7).build().any(|e| e == entity));
    }

    #[test]
    fn authority_mutators_reject_a_stale_handle() {
        let mut repo = EntityRepository::new(4);
        let entity = repo.create_entity();
        repo.destroy_entity(entity);

        assert!(matches!(
            repo.grant_authority(entity, 0),
            Err(Error::StaleHandle { .. })
        ));
    }
}
