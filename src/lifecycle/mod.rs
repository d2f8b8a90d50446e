//! The entity lifecycle coordinator (§4.9): the construction/destruction handshake that keeps a
//! staged entity invisible to default queries until every participating module has acked.
//!
//! Distinct from [`crate::entity::Lifecycle`], which is just the state enum this coordinator
//! drives; this module owns the handshake bookkeeping (who must ack, who has, and the timeout
//! clock) and the events that carry it across module boundaries.

use std::collections::{HashMap, HashSet};

use crate::entity::{Entity, Lifecycle};
use crate::error::Result;
use crate::event::{Event, EventId};
use crate::host::ModuleId;
use crate::repository::EntityRepository;

/// Which handshake a pending entity is going through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    Construction,
    Destruction,
}

/// Published once when a staged entity begins construction; every participating module sets up
/// its per-entity state in response and acks.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructionOrder {
    pub entity: Entity,
}
impl Event for ConstructionOrder {
    const ID: EventId = EventId::new(900_001);
}

/// A participating module's response to a [`ConstructionOrder`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructionAck {
    pub entity: Entity,
    pub module_id: ModuleId,
    pub ok: bool,
}
impl Event for ConstructionAck {
    const ID: EventId = EventId::new(900_002);
}

/// Published once when an entity begins the teardown handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct DestructionOrder {
    pub entity: Entity,
}
impl Event for DestructionOrder {
    const ID: EventId = EventId::new(900_003);
}

/// A participating module's response to a [`DestructionOrder`].
#[derive(Debug, Clone, PartialEq)]
pub struct DestructionAck {
    pub entity: Entity,
    pub module_id: ModuleId,
    pub ok: bool,
}
impl Event for DestructionAck {
    const ID: EventId = EventId::new(900_004);
}

/// Published when a construction or destruction handshake aborts, via an explicit `ok: false`
/// ack or a timeout. One event type covers both call sites; `phase` carries which handshake kind
/// failed so no information is lost by not splitting into separate construction/destruction
/// variants.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleFailed {
    pub entity: Entity,
    pub phase: HandshakePhase,
    pub timed_out: bool,
}
impl Event for LifecycleFailed {
    const ID: EventId = EventId::new(900_005);
}

struct PendingHandshake {
    phase: HandshakePhase,
    participants: HashSet<ModuleId>,
    acked: HashSet<ModuleId>,
    failed: bool,
    started_tick: u64,
}

/// Diagnostics for one [`Coordinator::process`] call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinatorStats {
    pub activated: u32,
    pub destroyed: u32,
    pub timed_out: u32,
    pub failed: u32,
}

/// Drives every staged entity's construction/destruction handshake to completion.
pub struct Coordinator {
    timeout_frames: u32,
    pending: HashMap<Entity, PendingHandshake>,
    ghosts: Vec<Entity>,
}

impl Coordinator {
    pub fn new(timeout_frames: u32) -> Self {
        Self {
            timeout_frames,
            pending: HashMap::new(),
            ghosts: Vec::new(),
        }
    }

    /// Register every event type this coordinator publishes and consumes. Must be called
    /// against the live world before the first entity is created.
    pub fn register_events(world: &mut EntityRepository) -> Result<()> {
        world.register_event::<ConstructionOrder>()?;
        world.register_event::<ConstructionAck>()?;
        world.register_event::<DestructionOrder>()?;
        world.register_event::<DestructionAck>()?;
        world.register_event::<LifecycleFailed>()?;
        Ok(())
    }

    /// Create a staged entity and publish its `ConstructionOrder`. The entity stays
    /// `Constructing` (invisible to a default query) until every id in `participants` has acked.
    pub fn begin_construction(
        &mut self,
        world: &mut EntityRepository,
        participants: HashSet<ModuleId>,
    ) -> Result<Entity> {
        let entity = world.create_staged_entity();
        self.pending.insert(
            entity,
            PendingHandshake {
                phase: HandshakePhase::Construction,
                participants,
                acked: HashSet::new(),
                failed: false,
                started_tick: world.current_tick(),
            },
        );
        world.publish_event(ConstructionOrder { entity })?;
        Ok(entity)
    }

    /// Move a live, active entity into `TearDown` and publish its `DestructionOrder`.
    pub fn begin_destruction(
        &mut self,
        world: &mut EntityRepository,
        entity: Entity,
        participants: HashSet<ModuleId>,
    ) -> Result<()> {
        world.set_lifecycle(entity, Lifecycle::TearDown)?;
        self.pending.insert(
            entity,
            PendingHandshake {
                phase: HandshakePhase::Destruction,
                participants,
                acked: HashSet::new(),
                failed: false,
                started_tick: world.current_tick(),
            },
        );
        world.publish_event(DestructionOrder { entity })
    }

    fn apply_ack(&mut self, entity: Entity, module_id: ModuleId, ok: bool) {
        if let Some(handshake) = self.pending.get_mut(&entity) {
            if ok {
                handshake.acked.insert(module_id);
            } else {
                handshake.failed = true;
            }
        }
    }

    /// The host kernel's lifecycle turn (§4.8 step 7): release last frame's tombstones, fold in
    /// this frame's acks, and transition or abort every handshake that is now resolved.
    pub fn process(&mut self, world: &mut EntityRepository) -> CoordinatorStats {
        for ghost in self.ghosts.drain(..) {
            world.destroy_entity(ghost);
        }

        for ack in world.consume_events::<ConstructionAck>().to_vec() {
            self.apply_ack(ack.entity, ack.module_id, ack.ok);
        }
        for ack in world.consume_events::<DestructionAck>().to_vec() {
            self.apply_ack(ack.entity, ack.module_id, ack.ok);
        }

        let current_tick = world.current_tick();
        let mut resolved = Vec::new();
        for (&entity, handshake) in self.pending.iter() {
            let timed_out =
                current_tick.saturating_sub(handshake.started_tick) >= self.timeout_frames as u64;
            if handshake.failed || timed_out || handshake.acked.is_superset(&handshake.participants)
            {
                resolved.push((entity, handshake.failed, timed_out));
            }
        }

        let mut stats = CoordinatorStats::default();
        for (entity, failed, timed_out) in resolved {
            let handshake = self.pending.remove(&entity).unwrap();
            if failed || timed_out {
                if timed_out {
                    let frames = current_tick.saturating_sub(handshake.started_tick) as u32;
                    log::warn!("{}", crate::error::Error::LifecycleTimeout { entity, frames });
                }
                world.destroy_entity(entity);
                let _ = world.publish_event(LifecycleFailed {
                    entity,
                    phase: handshake.phase,
                    timed_out,
                });
                stats.failed += u32::from(failed);
                stats.timed_out += u32::from(timed_out);
                stats.destroyed += 1;
            } else {
                match handshake.phase {
                    HandshakePhase::Construction => {
                        let _ = world.set_lifecycle(entity, Lifecycle::Active);
                        stats.activated += 1;
                    }
                    HandshakePhase::Destruction => {
                        let _ = world.set_lifecycle(entity, Lifecycle::Ghost);
                        self.ghosts.push(entity);
                    }
                }
            }
        }
        stats
    }
}
