//! The event history ring (§4.4): retains the last `H` frames of a *Persistent* event type so a
//! module running less often than its producer still observes every intervening event, in
//! per-producer order, the next time it runs.
//!
//! Type-erased the same way as `ErasedStream` in [`crate::event::stream`], so a [`Registry`] can
//! hold one accumulator per event type without the repository needing to name every type when it
//! drives the per-tick capture.

use std::any::{Any, TypeId};
use std::collections::{HashMap, VecDeque};

use crate::component::RetentionPolicy;
use crate::error::{Error, Result};
use crate::event::stream::ErasedStream;
use crate::event::{Broker, Event, EventId, Stream};

/// One frame's worth of captured events, tagged with the tick that produced them.
struct Frame<E> {
    tick: u64,
    events: Vec<E>,
}

/// A fixed-depth ring of captured frames for one event type.
pub struct Accumulator<E: Event> {
    depth: usize,
    frames: VecDeque<Frame<E>>,
}

impl<E: Event> Accumulator<E> {
    /// A new, empty accumulator retaining at most `depth` frames.
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            frames: VecDeque::with_capacity(depth),
        }
    }

    /// Copy `stream`'s stable (post-swap) buffer into a new ring entry tagged `tick`, evicting
    /// the oldest entry if the ring is full. Called once per tick, after `stream.swap()`.
    pub fn capture(&mut self, stream: &Stream<E>, tick: u64) {
        if self.frames.len() >= self.depth {
            self.frames.pop_front();
        }
        self.frames.push_back(Frame {
            tick,
            events: stream.iter().cloned().collect(),
        });
    }

    /// Append every frame strictly after `since_tick`, in tick order, to `replica`'s write
    /// buffer, then swap `replica` so consumers see them via `iter()`.
    pub fn flush_to_replica(&self, replica: &mut Stream<E>, since_tick: u64) {
        for frame in self.frames.iter().filter(|frame| frame.tick > since_tick) {
            for event in &frame.events {
                replica.send(event.clone());
            }
        }
        replica.swap();
    }

    /// How many frames are currently retained.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

trait ErasedAccumulator: Send + Sync {
    fn capture_erased(&mut self, stream: &dyn ErasedStream, tick: u64);
    fn flush_erased(&self, replica_stream: &mut dyn ErasedStream, since_tick: u64);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<E: Event> ErasedAccumulator for Accumulator<E> {
    fn capture_erased(&mut self, stream: &dyn ErasedStream, tick: u64) {
        if let Some(stream) = stream.as_any().downcast_ref::<Stream<E>>() {
            self.capture(stream, tick);
        }
    }

    fn flush_erased(&self, replica_stream: &mut dyn ErasedStream, since_tick: u64) {
        if let Some(stream) = replica_stream.as_any_mut().downcast_mut::<Stream<E>>() {
            self.flush_to_replica(stream, since_tick);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct Entry {
    type_id: TypeId,
    accumulator: Box<dyn ErasedAccumulator>,
}

/// Owns one [`Accumulator`] per registered *Persistent* event type, and drives the per-tick
/// capture across all of them without the caller naming every type.
///
/// Registering a *Transient* event type is accepted but creates no backing accumulator — per
/// the §4.3 retention policy, transient event history is never retained, so there is nothing to
/// capture.
#[derive(Default)]
pub struct Registry {
    entries: HashMap<EventId, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register history retention for `E` at `depth` frames. A no-op for `Transient` event
    /// types. Re-registering the same type is idempotent; registering a different type under an
    /// already-claimed id is a [`Error::SchemaError`].
    pub fn register<E: Event>(&mut self, depth: usize) -> Result<()> {
        if E::POLICY == RetentionPolicy::Transient {
            log::debug!(
                "skipping accumulator for transient event {}",
                std::any::type_name::<E>()
            );
            return Ok(());
        }

        let type_id = TypeId::of::<E>();
        if let Some(existing) = self.entries.get(&E::ID) {
            if existing.type_id != type_id {
                return Err(Error::SchemaError {
                    message: format!(
                        "event id {:?} already claimed by a different type in the accumulator registry",
                        E::ID
                    ),
                });
            }
            return Ok(());
        }

        self.entries.insert(
            E::ID,
            Entry {
                type_id,
                accumulator: Box::new(Accumulator::<E>::new(depth)),
            },
        );
        Ok(())
    }

    /// Capture every persistent event type's current stable buffer from `broker`, tagged
    /// `tick`. Called once per tick, after `broker.swap_all()` (§4.8 sync point).
    pub fn capture_all(&mut self, broker: &Broker, tick: u64) {
        for (id, policy, stream) in broker.erased_streams() {
            if policy == RetentionPolicy::Transient {
                continue;
            }
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.accumulator.capture_erased(stream, tick);
            }
        }
    }

    /// Flush every registered accumulator's history strictly after `since_tick` into the
    /// matching stream of `replica`, by [`EventId`] rather than by concrete type — used by the
    /// pooled snapshot provider, which holds a replica whose event types it cannot name at
    /// compile time.
    pub fn flush_all_to_replica(&self, replica: &mut Broker, since_tick: u64) {
        for (id, stream) in replica.erased_streams_mut() {
            if let Some(entry) = self.entries.get(&id) {
                entry.accumulator.flush_erased(stream, since_tick);
            }
        }
    }

    /// Access the accumulator for `E`, if one was registered (and `E` is `Persistent`).
    pub fn get<E: Event>(&self) -> Option<&Accumulator<E>> {
        let entry = self.entries.get(&E::ID)?;
        entry.accumulator.as_any().downcast_ref::<Accumulator<E>>()
    }

    /// Mutably access the accumulator for `E`, if one was registered.
    pub fn get_mut<E: Event>(&mut self) -> Option<&mut Accumulator<E>> {
        let entry = self.entries.get_mut(&E::ID)?;
        entry
            .accumulator
            .as_any_mut()
            .downcast_mut::<Accumulator<E>>()
    }
}
