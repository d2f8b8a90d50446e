//! Central registry and manager for all event streams, keyed by each event type's stable
//! [`EventId`] rather than by `TypeId` — a collision between two *different* event types
//! registered under the same id is a startup-time [`Error::SchemaError`].

use std::{any::TypeId, collections::HashMap};

use crate::component::RetentionPolicy;
use crate::error::{Error, Result};
use crate::event::stream::ErasedStream;
use crate::event::{Event, EventId, Stream};

struct Entry {
    type_id: TypeId,
    policy: RetentionPolicy,
    stream: Box<dyn ErasedStream>,
}

/// Central registry and manager for all event streams in one repository.
pub struct Broker {
    streams: HashMap<EventId, Entry>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    /// Creates a new, empty event broker.
    pub fn new() -> Self {
        Self {
            streams: HashMap::new(),
        }
    }

    /// Registers an event type with the default capacity of 1024.
    pub fn register<E: Event>(&mut self) -> Result<()> {
        self.register_with_capacity::<E>(1024)
    }

    /// Registers an event type with a custom per-frame capacity.
    ///
    /// Re-registering the same type is a no-op. Registering a *different* type under an
    /// [`EventId`] already claimed by another type is a [`Error::SchemaError`].
    pub fn register_with_capacity<E: Event>(&mut self, capacity: usize) -> Result<()> {
        let type_id = TypeId::of::<E>();

        if let Some(existing) = self.streams.get(&E::ID) {
            if existing.type_id != type_id {
                return Err(Error::SchemaError {
                    message: format!(
                        "event id {:?} already claimed by a different type, rejecting {}",
                        E::ID,
                        std::any::type_name::<E>()
                    ),
                });
            }
            return Ok(());
        }

        log::debug!(
            "registered event {} as {:?} (capacity {capacity}, {:?})",
            std::any::type_name::<E>(),
            E::ID,
            E::POLICY
        );
        self.streams.insert(
            E::ID,
            Entry {
                type_id,
                policy: E::POLICY,
                stream: Box::new(Stream::<E>::new(capacity)),
            },
        );
        Ok(())
    }

    /// Iterate every registered stream in type-erased form, alongside its id and retention
    /// policy. Used by [`crate::event::Accumulator`]'s registry to capture each frame's events
    /// without the caller having to name every event type by hand.
    pub(crate) fn erased_streams(
        &self,
    ) -> impl Iterator<Item = (EventId, RetentionPolicy, &dyn ErasedStream)> {
        self.streams
            .iter()
            .map(|(id, entry)| (*id, entry.policy, entry.stream.as_ref()))
    }

    /// Mutable counterpart of [`erased_streams`](Self::erased_streams), for flushing captured
    /// accumulator history into a replica's streams without the caller naming every event type.
    pub(crate) fn erased_streams_mut(
        &mut self,
    ) -> impl Iterator<Item = (EventId, &mut dyn ErasedStream)> {
        self.streams
            .iter_mut()
            .map(|(id, entry)| (*id, entry.stream.as_mut()))
    }

    /// Returns `true` if the event type is registered.
    #[inline]
    pub fn is_registered<E: Event>(&self) -> bool {
        self.streams
            .get(&E::ID)
            .is_some_and(|entry| entry.type_id == TypeId::of::<E>())
    }

    /// Returns a reference to the event stream for reading, if registered.
    pub fn stream<E: Event>(&self) -> Option<&Stream<E>> {
        let entry = self.streams.get(&E::ID)?;
        entry.stream.as_any().downcast_ref::<Stream<E>>()
    }

    /// Returns a mutable reference to the event stream for writing, if registered.
    pub fn stream_mut<E: Event>(&mut self) -> Option<&mut Stream<E>> {
        let entry = self.streams.get_mut(&E::ID)?;
        entry.stream.as_any_mut().downcast_mut::<Stream<E>>()
    }

    /// Swaps every stream's buffers. Called once per tick by the repository, before producers
    /// are given a fresh write buffer for the new frame.
    pub fn swap_all(&mut self) {
        for entry in self.streams.values_mut() {
            entry.stream.swap();
        }
    }

    /// Empties every stream's buffers without dropping the registration itself. Used by
    /// `soft_clear` when a replica is recycled: the schema survives, only the data is dropped.
    pub fn clear_all(&mut self) {
        for entry in self.streams.values_mut() {
            entry.stream.clear();
        }
    }
}
