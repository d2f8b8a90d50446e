//! The event bus: typed, double-buffered streams keyed by a stable numeric id, plus the
//! accumulator ring that lets slow-running modules catch up on several frames of history.

pub mod accumulator;
pub mod broker;
pub mod stream;

pub use accumulator::Accumulator;
pub use accumulator::Registry as AccumulatorRegistry;
pub use broker::Broker;
pub use stream::Stream;

use crate::component::RetentionPolicy;

/// An event type's explicit, stable numeric identifier (§5/§6: "Events... are identified by
/// explicit stable numeric ids attached at type declaration").
///
/// Unlike [`crate::component::ComponentId`], this is assigned by the event type's author, not
/// by the registry — it must be stable across builds (e.g. for wire compatibility with an
/// external recorder), so the registry's job is to catch collisions, not to hand out ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Marker trait for event payload types.
///
/// Events must be:
/// - `'static + Send + Sync`: safe to share and store in the broker/accumulator.
/// - `Clone`: the accumulator keeps a copy per frame; replicas receive copies via
///   `flush_to_replica`.
/// - carry a stable [`EventId`] fixed at type declaration, checked for collisions at
///   registration.
pub trait Event: 'static + Send + Sync + Clone + std::fmt::Debug {
    /// The stable numeric id for this event type. Must be unique across every event type
    /// registered with the same broker; a collision is a [`crate::error::Error::SchemaError`].
    const ID: EventId;

    /// Whether this event type's history is retained by the accumulator (`Persistent`, the
    /// default expectation) or discarded every tick (`Transient`). Registration fixes this.
    const POLICY: RetentionPolicy = RetentionPolicy::Persistent;
}
