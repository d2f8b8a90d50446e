//! Crate-wide error taxonomy.
//!
//! Every fallible, caller-visible operation in the host returns [`Error`]. Conditions meant to be
//! silent/counted (stale command playback) deliberately do not surface here — they are logged and
//! tallied internally, never returned to a caller. See each variant's
//! doc comment for where it is raised and whether it is fatal to the calling operation only, or
//! to the whole host.

use thiserror::Error;

use crate::entity::Entity;

/// The crate-wide error type.
///
/// Every kind is one a caller can actually trigger; there is no catch-all variant, so matching
/// on `Error` statically tells a caller when a new kind is added. There is deliberately no
/// capacity-exceeded variant: every growable structure in this crate (the entity allocator, a
/// column's chunk vector, a command buffer's record vector) is unbounded and grows geometrically
/// rather than being constructed against a fixed ceiling, so there is nothing for such a variant
/// to ever report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A component or event type was used without being registered first, or was registered
    /// twice with a conflicting storage kind or policy, or an event id collided with one
    /// already in use. Raised at registration or first use; fatal to initialisation, never
    /// encountered once the host is running normally.
    #[error("schema error: {message}")]
    SchemaError {
        /// Human-readable detail (component/event type name, conflicting ids, etc).
        message: String,
    },

    /// An operation targeted an [`Entity`] whose generation no longer matches the live slot.
    /// Reads/queries treat this as "absent"; this variant is returned only from APIs
    /// documented to be fallible on a stale handle (direct repository reads/writes outside a
    /// command buffer).
    #[error("stale handle: {entity:?}")]
    StaleHandle {
        /// The handle that no longer refers to a live entity.
        entity: Entity,
    },

    /// A staged entity's construction or destruction handshake exceeded its deadline. Never
    /// fatal to the host: the entity is forcibly destroyed and a `ConstructionFailed` /
    /// `DestructionFailed` event is published. This variant exists for the
    /// [`crate::lifecycle`] coordinator to log the condition before doing so.
    #[error("lifecycle timeout for {entity:?} after {frames} frames")]
    LifecycleTimeout {
        /// The entity whose handshake timed out.
        entity: Entity,
        /// How many frames elapsed since the handshake began.
        frames: u32,
    },

    /// A programmer error: mutating the live world from a module thread, acquiring a provider
    /// view without releasing the caller's previous one, or registering a system/module after
    /// the scheduler has been initialised. Always fatal to the operation; the host logs at
    /// `error` before returning this.
    #[error("concurrency violation: {message}")]
    ConcurrencyViolation {
        /// What invariant was violated.
        message: String,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
