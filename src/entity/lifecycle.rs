//! The per-entity lifecycle state (§4.9), and the coordinator that drives it.
//!
//! `Lifecycle` lives on the entity header; the coordinator that advances it lives in
//! [`crate::lifecycle`], which owns the handshake bookkeeping. This module just defines the
//! states and their transition table so both the repository and the coordinator agree on them.

use std::fmt;

/// Where an entity sits in the construction/destruction handshake (§4.9).
///
/// `lifecycle = Active` iff every registered construction participant has acked; a default
/// query (`with_lifecycle(Active)`) never returns an entity mid-construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Staged spawn awaiting construction acks from every participating module.
    Constructing,
    /// Fully constructed; visible to default queries.
    Active,
    /// Staged teardown awaiting destruction acks from every participating module.
    TearDown,
    /// Destroyed but the slot is held for one frame so late references resolve cleanly before
    /// the slot returns to the free-list.
    Ghost,
}

impl Lifecycle {
    /// Whether an entity in this state is visible to a default query (§4.9 invariant).
    #[inline]
    pub fn is_active(self) -> bool {
        matches!(self, Lifecycle::Active)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Lifecycle::Constructing => "Constructing",
            Lifecycle::Active => "Active",
            Lifecycle::TearDown => "TearDown",
            Lifecycle::Ghost => "Ghost",
        };
        f.write_str(label)
    }
}
