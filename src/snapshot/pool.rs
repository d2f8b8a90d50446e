//! Pooled filtered snapshot provider (§4.6.2, "slow"): a thread-safe pool of replicas for
//! modules that run at sub-frame rate and need only a subset of columns.
//!
//! The pool itself is a [`crossbeam::queue::SegQueue`] rather than a lock-free stack: crossbeam
//! has no safe public stack type, and a FIFO pool is behaviourally equivalent for this purpose
//! (replicas are interchangeable once `soft_clear`ed).

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::queue::SegQueue;

use crate::mask::BitMask256;
use crate::repository::EntityRepository;

/// Replays a provider's schema setup against a fresh replica. Boxed so the provider can own one
/// without a generic type parameter leaking into every call site.
type SchemaSetup = Box<dyn Fn(&mut EntityRepository) + Send + Sync>;

/// A thread-safe pool of replicas, each synchronised to a caller-chosen subset of columns on
/// acquisition. Addresses are **not** stable across acquisitions: a chunk freed by one loan may
/// be reassigned to a different entity index by the next.
pub struct PooledProvider {
    mask: BitMask256,
    setup_schema: SchemaSetup,
    pool: SegQueue<Box<EntityRepository>>,
    last_seen_tick: AtomicU64,
}

impl PooledProvider {
    /// Build a pool pre-warmed with `warmup` replicas, each scoped to `mask` and built via
    /// `setup_schema`.
    pub fn new(
        live: &EntityRepository,
        mask: BitMask256,
        warmup: usize,
        setup_schema: impl Fn(&mut EntityRepository) + Send + Sync + 'static,
    ) -> Self {
        let pool = SegQueue::new();
        for _ in 0..warmup {
            let mut replica = live.new_replica();
            setup_schema(&mut replica);
            pool.push(Box::new(replica));
        }
        Self {
            mask,
            setup_schema: Box::new(setup_schema),
            pool,
            last_seen_tick: AtomicU64::new(0),
        }
    }

    /// Pop a replica (or build one on demand if the pool is empty), synchronise it against
    /// `live` restricted to this provider's mask, flush event history since this provider's
    /// last-seen tick, and hand it back.
    pub fn acquire_view(&self, live: &EntityRepository) -> PooledView {
        let mut replica = self.pool.pop().unwrap_or_else(|| {
            let mut replica = live.new_replica();
            (self.setup_schema)(&mut replica);
            Box::new(replica)
        });

        let since_tick = self
            .last_seen_tick
            .swap(live.current_tick(), Ordering::AcqRel);
        replica.sync_from(live, Some(self.mask));
        live.accumulators()
            .flush_all_to_replica(replica.events_mut(), since_tick);

        PooledView {
            replica: Some(replica),
        }
    }

    /// Recycle `view`'s replica: zero its contents and push it back onto the pool.
    pub fn release_view(&self, mut view: PooledView) {
        if let Some(mut replica) = view.replica.take() {
            replica.soft_clear();
            self.pool.push(replica);
        }
    }
}

/// An on-loan replica from a [`PooledProvider`]. Its addresses are only valid until the matching
/// `release_view` call.
pub struct PooledView {
    replica: Option<Box<EntityRepository>>,
}

impl PooledView {
    /// Borrow the loaned replica.
    ///
    /// # Panics
    /// Panics if called after the view has already been released.
    pub fn get(&self) -> &EntityRepository {
        self.replica.as_ref().expect("view already released")
    }
}
