//! Deterministic, assignment-order thread ids for command buffer merge ordering (§4.5/§9: "the
//! exact thread-id ordering the merge uses... so a test can assert on *which* command wins
//! without depending on OS thread scheduling").
//!
//! `std::thread::ThreadId` has no stable total order or numeric projection, so we assign our own
//! sequential id the first time each OS thread is seen, the same `DashMap` + atomic-counter
//! pattern as [`crate::component::Registry`].

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// A stable, `Ord`-able id assigned to an OS thread in first-seen order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u64);

impl ThreadId {
    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }

    /// Build an explicit id from a raw sequence number, bypassing OS thread detection. Used by
    /// the host kernel, which dispatches modules sequentially on one thread and so assigns each
    /// module's logical id by registration order rather than by `std::thread::current()`; also
    /// useful for a test asserting on merge order.
    pub fn sequential(raw: u64) -> Self {
        Self(raw)
    }
}

/// Assigns [`ThreadId`]s to OS threads on first use.
pub struct ThreadRegistry {
    assigned: DashMap<std::thread::ThreadId, u64>,
    next: AtomicU64,
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self {
            assigned: DashMap::new(),
            next: AtomicU64::new(0),
        }
    }

    /// The id for the calling thread, assigning one the first time this thread is seen.
    pub fn id_for_current_thread(&self) -> ThreadId {
        let std_id = std::thread::current().id();
        let raw = *self
            .assigned
            .entry(std_id)
            .or_insert_with(|| self.next.fetch_add(1, Ordering::Relaxed));
        ThreadId(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_thread_always_gets_the_same_id() {
        let registry = ThreadRegistry::new();
        let a = registry.id_for_current_thread();
        let b = registry.id_for_current_thread();
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_threads_get_distinct_ordered_ids() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(ThreadRegistry::new());
        let main_id = registry.id_for_current_thread();

        let worker_id = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.id_for_current_thread())
                .join()
                .unwrap()
        };

        assert_ne!(main_id, worker_id);
    }
}
