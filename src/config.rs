//! Module host configuration (§6).
//!
//! `HostConfig` is a plain struct with a fluent builder over explicit-argument constructors
//! (`Stream::new(capacity)` and friends): there is no file or environment parsing in scope. The
//! host is embedded; its configuration arrives as a struct literal (or builder chain) from the
//! hosting application.

/// How the simulation clock is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRole {
    /// The host owns a wall-clock and computes `dt` itself each frame.
    Standalone,
    /// An external driver supplies `dt` for each frame (e.g. a fixed-step test harness or a
    /// replay system).
    Driven,
}

/// Recognised module host configuration options (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Slots per chunk per component column. Must be a power of two.
    pub chunk_capacity: usize,
    /// Accumulator depth per event type, in frames.
    pub event_history_frames: usize,
    /// Per-thread command buffer reserve, in records.
    pub command_buffer_initial_records: usize,
    /// Pre-allocated replicas per pooled snapshot provider.
    pub snapshot_pool_warmup: usize,
    /// Construction/destruction handshake deadline, in frames.
    pub lifecycle_timeout_frames: u32,
    /// Whether the host drives its own clock or is driven externally.
    pub time_role: TimeRole,
    /// Sizing hint for the module dispatch worker pool.
    pub max_concurrent_modules: usize,
    /// Per-module tick deadline (§5). A module whose `tick` call runs longer than this is logged
    /// at `warn` once it returns; see [`crate::host`]'s module doc for why a module that never
    /// returns at all cannot be preempted here.
    pub module_tick_deadline: std::time::Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: 4096,
            event_history_frames: 180,
            command_buffer_initial_records: 256,
            snapshot_pool_warmup: 2,
            lifecycle_timeout_frames: 300,
            time_role: TimeRole::Standalone,
            max_concurrent_modules: 4,
            module_tick_deadline: std::time::Duration::from_millis(50),
        }
    }
}

impl HostConfig {
    /// Start from the documented defaults.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the chunk capacity. Must be a power of two.
    ///
    /// # Panics
    /// Panics if `capacity` is zero or not a power of two.
    pub fn with_chunk_capacity(mut self, capacity: usize) -> Self {
        assert!(
            capacity != 0 && capacity.is_power_of_two(),
            "chunk_capacity must be a non-zero power of two, got {capacity}"
        );
        self.chunk_capacity = capacity;
        self
    }

    /// Set the event history depth, in frames.
    pub fn with_event_history_frames(mut self, frames: usize) -> Self {
        self.event_history_frames = frames;
        self
    }

    /// Set the per-thread command buffer initial reserve.
    pub fn with_command_buffer_initial_records(mut self, records: usize) -> Self {
        self.command_buffer_initial_records = records;
        self
    }

    /// Set the pooled snapshot provider warmup count.
    pub fn with_snapshot_pool_warmup(mut self, count: usize) -> Self {
        self.snapshot_pool_warmup = count;
        self
    }

    /// Set the lifecycle handshake timeout, in frames.
    pub fn with_lifecycle_timeout_frames(mut self, frames: u32) -> Self {
        self.lifecycle_timeout_frames = frames;
        self
    }

    /// Set the time role.
    pub fn with_time_role(mut self, role: TimeRole) -> Self {
        self.time_role = role;
        self
    }

    /// Set the worker-pool sizing hint for module dispatch.
    pub fn with_max_concurrent_modules(mut self, count: usize) -> Self {
        self.max_concurrent_modules = count;
        self
    }

    /// Set the per-module tick deadline.
    pub fn with_module_tick_deadline(mut self, deadline: std::time::Duration) -> Self {
        self.module_tick_deadline = deadline;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = HostConfig::default();

        assert_eq!(config.chunk_capacity, 4096);
        assert_eq!(config.event_history_frames, 180);
        assert_eq!(config.snapshot_pool_warmup, 2);
        assert_eq!(config.lifecycle_timeout_frames, 300);
        assert_eq!(config.time_role, TimeRole::Standalone);
        assert_eq!(config.module_tick_deadline, std::time::Duration::from_millis(50));
    }

    #[test]
    fn builder_overrides_apply() {
        let config = HostConfig::new()
            .with_chunk_capacity(1024)
            .with_event_history_frames(60)
            .with_lifecycle_timeout_frames(120)
            .with_time_role(TimeRole::Driven)
            .with_max_concurrent_modules(8);

        assert_eq!(config.chunk_capacity, 1024);
        assert_eq!(config.event_history_frames, 60);
        assert_eq!(config.lifecycle_timeout_frames, 120);
        assert_eq!(config.time_role, TimeRole::Driven);
        assert_eq!(config.max_concurrent_modules, 8);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn non_power_of_two_chunk_capacity_panics() {
        HostConfig::new().with_chunk_capacity(100);
    }
}
