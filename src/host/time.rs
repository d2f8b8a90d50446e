//! Per-frame timekeeping (§4.8 step 1): each frame is produced from the last, carrying
//! `delta`/`elapsed` forward rather than recomputing them.
//!
//! Alongside the usual wall-clock mode, this also supports `TimeRole::Driven`, where an external
//! harness supplies `delta` explicitly instead of it being read from `Instant::now`.

use std::time::{Duration, Instant};

use crate::config::TimeRole;

#[derive(Debug, Clone, Copy)]
enum Clock {
    Standalone { instant: Instant },
    Driven,
}

/// Tracks elapsed time across frames. Construct one per [`crate::host::HostKernel`]; call
/// [`step`](Self::step) once per frame at the start of step 1.
#[derive(Debug, Clone, Copy)]
pub struct Time {
    clock: Clock,
    pending_delta: Option<Duration>,
    pub delta: Duration,
    pub elapsed: Duration,
}

impl Time {
    pub fn new(role: TimeRole) -> Self {
        let clock = match role {
            TimeRole::Standalone => Clock::Standalone {
                instant: Instant::now(),
            },
            TimeRole::Driven => Clock::Driven,
        };
        Self {
            clock,
            pending_delta: None,
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
        }
    }

    /// Supply this frame's delta for a `Driven` clock. Ignored (and unnecessary) for a
    /// `Standalone` clock, which reads the wall clock in `step` instead.
    pub fn supply_delta(&mut self, delta: Duration) {
        self.pending_delta = Some(delta);
    }

    /// Compute this frame's delta, fold it into `elapsed`, and return it as seconds for
    /// [`crate::host::Module::tick`]'s `dt` parameter.
    ///
    /// # Panics
    /// Panics if the clock is `Driven` and no delta was supplied via
    /// [`supply_delta`](Self::supply_delta) since the previous `step`.
    pub fn step(&mut self) -> f32 {
        let delta = match &mut self.clock {
            Clock::Standalone { instant } => {
                let delta = instant.elapsed();
                *instant = Instant::now();
                delta
            }
            Clock::Driven => self.pending_delta.take().expect(
                "TimeRole::Driven requires a delta supplied via Time::supply_delta before step()",
            ),
        };
        self.delta = delta;
        self.elapsed += delta;
        delta.as_secs_f32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driven_clock_uses_the_supplied_delta() {
        let mut time = Time::new(TimeRole::Driven);
        time.supply_delta(Duration::from_millis(16));

        let dt = time.step();

        assert!((dt - 0.016).abs() < 0.001);
        assert_eq!(time.elapsed, Duration::from_millis(16));
    }

    #[test]
    fn driven_clock_accumulates_elapsed_across_frames() {
        let mut time = Time::new(TimeRole::Driven);
        time.supply_delta(Duration::from_millis(10));
        time.step();
        time.supply_delta(Duration::from_millis(20));
        time.step();

        assert_eq!(time.elapsed, Duration::from_millis(30));
    }

    #[test]
    #[should_panic(expected = "Driven")]
    fn driven_clock_without_a_supplied_delta_panics() {
        let mut time = Time::new(TimeRole::Driven);
        time.step();
    }

    #[test]
    fn standalone_clock_produces_a_non_negative_delta() {
        let mut time = Time::new(TimeRole::Standalone);
        let dt = time.step();
        assert!(dt >= 0.0);
    }
}
