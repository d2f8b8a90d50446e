//! The module contract (§6 "Module contract"): the unit of user code the host kernel drives.

use crate::command::CommandBuffer;
use crate::repository::EntityRepository;
use crate::schedule::Scheduler;

/// A module's declared update rate class. Informational: it does not itself change dispatch
/// behaviour (that's `update_frequency`/`policy`), but a host embedding this kernel can use it
/// to pick which snapshot provider a module should be handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleTier {
    Fast,
    Slow,
}

/// How a module is dispatched relative to other modules in the same frame (§4.8 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPolicy {
    /// Runs on the main thread, in registered order, during the simulation phase.
    Synchronous,
    /// Runs against a read-only view acquired from the module's registered snapshot provider.
    Parallel,
}

/// A stable id the host assigns a module at registration, for the lifecycle coordinator to track
/// which modules must ack a staged entity's construction/destruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(u32);

impl ModuleId {
    pub(crate) fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn value(self) -> u32 {
        self.0
    }
}

/// A unit of user simulation logic hosted by [`crate::host::HostKernel`] (§6).
///
/// `tick` always receives a read-only view: `Synchronous` modules see the live world directly
/// (their structural writes still go through `commands`, merged at step 6 along with everyone
/// else's); `Parallel` modules see whatever their registered provider acquired this frame.
pub trait Module: Send {
    fn name(&self) -> &str;

    fn tier(&self) -> ModuleTier {
        ModuleTier::Fast
    }

    /// Run every `update_frequency`-th frame. Must be at least 1 (every frame).
    fn update_frequency(&self) -> u32 {
        1
    }

    fn policy(&self) -> ExecutionPolicy {
        ExecutionPolicy::Synchronous
    }

    /// Advance this module by one logical tick. `dt` is the accumulated delta since this
    /// module's previous turn, not necessarily one frame's worth.
    fn tick(&mut self, view: &EntityRepository, dt: f32, commands: &mut CommandBuffer);

    /// Register any systems this module owns with the shared scheduler. Called once, before the
    /// scheduler is initialised.
    fn register_systems(&mut self, _scheduler: &mut Scheduler) {}

    /// Called once against the live world before the first frame.
    fn initialise(&mut self, _world: &mut EntityRepository) {}

    /// Called once against the live world when the host kernel is torn down.
    fn cleanup(&mut self, _world: &mut EntityRepository) {}
}

/// A diagnostics snapshot for one registered module (§9 "Ownership of replicas" / Appendix
/// diagnostics).
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleStats {
    pub invocations: u64,
    pub last_tick_micros: u64,
    pub frames_since_last_run: u32,
}
