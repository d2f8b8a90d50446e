//! The module host kernel (§4.8): drives one frame end to end, wiring together the scheduler,
//! the three snapshot provider kinds, command buffer merge, and the lifecycle coordinator in a
//! fixed nine-step order.
//!
//! Module dispatch (§4.8 step 4): `Synchronous` modules run inline, in registration order, on
//! the host's own thread. `Parallel` modules run concurrently, one `crossbeam::thread::scope`
//! worker per due module, each against the read-only view its own registered provider acquires
//! this frame. A module never reaches another module's command buffer or provider, so the
//! worker pool introduces no new sharing beyond the read-only live world every provider already
//! borrows from.
//!
//! A module that panics inside `tick` is caught at the dispatch boundary, logged, and isolated
//! for that frame only (§7); the next due frame re-dispatches it normally. A module that merely
//! runs long is logged once it returns and exceeds `HostConfig::module_tick_deadline`. Neither
//! mechanism can stop a module that never returns at all: Rust gives no safe way to preempt or
//! kill a running thread, and this crate does not reach for `unsafe` to fake one. A module stuck
//! this way blocks its own worker (and, for a `Synchronous` module, the whole frame) until the
//! process itself is restarted — an accepted gap against the "is logged" wording at §5, scoped
//! to the one failure mode safe Rust cannot address without an OS-level watchdog process, which
//! is out of scope for an embedded library.

pub mod module;
pub mod provider;
pub mod time;

pub use module::{ExecutionPolicy, Module, ModuleId, ModuleStats, ModuleTier};
pub use provider::ProviderHandle;
pub use time::Time;

use std::collections::HashMap;

use crate::command::{merge_and_play, CommandBuffer, ThreadId};
use crate::config::HostConfig;
use crate::error::Result;
use crate::lifecycle::{Coordinator, CoordinatorStats};
use crate::repository::EntityRepository;
use crate::schedule::{Phase, Scheduler};

struct ModuleSlot {
    module: Box<dyn Module>,
    id: ModuleId,
    policy: ExecutionPolicy,
    frequency: u32,
    provider: Option<ProviderHandle>,
    commands: CommandBuffer,
    frames_since_last_run: u32,
    accumulated_dt: f32,
    has_run_once: bool,
}

/// Diagnostics for one completed frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameReport {
    pub tick: u64,
    pub commands_played: u64,
    pub stale_commands_dropped: u64,
    pub lifecycle: CoordinatorStats,
}

/// Owns the live world and drives it one frame at a time.
pub struct HostKernel {
    world: EntityRepository,
    config: HostConfig,
    time: Time,
    scheduler: Scheduler,
    scheduler_initialised: bool,
    modules: Vec<ModuleSlot>,
    lifecycle: Coordinator,
    stats: HashMap<String, ModuleStats>,
}

impl HostKernel {
    pub fn new(config: HostConfig) -> Result<Self> {
        let mut world = EntityRepository::new(config.chunk_capacity)
            .with_event_history_frames(config.event_history_frames);
        Coordinator::register_events(&mut world)?;
        let time = Time::new(config.time_role);
        let lifecycle = Coordinator::new(config.lifecycle_timeout_frames);
        Ok(Self {
            world,
            config,
            time,
            scheduler: Scheduler::new(),
            scheduler_initialised: false,
            modules: Vec::new(),
            lifecycle,
            stats: HashMap::new(),
        })
    }

    pub fn world(&self) -> &EntityRepository {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut EntityRepository {
        &mut self.world
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Supply this frame's delta when `HostConfig::time_role` is `Driven`. A no-op otherwise.
    pub fn supply_delta(&mut self, delta: std::time::Duration) {
        self.time.supply_delta(delta);
    }

    /// Start a staged entity's construction handshake (§4.9): create it and require every id in
    /// `participants` to ack before it becomes `Active`. `participants` are the `ModuleId`s
    /// returned from [`register_module`](Self::register_module).
    pub fn begin_construction(
        &mut self,
        participants: std::collections::HashSet<ModuleId>,
    ) -> Result<crate::entity::Entity> {
        self.lifecycle.begin_construction(&mut self.world, participants)
    }

    /// Start a live entity's destruction handshake (§4.9).
    pub fn begin_destruction(
        &mut self,
        entity: crate::entity::Entity,
        participants: std::collections::HashSet<ModuleId>,
    ) -> Result<()> {
        self.lifecycle.begin_destruction(&mut self.world, entity, participants)
    }

    /// Register a module. `provider` is required for `ExecutionPolicy::Parallel` modules and
    /// ignored (should be `None`) for `Synchronous` ones.
    ///
    /// # Errors
    /// [`crate::error::Error::SchemaError`] if a `Parallel` module is registered without a
    /// provider. [`crate::error::Error::ConcurrencyViolation`] if called after
    /// [`run_frame`](Self::run_frame) has already initialised the scheduler.
    pub fn register_module(
        &mut self,
        mut module: Box<dyn Module>,
        provider: Option<ProviderHandle>,
    ) -> Result<ModuleId> {
        if self.scheduler_initialised {
            let message =
                "cannot register a module after the scheduler has been initialised".to_string();
            log::error!("{message}");
            return Err(crate::error::Error::ConcurrencyViolation { message });
        }
        if module.policy() == ExecutionPolicy::Parallel && provider.is_none() {
            return Err(crate::error::Error::SchemaError {
                message: format!(
                    "module '{}' is Parallel but was registered without a snapshot provider",
                    module.name()
                ),
            });
        }
        let frequency = module.update_frequency().max(1);
        let policy = module.policy();
        let id = ModuleId::new(self.modules.len() as u32);

        log::debug!("registered module '{}' as {id:?} ({policy:?})", module.name());
        module.register_systems(&mut self.scheduler);
        module.initialise(&mut self.world);

        self.modules.push(ModuleSlot {
            module,
            id,
            policy,
            frequency,
            provider,
            commands: CommandBuffer::new(
                ThreadId::sequential(id.value() as u64),
                self.config.command_buffer_initial_records,
            ),
            frames_since_last_run: 0,
            accumulated_dt: 0.0,
            has_run_once: false,
        });
        Ok(id)
    }

    fn ensure_scheduler_initialised(&mut self) -> Result<()> {
        if !self.scheduler_initialised {
            self.scheduler.initialise()?;
            self.scheduler_initialised = true;
        }
        Ok(())
    }

    /// Run exactly one frame through the nine steps described at §4.8.
    pub fn run_frame(&mut self) -> Result<FrameReport> {
        self.ensure_scheduler_initialised()?;

        // 1. Time step.
        let dt = self.time.step();

        // 2. Simulation phase: scheduled systems, then synchronous modules inline.
        self.scheduler.run(
            &mut self.world,
            &[Phase::Input, Phase::BeforeSync, Phase::Simulation],
            dt,
        );
        let mut modules_skipped_by_frequency_gate = 0u32;
        for slot in self.modules.iter_mut() {
            if slot.policy != ExecutionPolicy::Synchronous {
                continue;
            }
            let started = std::time::Instant::now();
            let ran = dispatch_if_due(
                slot.module.as_mut(),
                &mut slot.commands,
                &mut slot.frames_since_last_run,
                &mut slot.accumulated_dt,
                &mut slot.has_run_once,
                slot.frequency,
                &self.world,
                dt,
                self.config.module_tick_deadline,
            );
            if ran {
                record_stats(&mut self.stats, slot, started);
            } else {
                modules_skipped_by_frequency_gate += 1;
            }
        }

        // 3. Sync point: capture history, refresh providers, then swap event buffers.
        self.world.capture_accumulators();
        for slot in self.modules.iter_mut() {
            if let Some(provider) = slot.provider.as_mut() {
                provider.refresh_if_mirror(&self.world);
            }
        }
        self.world.events_mut().swap_all();

        // 4/5. Module dispatch + frequency gate, for Parallel modules: one worker per due
        // module, fanned out over a `crossbeam::thread::scope` worker pool and joined before
        // this step returns.
        let world = &self.world;
        let deadline = self.config.module_tick_deadline;
        let due_slots: Vec<&mut ModuleSlot> = self
            .modules
            .iter_mut()
            .filter(|slot| slot.policy == ExecutionPolicy::Parallel)
            .collect();
        let dispatched: Vec<(String, bool, std::time::Duration, u32)> = crossbeam::thread::scope(
            |scope| {
                let handles: Vec<_> = due_slots
                    .into_iter()
                    .map(|slot| {
                        scope.spawn(move |_| dispatch_parallel_slot(slot, world, dt, deadline))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| handle.join().expect("parallel module panicked"))
                    .collect()
            },
        )
        .expect("parallel dispatch worker pool panicked");
        for (name, ran, elapsed, frames_since_last_run) in dispatched {
            if ran {
                let entry = self.stats.entry(name).or_default();
                entry.invocations += 1;
                entry.last_tick_micros = elapsed.as_micros() as u64;
                entry.frames_since_last_run = frames_since_last_run;
            } else {
                modules_skipped_by_frequency_gate += 1;
            }
        }

        // 6. Command merge.
        let mut buffers: Vec<CommandBuffer> = self
            .modules
            .iter_mut()
            .map(|slot| {
                std::mem::replace(
                    &mut slot.commands,
                    CommandBuffer::new(
                        ThreadId::sequential(slot.id.value() as u64),
                        self.config.command_buffer_initial_records,
                    ),
                )
            })
            .collect();
        let playback = merge_and_play(&mut buffers, &mut self.world);
        for (slot, buffer) in self.modules.iter_mut().zip(buffers) {
            slot.commands = buffer;
        }

        // 7. Lifecycle turn.
        let lifecycle_stats = self.lifecycle.process(&mut self.world);

        // 8. Post-simulation phase.
        self.scheduler
            .run(&mut self.world, &[Phase::PostSimulation, Phase::Export], dt);

        // 9. Tick advance.
        let tick = self.world.advance_tick();

        log::trace!(
            "frame {tick}: {} commands played, {} stale dropped, {modules_skipped_by_frequency_gate} modules skipped by frequency gate",
            playback.commands_played,
            playback.stale_dropped,
        );

        Ok(FrameReport {
            tick,
            commands_played: playback.commands_played,
            stale_commands_dropped: playback.stale_dropped,
            lifecycle: lifecycle_stats,
        })
    }

    /// A snapshot of every registered module's diagnostics, keyed by name.
    pub fn module_stats(&self) -> &HashMap<String, ModuleStats> {
        &self.stats
    }

    /// Tear down every registered module in registration order.
    pub fn shutdown(&mut self) {
        for slot in self.modules.iter_mut() {
            slot.module.cleanup(&mut self.world);
        }
    }
}

/// Run `module` against `view` if it is due this frame, per the frequency gate (§4.8 step 5):
/// always due on its first candidate frame, thereafter due once its accumulated frame count
/// reaches its configured `update_frequency`. Takes every field it touches individually rather
/// than a whole `&mut ModuleSlot`, so a caller that also holds a live borrow into a sibling field
/// (a provider-acquired `view` borrowed from `slot.provider`, for instance) can still call it.
///
/// Verified against the worked example at §8 ("k = 300, run for 1000 frames: ticked exactly
/// ⌊(1000-1)/k⌋ + 1 times"), which only holds if the first frame always runs.
///
/// `tick` runs behind a `catch_unwind` boundary (§7): a panicking module is logged and isolated
/// for this frame only — its frequency-gate state still advances as if it had run normally, so
/// the next due frame re-dispatches it rather than retrying the same tick. A module whose `tick`
/// returns but overran `deadline` is also logged, at the same level. Neither case can preempt a
/// module that never returns at all; see this module's doc comment for why.
#[allow(clippy::too_many_arguments)]
fn dispatch_if_due(
    module: &mut dyn Module,
    commands: &mut CommandBuffer,
    frames_since_last_run: &mut u32,
    accumulated_dt: &mut f32,
    has_run_once: &mut bool,
    frequency: u32,
    view: &EntityRepository,
    dt: f32,
    deadline: std::time::Duration,
) -> bool {
    *accumulated_dt += dt;
    *frames_since_last_run += 1;
    let due = !*has_run_once || *frames_since_last_run >= frequency;
    if !due {
        return false;
    }
    let effective_dt = *accumulated_dt;
    let name = module.name().to_string();
    let started = std::time::Instant::now();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        module.tick(view, effective_dt, commands);
    }));
    let elapsed = started.elapsed();
    match outcome {
        Err(payload) => {
            log::warn!(
                "module '{name}' panicked during tick and was isolated for this frame: {}",
                panic_message(&payload)
            );
        }
        Ok(()) if elapsed > deadline => {
            log::warn!(
                "module '{name}' exceeded its {deadline:?} tick deadline (took {elapsed:?})"
            );
        }
        Ok(()) => {}
    }
    *frames_since_last_run = 0;
    *accumulated_dt = 0.0;
    *has_run_once = true;
    true
}

/// Best-effort description of a `catch_unwind` payload for logging.
fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// One `Parallel` module's worker-pool turn: acquire its provider's view, run the frequency
/// gate, and hand back enough to update diagnostics back on the joining thread rather than
/// contending a shared `HashMap` from inside the scope.
fn dispatch_parallel_slot(
    slot: &mut ModuleSlot,
    world: &EntityRepository,
    dt: f32,
    deadline: std::time::Duration,
) -> (String, bool, std::time::Duration, u32) {
    let started = std::time::Instant::now();
    let ran = match slot.provider.as_mut().unwrap() {
        ProviderHandle::Mirror(provider) => {
            let view = provider.acquire_view();
            dispatch_if_due(
                slot.module.as_mut(),
                &mut slot.commands,
                &mut slot.frames_since_last_run,
                &mut slot.accumulated_dt,
                &mut slot.has_run_once,
                slot.frequency,
                view,
                dt,
                deadline,
            )
        }
        ProviderHandle::Pooled(provider) => {
            let view = provider.acquire_view(world);
            let ran = dispatch_if_due(
                slot.module.as_mut(),
                &mut slot.commands,
                &mut slot.frames_since_last_run,
                &mut slot.accumulated_dt,
                &mut slot.has_run_once,
                slot.frequency,
                view.get(),
                dt,
                deadline,
            );
            provider.release_view(view);
            ran
        }
        ProviderHandle::Shared(provider) => {
            let view = provider.acquire_view(world);
            let ran = dispatch_if_due(
                slot.module.as_mut(),
                &mut slot.commands,
                &mut slot.frames_since_last_run,
                &mut slot.accumulated_dt,
                &mut slot.has_run_once,
                slot.frequency,
                view.get(),
                dt,
                deadline,
            );
            provider.release_view(view);
            ran
        }
    };
    (
        slot.module.name().to_string(),
        ran,
        started.elapsed(),
        slot.frames_since_last_run,
    )
}

fn record_stats(
    stats: &mut HashMap<String, ModuleStats>,
    slot: &ModuleSlot,
    started: std::time::Instant,
) {
    let entry = stats.entry(slot.module.name().to_string()).or_default();
    entry.invocations += 1;
    entry.last_tick_micros = started.elapsed().as_micros() as u64;
    entry.frames_since_last_run = slot.frames_since_last_run;
}
