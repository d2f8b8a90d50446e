//! The system scheduler (§4.7): systems declare a fixed phase plus before/after constraints
//! against other systems in the *same* phase; `initialise` resolves a deterministic order with
//! Kahn's algorithm, aborting on a cycle.

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::error::{Error, Result};
use crate::repository::EntityRepository;

/// The fixed, ordered list of phases a frame's systems run in (§4.8 steps 2 and 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Input,
    BeforeSync,
    Simulation,
    PostSimulation,
    Export,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Input,
        Phase::BeforeSync,
        Phase::Simulation,
        Phase::PostSimulation,
        Phase::Export,
    ];
}

/// A unit of per-frame logic that runs directly against the live world.
pub trait System: Send {
    fn name(&self) -> &str;
    fn run(&mut self, world: &mut EntityRepository, dt: f32);
}

struct Registration {
    system: Box<dyn System>,
    phase: Phase,
    before: Vec<String>,
    after: Vec<String>,
}

/// Accumulates system registrations, then resolves and runs them in phase order.
#[derive(Default)]
pub struct Scheduler {
    registrations: Vec<Registration>,
    order: Option<Vec<usize>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system in `phase`, naming any systems (by [`System::name`]) it must run
    /// before or after. Constraints naming a system in a different phase are ignored: phase
    /// order is already fixed, so a cross-phase constraint can never be violated.
    ///
    /// # Errors
    /// [`Error::ConcurrencyViolation`] if called after [`initialise`](Self::initialise).
    pub fn register_system(
        &mut self,
        system: Box<dyn System>,
        phase: Phase,
        before: Vec<String>,
        after: Vec<String>,
    ) -> Result<()> {
        if self.order.is_some() {
            let message =
                "cannot register a system after the scheduler has been initialised".to_string();
            log::error!("{message}");
            return Err(Error::ConcurrencyViolation { message });
        }
        log::debug!("registered system {} in phase {phase:?}", system.name());
        self.registrations.push(Registration {
            system,
            phase,
            before,
            after,
        });
        Ok(())
    }

    /// Resolve a deterministic run order: phases in [`Phase::ALL`] order, systems within each
    /// phase topologically sorted by their before/after constraints (ties broken by
    /// registration order).
    ///
    /// # Errors
    /// [`Error::SchemaError`] if any phase's constraints form a cycle.
    pub fn initialise(&mut self) -> Result<()> {
        let mut order = Vec::with_capacity(self.registrations.len());
        for phase in Phase::ALL {
            let indices: Vec<usize> = self
                .registrations
                .iter()
                .enumerate()
                .filter(|(_, registration)| registration.phase == phase)
                .map(|(i, _)| i)
                .collect();
            order.extend(topo_sort(&self.registrations, &indices)?);
        }
        self.order = Some(order);
        Ok(())
    }

    /// Run every system whose phase is in `phases`, in the resolved order.
    ///
    /// # Panics
    /// Panics if [`initialise`](Self::initialise) has not been called.
    pub fn run(&mut self, world: &mut EntityRepository, phases: &[Phase], dt: f32) {
        let order = self
            .order
            .clone()
            .expect("scheduler must be initialised before run");
        for i in order {
            if phases.contains(&self.registrations[i].phase) {
                self.registrations[i].system.run(world, dt);
            }
        }
    }
}

fn topo_sort(registrations: &[Registration], indices: &[usize]) -> Result<Vec<usize>> {
    let name_to_idx: HashMap<&str, usize> = indices
        .iter()
        .map(|&i| (registrations[i].system.name(), i))
        .collect();

    let mut in_degree: HashMap<usize, usize> = indices.iter().map(|&i| (i, 0)).collect();
    let mut edges: HashMap<usize, Vec<usize>> = indices.iter().map(|&i| (i, Vec::new())).collect();

    for &i in indices {
        for before_name in &registrations[i].before {
            if let Some(&target) = name_to_idx.get(before_name.as_str()) {
                edges.get_mut(&i).unwrap().push(target);
                *in_degree.get_mut(&target).unwrap() += 1;
            }
        }
        for after_name in &registrations[i].after {
            if let Some(&source) = name_to_idx.get(after_name.as_str()) {
                edges.get_mut(&source).unwrap().push(i);
                *in_degree.get_mut(&i).unwrap() += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> = indices
        .iter()
        .copied()
        .filter(|i| in_degree[i] == 0)
        .collect();
    let mut result = Vec::with_capacity(indices.len());

    while let Some(&next) = ready.iter().next() {
        ready.remove(&next);
        result.push(next);
        for &target in &edges[&next] {
            let degree = in_degree.get_mut(&target).unwrap();
            *degree -= 1;
            if *degree == 0 {
                ready.insert(target);
            }
        }
    }

    if result.len() != indices.len() {
        return Err(Error::SchemaError {
            message: "system ordering constraints form a cycle".to_string(),
        });
    }
    Ok(result)
}
