// ============================================================================
// Gravity Worker: background half of the double-buffered pipeline
//
// Handoff state machine (all transitions under `Handoff::exchange`):
//
//   Idle ──worker takes buffers──▶ Solving ──pass published──▶ ReadyForSwap
//     ▲                                                             │
//     └──────────────── consumer swaps buffers, notifies ───────────┘
//
// The worker parks on the condvar while a finished pass is unconsumed and
// only checks for shutdown at that park point, so an in-flight pass always
// completes before the thread exits.
// ============================================================================

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::config::GravityConfig;
use crate::error::Result;
use crate::grid::{FieldSet, MassGrid};
use crate::mask::Mask;
use crate::solver::{build_solver, FieldSolver};

pub const WORKER_THREAD_NAME: &str = "gravity-solver";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    /// Consumer has taken the last pass; the worker may start another.
    Idle,
    /// Worker owns its buffers and is solving.
    Solving,
    /// A finished pass sits in the slot waiting for the consumer.
    ReadyForSwap,
}

/// Grids that move between the two threads as one unit.
#[derive(Debug)]
pub struct PassBuffers {
    /// Worker→consumer: a spent mass buffer. Consumer→worker: accumulated mass.
    pub mass: MassGrid,
    pub field: FieldSet,
    /// The solver rewrote `field` this pass.
    pub changed: bool,
    /// Set by the consumer when it discarded the pass for a clear.
    pub reset: bool,
    /// Sequence number of the pass that produced `field`.
    pub pass: u64,
    pub solve_time: Duration,
}

impl PassBuffers {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            mass: MassGrid::zeros((height, width)),
            field: FieldSet::new(width, height),
            changed: false,
            reset: false,
            pass: 0,
            solve_time: Duration::ZERO,
        }
    }
}

#[derive(Debug)]
pub struct Exchange {
    pub state: PassState,
    pub shutdown: bool,
    /// Buffers parked by the worker; `Some` whenever the state is `ReadyForSwap`.
    pub slot: Option<PassBuffers>,
}

/// Synchronization for one worker lifetime. Created on start, dropped on stop.
#[derive(Debug)]
pub struct Handoff {
    pub exchange: Mutex<Exchange>,
    pub wake: Condvar,
}

impl Handoff {
    pub fn new() -> Self {
        Self {
            exchange: Mutex::new(Exchange {
                state: PassState::Idle,
                shutdown: false,
                slot: None,
            }),
            wake: Condvar::new(),
        }
    }

    /// The guarded data stays consistent even if a holder panicked, so a
    /// poisoned lock is recovered rather than propagated.
    pub fn lock(&self) -> MutexGuard<'_, Exchange> {
        self.exchange.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Handoff {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedMask = Arc<RwLock<Arc<Mask>>>;

pub fn current_mask(mask: &SharedMask) -> Arc<Mask> {
    Arc::clone(&mask.read().unwrap_or_else(PoisonError::into_inner))
}

/// Everything the worker owns. Handed back through the join handle on stop so
/// a restart reuses the grids and the solver (and its cached kernel).
pub struct WorkerState {
    pub solver: Box<dyn FieldSolver>,
    /// Masked mass grid of the previous pass.
    pub previous: MassGrid,
    pub buffers: PassBuffers,
    pub passes: u64,
}

impl WorkerState {
    pub fn new(config: &GravityConfig) -> Result<Self> {
        Ok(Self {
            solver: build_solver(config)?,
            previous: MassGrid::zeros((config.height, config.width)),
            buffers: PassBuffers::new(config.width, config.height),
            passes: 0,
        })
    }
}

/// Worker thread body. Returns its state once shutdown is observed.
pub fn run(handoff: Arc<Handoff>, mask: SharedMask, state: WorkerState) -> WorkerState {
    let WorkerState { mut solver, mut previous, mut buffers, mut passes } = state;
    let (height, width) = previous.dim();

    previous.fill(0.0);
    buffers.mass.fill(0.0);
    buffers.field.clear();
    buffers.reset = false;
    solver.reset();
    log::debug!("{} worker started ({} solver)", WORKER_THREAD_NAME, solver.name());

    loop {
        if buffers.reset {
            previous.fill(0.0);
            solver.reset();
            buffers.reset = false;
        }

        current_mask(&mask).apply(&mut buffers.mass);
        let started = Instant::now();
        buffers.changed = solver.solve(&previous, &buffers.mass, &mut buffers.field);
        buffers.solve_time = started.elapsed();
        // This pass becomes the baseline; the old baseline goes out as spare.
        std::mem::swap(&mut previous, &mut buffers.mass);
        passes += 1;
        if buffers.changed {
            buffers.pass = passes;
            log::trace!("pass {} solved in {:?}", passes, buffers.solve_time);
        } else {
            log::trace!("pass {} skipped, mass unchanged", passes);
        }

        let mut exchange = handoff.lock();
        exchange.slot = Some(buffers);
        exchange.state = PassState::ReadyForSwap;
        while exchange.state == PassState::ReadyForSwap && !exchange.shutdown {
            exchange = handoff.wake.wait(exchange).unwrap_or_else(PoisonError::into_inner);
        }
        buffers = exchange
            .slot
            .take()
            .unwrap_or_else(|| PassBuffers::new(width, height));
        if exchange.shutdown {
            exchange.state = PassState::Idle;
            break;
        }
        exchange.state = PassState::Solving;
    }

    log::debug!("{} worker exiting after {} passes", WORKER_THREAD_NAME, passes);
    WorkerState { solver, previous, buffers, passes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn worker_parks_until_consumed_and_exits_on_shutdown() {
        let config = GravityConfig::with_size(6, 4);
        let handoff = Arc::new(Handoff::new());
        let mask: SharedMask = Arc::new(RwLock::new(Arc::new(Mask::all_active(6, 4))));
        let state = WorkerState::new(&config).unwrap();

        let worker_handoff = Arc::clone(&handoff);
        let worker_mask = Arc::clone(&mask);
        let handle = thread::spawn(move || run(worker_handoff, worker_mask, state));

        // Wait for the first pass to be published.
        let mut guard = handoff.lock();
        while guard.state != PassState::ReadyForSwap {
            drop(guard);
            thread::yield_now();
            guard = handoff.lock();
        }
        let slot = guard.slot.as_ref().unwrap();
        assert!(!slot.changed, "empty mass never changes the field");
        guard.shutdown = true;
        drop(guard);
        handoff.wake.notify_all();

        let state = handle.join().unwrap();
        assert_eq!(state.passes, 1);
        assert_eq!(handoff.lock().state, PassState::Idle);
    }
}
