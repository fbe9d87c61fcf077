//! The gravity field as the host simulation sees it.
//!
//! [`GravityField`] owns the consumer half of a double-buffered pipeline: the
//! mass input the host writes into each frame, the exposed (x, y, potential)
//! grids the host reads, and the published suppression mask. A background
//! worker thread (see [`worker`]) solves one pass at a time and hands finished
//! grids over under a mutex; the consumer never waits for it.
//!
//! Typical frame:
//!
//! ```text
//! field.deposit(px, py, m)        // for every particle
//! field.tick_mask(|x, y| wall)    // debounced mask rebuild
//! field.poll(true)                // hand over mass, pick up a finished pass
//! field.sample(px, py, ...)       // per-particle acceleration
//! ```

pub mod worker;

use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ndarray::{Array2, ArrayViewMut2};

use crate::config::GravityConfig;
use crate::error::{GravityError, Result};
use crate::grid::{FieldSet, GravityMode, MassGrid};
use crate::mask::{Mask, MaskBuilder, MaskDebounce};
pub use worker::PassState;
use worker::{current_mask, Handoff, SharedMask, WorkerState, WORKER_THREAD_NAME};

/// Counters gathered at each swap.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PassStats {
    /// Passes handed to the consumer.
    pub passes_completed: u64,
    /// Of those, passes where the solver rewrote the field.
    pub passes_recomputed: u64,
    /// Whether the most recently swapped pass changed the field.
    pub last_changed: bool,
    /// Solver time of the most recently swapped pass.
    pub last_solve: Duration,
    /// Worker sequence number of the pass behind the exposed field (0 = none).
    pub exposed_pass: u64,
}

struct RunningWorker {
    handoff: Arc<Handoff>,
    handle: JoinHandle<WorkerState>,
}

pub struct GravityField {
    config: GravityConfig,
    /// Written by the host during the frame; handed to the worker on swap.
    mass_input: MassGrid,
    /// Exposed field; replaced wholesale on swap.
    field: FieldSet,
    mask: SharedMask,
    builder: MaskBuilder,
    debounce: MaskDebounce,
    /// Discard the next finished pass and reset the worker's snapshot.
    clear_pending: bool,
    stats: PassStats,
    running: Option<RunningWorker>,
    /// Worker grids and solver kept between stop and the next start.
    parked: Option<WorkerState>,
}

impl GravityField {
    /// Allocate the consumer-side grids. The worker is not started.
    pub fn new(config: GravityConfig) -> Result<Self> {
        config.validate()?;
        let (w, h) = (config.width, config.height);
        log::debug!(
            "gravity field {}x{} cells ({}x{} px), solver {:?}",
            w,
            h,
            w * config.cell_size,
            h * config.cell_size,
            config.solver
        );
        Ok(Self {
            mass_input: MassGrid::zeros((h, w)),
            field: FieldSet::new(w, h),
            mask: Arc::new(RwLock::new(Arc::new(Mask::all_active(w, h)))),
            builder: MaskBuilder::new(&config),
            debounce: MaskDebounce::new(config.mask_debounce_frames),
            clear_pending: false,
            stats: PassStats::default(),
            running: None,
            parked: None,
            config,
        })
    }

    pub fn config(&self) -> &GravityConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// The exposed field. Suppressed cells read zero in x and y.
    pub fn field(&self) -> &FieldSet {
        &self.field
    }

    pub fn mass_input(&self) -> &MassGrid {
        &self.mass_input
    }

    /// Mass accumulation grid for the current frame, cleared after each poll.
    /// A view, so the host can write cells but never reshape the grid.
    pub fn mass_input_mut(&mut self) -> ArrayViewMut2<'_, f32> {
        self.mass_input.view_mut()
    }

    /// The currently published mask.
    pub fn mask(&self) -> Arc<Mask> {
        current_mask(&self.mask)
    }

    pub fn stats(&self) -> PassStats {
        self.stats
    }

    /// Add `mass` at fine pixel `(px, py)`. Out-of-range pixels are ignored.
    pub fn deposit(&mut self, px: usize, py: usize, mass: f32) {
        let cs = self.config.cell_size;
        let (x, y) = (px / cs, py / cs);
        if let Some(cell) = self.mass_input.get_mut([y, x]) {
            *cell += mass;
        }
    }

    /// Acceleration at fine pixel `(px, py)`: the Newtonian field scaled by
    /// `newton_grav` plus the ambient gravity of `mode`.
    pub fn sample(
        &self,
        px: usize,
        py: usize,
        particle_grav: f32,
        newton_grav: f32,
        mode: GravityMode,
    ) -> (f32, f32) {
        let cs = self.config.cell_size;
        let (fine_w, fine_h) = self.config.fine_resolution();
        let (ax, ay) = mode.ambient(px, py, fine_w, fine_h, particle_grav);
        let (x, y) = (px / cs, py / cs);
        match (self.field.x.get([y, x]), self.field.y.get([y, x])) {
            (Some(&gx), Some(&gy)) => (ax + newton_grav * gx, ay + newton_grav * gy),
            _ => (ax, ay),
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Spawn the worker. A no-op if it is already running.
    pub fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Ok(());
        }
        let state = match self.parked.take() {
            Some(state) => state,
            None => WorkerState::new(&self.config)?,
        };
        let solver_name = state.solver.name();

        let handoff = Arc::new(Handoff::new());
        let worker_handoff = Arc::clone(&handoff);
        let worker_mask = Arc::clone(&self.mask);
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || worker::run(worker_handoff, worker_mask, state))
            .map_err(GravityError::WorkerSpawn)?;

        self.field.clear();
        self.clear_pending = false;
        self.running = Some(RunningWorker { handoff, handle });
        log::info!("gravity worker started ({} solver)", solver_name);
        Ok(())
    }

    /// Request shutdown, wait for the in-flight pass to finish, join the
    /// worker and zero the exposed field. A no-op if not running.
    pub fn stop(&mut self) -> Result<()> {
        let result = match self.running.take() {
            None => Ok(()),
            Some(RunningWorker { handoff, handle }) => {
                handoff.lock().shutdown = true;
                handoff.wake.notify_all();
                match handle.join() {
                    Ok(state) => {
                        log::info!("gravity worker stopped after {} passes", state.passes);
                        self.parked = Some(state);
                        Ok(())
                    }
                    Err(_) => {
                        log::error!("gravity worker panicked; grids will be reallocated");
                        Err(GravityError::WorkerPanicked)
                    }
                }
            }
        };
        self.field.clear();
        result
    }

    /// Zero the exposed field now and discard whatever pass the worker has
    /// in flight. Used after a simulation reset or a mask change.
    pub fn mark_cleared(&mut self) {
        self.field.clear();
        self.clear_pending = true;
    }

    /// Full simulation reset: clear the field, drop the barrier mask back to
    /// all-active and cancel any pending rebuild.
    pub fn reset(&mut self) {
        let (w, h) = (self.config.width, self.config.height);
        let cleared = Arc::new(Mask::all_active(w, h));
        *self.mask.write().unwrap_or_else(PoisonError::into_inner) = cleared;
        self.debounce.disarm();
        self.mark_cleared();
        log::info!("gravity field reset");
    }

    /// A finished pass is waiting to be swapped in.
    pub fn pass_ready(&self) -> bool {
        match &self.running {
            Some(running) => running.handoff.lock().state == PassState::ReadyForSwap,
            None => false,
        }
    }

    /// Once per frame. Swaps buffers with the worker if a pass is ready and the
    /// host is advancing, then re-masks the exposed field and clears the mass
    /// input. Never blocks on a pass. Returns whether a swap happened.
    pub fn poll(&mut self, advance: bool) -> bool {
        let mut swapped = false;
        if let Some(running) = &self.running {
            let mut exchange = running.handoff.lock();
            if advance && exchange.state == PassState::ReadyForSwap {
                if let Some(slot) = exchange.slot.as_mut() {
                    std::mem::swap(&mut self.mass_input, &mut slot.mass);
                    self.stats.passes_completed += 1;
                    self.stats.last_changed = slot.changed;
                    self.stats.last_solve = slot.solve_time;

                    if self.clear_pending {
                        slot.field.clear();
                        slot.changed = false;
                        slot.reset = true;
                        self.field.clear();
                        self.stats.exposed_pass = 0;
                        self.clear_pending = false;
                        log::debug!("gravity pass discarded for clear");
                    } else if slot.changed {
                        std::mem::swap(&mut self.field, &mut slot.field);
                        self.stats.passes_recomputed += 1;
                        self.stats.exposed_pass = slot.pass;
                    }
                }
                exchange.state = PassState::Idle;
                swapped = true;
                drop(exchange);
                running.handoff.wake.notify_one();
            }
        }

        current_mask(&self.mask).apply_velocity(&mut self.field);
        self.mass_input.fill(0.0);
        swapped
    }

    // ------------------------------------------------------------------------
    // Mask
    // ------------------------------------------------------------------------

    /// Note a barrier edit; the rebuild runs after the debounce interval.
    pub fn schedule_mask_rebuild(&mut self) {
        self.debounce.arm();
    }

    pub fn mask_rebuild_pending(&self) -> bool {
        self.debounce.is_pending()
    }

    /// Advance the debounce by one frame, rebuilding when it expires.
    /// Returns whether a new mask was published.
    pub fn tick_mask<F>(&mut self, is_barrier: F) -> bool
    where
        F: Fn(usize, usize) -> bool,
    {
        if self.debounce.tick() {
            self.rebuild_mask(is_barrier)
        } else {
            false
        }
    }

    /// Rebuild the mask now. On flood-fill overflow the previous mask stays
    /// published and `false` is returned.
    pub fn rebuild_mask<F>(&mut self, is_barrier: F) -> bool
    where
        F: Fn(usize, usize) -> bool,
    {
        match self.builder.build(is_barrier) {
            Ok(mask) => {
                self.publish_mask(mask);
                true
            }
            Err(err) => {
                log::warn!("gravity mask rebuild aborted, keeping previous mask: {}", err);
                false
            }
        }
    }

    /// [`rebuild_mask`](Self::rebuild_mask) from a `(height, width)` barrier grid.
    pub fn rebuild_mask_from_grid(&mut self, barriers: &Array2<bool>) -> Result<bool> {
        match self.builder.build_from_grid(barriers) {
            Ok(mask) => {
                self.publish_mask(mask);
                Ok(true)
            }
            Err(GravityError::StackOverflow { capacity }) => {
                log::warn!(
                    "gravity mask rebuild aborted, keeping previous mask: \
                     flood fill exceeded {} entries",
                    capacity
                );
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    fn publish_mask(&mut self, mask: Mask) {
        log::info!(
            "gravity mask rebuilt: {} of {} cells suppressed",
            mask.suppressed_count(),
            self.config.cell_count()
        );
        *self.mask.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(mask);
        self.clear_pending = true;
    }
}

impl Drop for GravityField {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("gravity worker shutdown failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DirectVariant, SolverKind};

    fn direct(w: usize, h: usize) -> GravityConfig {
        GravityConfig {
            solver: SolverKind::Direct(DirectVariant::Recompute),
            ..GravityConfig::with_size(w, h)
        }
    }

    #[test]
    fn deposit_lands_in_covering_cell() {
        let mut field = GravityField::new(direct(4, 3)).unwrap();
        field.deposit(9, 5, 1.5);
        field.deposit(10, 6, 0.5);
        field.deposit(400, 1, 9.0);
        assert_eq!(field.mass_input()[[1, 2]], 2.0);
        assert_eq!(field.mass_input().sum(), 2.0);
    }

    #[test]
    fn poll_without_worker_clears_mass() {
        let mut field = GravityField::new(direct(4, 3)).unwrap();
        field.mass_input_mut()[[0, 0]] = 3.0;
        assert!(!field.poll(true));
        assert_eq!(field.mass_input().sum(), 0.0);
        assert!(field.field().is_zero());
    }

    #[test]
    fn mass_view_writes_through_without_reshaping() {
        let mut field = GravityField::new(direct(4, 3)).unwrap();
        let mut view = field.mass_input_mut();
        view[[2, 3]] = 1.5;
        view.fill(0.25);
        assert_eq!(view.dim(), (3, 4));
        assert_eq!(field.mass_input().dim(), (3, 4));
        assert_eq!(field.mass_input().sum(), 3.0);
    }

    #[test]
    fn reset_publishes_all_active_mask() {
        let mut field = GravityField::new(direct(9, 9)).unwrap();
        let room = |x: usize, y: usize| {
            let side = (x == 2 || x == 6) && (2..=6).contains(&y);
            side || ((y == 2 || y == 6) && (2..=6).contains(&x))
        };
        assert!(field.rebuild_mask(room));
        assert!(field.mask().suppressed_count() > 0);
        field.reset();
        assert_eq!(*field.mask(), Mask::all_active(9, 9));
    }

    #[test]
    fn sample_combines_mode_and_field() {
        let mut field = GravityField::new(direct(4, 3)).unwrap();
        field.field.x[[1, 1]] = 2.0;
        field.field.y[[1, 1]] = -1.0;
        let (ax, ay) = field.sample(5, 5, 0.5, 0.25, GravityMode::Vertical);
        assert!((ax - 0.5).abs() < 1e-6);
        assert!((ay - 0.25).abs() < 1e-6);
        assert_eq!(field.sample(100, 100, 0.5, 1.0, GravityMode::Off), (0.0, 0.0));
    }

    #[test]
    fn failed_rebuild_keeps_published_mask() {
        let mut config = direct(9, 6);
        config.flood_stack_capacity = Some(3);
        let mut field = GravityField::new(config).unwrap();
        let before = field.mask();
        assert!(!field.rebuild_mask(|x, y| y > 0 && x % 2 == 1));
        assert!(Arc::ptr_eq(&before, &field.mask()));
    }

    #[test]
    fn stop_without_start_is_harmless() {
        let mut field = GravityField::new(direct(4, 3)).unwrap();
        assert!(field.stop().is_ok());
        assert!(!field.is_running());
        assert!(!field.pass_ready());
    }
}
