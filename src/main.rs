// ============================================================================
// gravfield demo
//
// Headless run of the gravity pipeline on the default 153×96 grid:
//   1. Two mass clumps, solved by the background worker
//   2. Cross-check of the FFT field against the direct sum
//   3. A walled room built mid-run, debounced, then suppressed
//   4. Stop and restart with the reclaimed grids
// ============================================================================

use std::thread;
use std::time::{Duration, Instant};

use gravfield::{
    build_solver, DirectVariant, FieldSet, GravityConfig, GravityField, GravityMode, MassGrid,
    SolverKind,
};

fn main() -> gravfield::Result<()> {
    println!("═══════════════════════════════════════════════════════════════");
    println!("  GRAVFIELD — asynchronous Newtonian gravity demo");
    println!("═══════════════════════════════════════════════════════════════\n");

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path).map_err(|e| {
                gravfield::GravityError::InvalidConfig(format!("cannot read {}: {}", path, e))
            })?;
            GravityConfig::from_json(&text)?
        }
        None => GravityConfig::default(),
    };
    let (fine_w, fine_h) = config.fine_resolution();
    println!("[CONFIG] {}x{} cells, {}x{} px, solver {:?}, G = {}",
        config.width, config.height, fine_w, fine_h, config.solver, config.gravitational_constant);

    let mut field = GravityField::new(config.clone())?;
    field.start()?;

    // ------------------------------------------------------------------------
    println!("\n[PHASE 1] Two clumps of particles");
    let clumps = [(150usize, 190usize, 40.0f32), (460, 200, 25.0)];
    let settled = run_frames(&mut field, 30, |f| {
        for &(px, py, m) in &clumps {
            f.deposit(px, py, m);
        }
    });
    let stats = field.stats();
    println!("  Swaps: {}  recomputed: {}  last solve: {:?}",
        settled, stats.passes_recomputed, stats.last_solve);

    for (px, py) in [(300usize, 190usize), (20, 20), (600, 380)] {
        let (ax, ay) = field.sample(px, py, 0.0, 1.0, GravityMode::Off);
        println!("  pull at ({:3},{:3}) px: ({:+.4}, {:+.4})", px, py, ax, ay);
    }

    // ------------------------------------------------------------------------
    println!("\n[PHASE 2] FFT vs direct cross-check");
    let mut mass = MassGrid::zeros((config.height, config.width));
    for &(px, py, m) in &clumps {
        mass[[py / config.cell_size, px / config.cell_size]] += m;
    }
    let zero = MassGrid::zeros(mass.dim());
    let mut worst = 0.0f32;
    let mut timings = Vec::new();
    let mut results = Vec::new();
    for kind in [SolverKind::Fft, SolverKind::Direct(DirectVariant::Recompute)] {
        let cfg = GravityConfig { solver: kind, ..config.clone() };
        let mut solver = build_solver(&cfg)?;
        let mut out = FieldSet::new(cfg.width, cfg.height);
        let started = Instant::now();
        solver.solve(&zero, &mass, &mut out);
        timings.push((solver.name(), started.elapsed()));
        results.push(out);
    }
    for (a, b) in results[0].x.iter().zip(results[1].x.iter()) {
        worst = worst.max((a - b).abs());
    }
    for (name, elapsed) in &timings {
        println!("  {:>6}: {:?}", name, elapsed);
    }
    println!("  max |Δx| = {:.2e}", worst);

    // ------------------------------------------------------------------------
    println!("\n[PHASE 3] Walled room around the first clump");
    let (rx0, ry0, rx1, ry1) = (30usize, 40usize, 45usize, 55usize);
    let wall = move |x: usize, y: usize| {
        let on_x = x == rx0 || x == rx1;
        let on_y = y == ry0 || y == ry1;
        (on_x && (ry0..=ry1).contains(&y)) || (on_y && (rx0..=rx1).contains(&x))
    };
    field.schedule_mask_rebuild();
    let mut frames = 0;
    while field.mask_rebuild_pending() {
        if field.tick_mask(wall) {
            break;
        }
        frames += 1;
    }
    println!("  Rebuilt after {} debounce frames, {} cells suppressed",
        frames + 1, field.mask().suppressed_count());
    run_frames(&mut field, 10, |f| {
        for &(px, py, m) in &clumps {
            f.deposit(px, py, m);
        }
    });
    let (ax, ay) = field.sample(150, 190, 0.0, 1.0, GravityMode::Off);
    println!("  pull inside the room: ({:+.4}, {:+.4})", ax, ay);

    // ------------------------------------------------------------------------
    println!("\n[PHASE 4] Stop / restart");
    field.stop()?;
    println!("  stopped, field zero: {}", field.field().is_zero());
    field.start()?;
    run_frames(&mut field, 5, |f| f.deposit(300, 190, 10.0));
    println!("  restarted, passes so far: {}", field.stats().passes_completed);
    field.stop()?;

    println!("\n═══════════════════════════════════════════════════════════════");
    println!("  Done.");
    println!("═══════════════════════════════════════════════════════════════");
    Ok(())
}

/// Drive `frames` frames at ~60 Hz. Returns the number of swaps seen.
fn run_frames<F>(field: &mut GravityField, frames: usize, mut deposit: F) -> usize
where
    F: FnMut(&mut GravityField),
{
    let mut swaps = 0;
    for _ in 0..frames {
        deposit(field);
        if field.poll(true) {
            swaps += 1;
        }
        thread::sleep(Duration::from_millis(16));
    }
    swaps
}
