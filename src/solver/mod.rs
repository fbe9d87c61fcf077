//! Field solvers: mass grid in, (x, y, potential) out.
//!
//! Both strategies share one contract so the worker can run either and the
//! two can be cross-checked against each other:
//!
//! - [`DirectSolver`]: exact pairwise inverse-square summation
//! - [`FftSolver`]: convolution with a cached Green's-function spectrum

pub mod direct;
pub mod fft;

pub use direct::DirectSolver;
pub use fft::FftSolver;

use crate::config::{GravityConfig, SolverKind};
use crate::error::Result;
use crate::grid::{FieldSet, MassGrid};

pub trait FieldSolver: Send {
    /// Short name for diagnostics.
    fn name(&self) -> &'static str;

    /// Solve one pass. `previous` is the (masked) mass grid the last pass saw,
    /// `mass` the (masked) grid for this pass.
    ///
    /// Returns `true` if `out` was rewritten. When nothing changed the solver
    /// leaves `out` untouched and the caller keeps exposing the last field.
    fn solve(&mut self, previous: &MassGrid, mass: &MassGrid, out: &mut FieldSet) -> bool;

    /// Drop any state carried between passes. Called after the field is cleared.
    fn reset(&mut self) {}
}

/// Construct the solver selected by `config.solver`.
pub fn build_solver(config: &GravityConfig) -> Result<Box<dyn FieldSolver>> {
    config.validate()?;
    Ok(match config.solver {
        SolverKind::Direct(variant) => Box::new(DirectSolver::new(config, variant)),
        SolverKind::Fft => Box::new(FftSolver::new(config)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectVariant;
    use ndarray::Array2;

    const W: usize = 15;
    const H: usize = 11;

    fn config(solver: SolverKind) -> GravityConfig {
        GravityConfig { solver, ..GravityConfig::with_size(W, H) }
    }

    fn point_mass(x: usize, y: usize, m: f32) -> MassGrid {
        let mut mass = Array2::zeros((H, W));
        mass[[y, x]] = m;
        mass
    }

    fn solve_once(kind: SolverKind, mass: &MassGrid) -> FieldSet {
        let mut solver = build_solver(&config(kind)).unwrap();
        let mut out = FieldSet::new(W, H);
        assert!(solver.solve(&Array2::zeros((H, W)), mass, &mut out));
        out
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() <= 1e-3 * (1.0 + b.abs())
    }

    fn assert_centre_symmetry(field: &FieldSet, cx: usize, cy: usize) {
        for y in 0..H {
            for k in 1..=cx {
                let (l, r) = (cx - k, cx + k);
                assert!(close(field.x[[y, l]], -field.x[[y, r]]), "x antisymmetry at row {}", y);
                assert!(close(field.y[[y, l]], field.y[[y, r]]));
                assert!(close(field.potential[[y, l]], field.potential[[y, r]]));
            }
        }
        for x in 0..W {
            for k in 1..=cy {
                let (t, b) = (cy - k, cy + k);
                assert!(close(field.y[[t, x]], -field.y[[b, x]]), "y antisymmetry at column {}", x);
                assert!(close(field.x[[t, x]], field.x[[b, x]]));
                assert!(close(field.potential[[t, x]], field.potential[[b, x]]));
            }
        }
    }

    #[test]
    fn centred_point_mass_is_symmetric_in_both_modes() {
        let (cx, cy) = (W / 2, H / 2);
        let mass = point_mass(cx, cy, 10.0);
        let direct = solve_once(SolverKind::Direct(DirectVariant::Recompute), &mass);
        let fft = solve_once(SolverKind::Fft, &mass);

        assert_centre_symmetry(&direct, cx, cy);
        assert_centre_symmetry(&fft, cx, cy);

        for ((&d, &f), (y, x)) in direct.x.iter().zip(fft.x.iter()).zip(index_iter()) {
            assert!(close(f, d), "x mismatch at ({}, {}): fft {} direct {}", x, y, f, d);
        }
        for (&d, &f) in direct.y.iter().zip(fft.y.iter()) {
            assert!(close(f, d));
        }
        for (&d, &f) in direct.potential.iter().zip(fft.potential.iter()) {
            assert!(close(f, d));
        }
    }

    #[test]
    fn field_points_toward_the_mass() {
        let mass = point_mass(7, 5, 4.0);
        for kind in [SolverKind::Direct(DirectVariant::Recompute), SolverKind::Fft] {
            let field = solve_once(kind, &mass);
            assert!(field.x[[5, 2]] > 0.0, "left of the mass pulls right");
            assert!(field.x[[5, 12]] < 0.0, "right of the mass pulls left");
            assert!(field.y[[1, 7]] > 0.0, "above the mass pulls down");
            assert!(field.y[[9, 7]] < 0.0, "below the mass pulls up");
        }
    }

    #[test]
    fn modes_agree_on_scattered_masses() {
        let mut mass = Array2::zeros((H, W));
        mass[[0, 0]] = 3.0;
        mass[[10, 14]] = 1.5;
        mass[[4, 9]] = 6.0;
        mass[[7, 2]] = 0.5;
        let direct = solve_once(SolverKind::Direct(DirectVariant::Recompute), &mass);
        let fft = solve_once(SolverKind::Fft, &mass);
        for (&d, &f) in direct.x.iter().zip(fft.x.iter()) {
            assert!(close(f, d), "fft {} direct {}", f, d);
        }
        for (&d, &f) in direct.y.iter().zip(fft.y.iter()) {
            assert!(close(f, d), "fft {} direct {}", f, d);
        }
    }

    #[test]
    fn delta_variant_matches_recompute_after_several_passes() {
        let recompute_kind = SolverKind::Direct(DirectVariant::Recompute);
        let delta_kind = SolverKind::Direct(DirectVariant::Delta);
        let mut recompute = build_solver(&config(recompute_kind)).unwrap();
        let mut delta = build_solver(&config(delta_kind)).unwrap();
        let mut out_r = FieldSet::new(W, H);
        let mut out_d = FieldSet::new(W, H);

        let mut previous: MassGrid = Array2::zeros((H, W));
        let passes = [point_mass(3, 3, 2.0), point_mass(10, 8, 5.0), {
            let mut m = point_mass(10, 8, 5.0);
            m[[1, 1]] = 1.0;
            m
        }];
        for mass in passes.iter() {
            recompute.solve(&previous, mass, &mut out_r);
            delta.solve(&previous, mass, &mut out_d);
            previous = mass.clone();
        }
        for (&r, &d) in out_r.x.iter().zip(out_d.x.iter()) {
            assert!(close(d, r));
        }
        for (&r, &d) in out_r.potential.iter().zip(out_d.potential.iter()) {
            assert!(close(d, r));
        }
    }

    fn index_iter() -> impl Iterator<Item = (usize, usize)> {
        (0..H).flat_map(|y| (0..W).map(move |x| (y, x)))
    }
}
