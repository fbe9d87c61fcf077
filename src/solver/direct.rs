// ============================================================================
// Direct Field Solver
//
// Exact pairwise summation: every source cell adds an inverse-square pull to
// every other cell. O(sources × cells); cheap while the mass is sparse.
//
//   x += G·m·(sx − x) / d³
//   y += G·m·(sy − y) / d³
//   p += G·m / d²
//
// No softening; the self-exclusion check is the only singularity guard.
// ============================================================================

use ndarray::Zip;

use super::FieldSolver;
use crate::config::{DirectVariant, GravityConfig};
use crate::grid::{grids_bit_identical, FieldSet, MassGrid};

#[derive(Debug, Clone, Copy)]
struct Source {
    x: usize,
    y: usize,
    mass: f32,
}

pub struct DirectSolver {
    width: usize,
    height: usize,
    g: f32,
    epsilon: f32,
    variant: DirectVariant,
    /// Running field for the delta variant.
    accumulated: Option<FieldSet>,
}

impl DirectSolver {
    pub fn new(config: &GravityConfig, variant: DirectVariant) -> Self {
        let accumulated = match variant {
            DirectVariant::Delta => Some(FieldSet::new(config.width, config.height)),
            DirectVariant::Recompute => None,
        };
        Self {
            width: config.width,
            height: config.height,
            g: config.gravitational_constant,
            epsilon: config.mass_epsilon,
            variant,
            accumulated,
        }
    }

    fn occupied_sources(&self, mass: &MassGrid) -> Vec<Source> {
        mass.indexed_iter()
            .filter(|(_, &m)| m.abs() > self.epsilon)
            .map(|((y, x), &m)| Source { x, y, mass: m })
            .collect()
    }

    fn changed_sources(previous: &MassGrid, mass: &MassGrid) -> Vec<Source> {
        mass.indexed_iter()
            .zip(previous.iter())
            .filter(|((_, &m), &p)| m.to_bits() != p.to_bits())
            .map(|(((y, x), &m), &p)| Source { x, y, mass: m - p })
            .filter(|s| s.mass != 0.0)
            .collect()
    }

    /// Add the pull of `sources` into `out`, one output cell per rayon task.
    fn accumulate(&self, sources: &[Source], out: &mut FieldSet) {
        let g = self.g;
        Zip::indexed(&mut out.x)
            .and(&mut out.y)
            .and(&mut out.potential)
            .par_for_each(|(y, x), gx, gy, gp| {
                for s in sources {
                    if s.x == x && s.y == y {
                        continue;
                    }
                    let dx = s.x as f32 - x as f32;
                    let dy = s.y as f32 - y as f32;
                    let d2 = dx * dx + dy * dy;
                    let d = d2.sqrt();
                    let gm = g * s.mass;
                    *gx += gm * dx / (d2 * d);
                    *gy += gm * dy / (d2 * d);
                    *gp += gm / d2;
                }
            });
    }
}

impl FieldSolver for DirectSolver {
    fn name(&self) -> &'static str {
        match self.variant {
            DirectVariant::Recompute => "direct",
            DirectVariant::Delta => "direct-delta",
        }
    }

    fn solve(&mut self, previous: &MassGrid, mass: &MassGrid, out: &mut FieldSet) -> bool {
        debug_assert_eq!(mass.dim(), (self.height, self.width));
        match self.variant {
            DirectVariant::Recompute => {
                if grids_bit_identical(previous, mass) {
                    return false;
                }
                out.clear();
                let sources = self.occupied_sources(mass);
                self.accumulate(&sources, out);
                true
            }
            DirectVariant::Delta => {
                let sources = Self::changed_sources(previous, mass);
                if sources.is_empty() {
                    return false;
                }
                let mut acc = match self.accumulated.take() {
                    Some(acc) => acc,
                    None => FieldSet::new(self.width, self.height),
                };
                self.accumulate(&sources, &mut acc);
                out.assign(&acc);
                self.accumulated = Some(acc);
                true
            }
        }
    }

    fn reset(&mut self) {
        if let Some(acc) = self.accumulated.as_mut() {
            acc.clear();
        }
    }
}
