//! FFT convolution solver.
//!
//! The field of an arbitrary mass grid is the convolution of the grid with the
//! field of a unit point mass. The point-mass kernel is laid out on a grid
//! padded to 2W×2H so that the circular convolution computed by the DFT never
//! wraps a source around onto the opposite edge of the W×H domain.
//!
//! The x and y kernels are packed into one complex kernel `kx + i·ky`. Mass is
//! real, so the inverse transform of `M·(Kx + i·Ky)` carries the x field in
//! its real part and the y field in its imaginary part: one forward and one
//! inverse transform per pass.

use std::sync::Arc;

use rayon::prelude::*;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::FieldSolver;
use crate::config::GravityConfig;
use crate::error::Result;
use crate::grid::{grids_bit_identical, FieldSet, MassGrid};

const ZERO: Complex<f32> = Complex { re: 0.0, im: 0.0 };

pub struct FftSolver {
    width: usize,
    height: usize,
    pad_w: usize,
    pad_h: usize,

    /// Spectrum of the packed point-mass kernel, computed once.
    kernel: Vec<Complex<f32>>,
    /// Padded working grid, reused every pass.
    buffer: Vec<Complex<f32>>,
    column: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,

    row_forward: Arc<dyn Fft<f32>>,
    col_forward: Arc<dyn Fft<f32>>,
    row_inverse: Arc<dyn Fft<f32>>,
    col_inverse: Arc<dyn Fft<f32>>,
}

impl FftSolver {
    /// Plan the transforms and precompute the kernel spectrum.
    ///
    /// Buffer allocation is fallible here rather than aborting, since there is
    /// no useful degraded mode without the kernel.
    pub fn new(config: &GravityConfig) -> Result<Self> {
        let (width, height) = (config.width, config.height);
        let pad_w = 2 * width;
        let pad_h = 2 * height;

        let mut planner = FftPlanner::<f32>::new();
        let row_forward = planner.plan_fft_forward(pad_w);
        let col_forward = planner.plan_fft_forward(pad_h);
        let row_inverse = planner.plan_fft_inverse(pad_w);
        let col_inverse = planner.plan_fft_inverse(pad_h);

        let scratch_len = [&row_forward, &col_forward, &row_inverse, &col_inverse]
            .iter()
            .map(|f| f.get_inplace_scratch_len())
            .max()
            .unwrap_or(0);

        let mut solver = Self {
            width,
            height,
            pad_w,
            pad_h,
            kernel: try_zeroed(pad_w * pad_h)?,
            buffer: try_zeroed(pad_w * pad_h)?,
            column: try_zeroed(pad_h)?,
            scratch: try_zeroed(scratch_len)?,
            row_forward,
            col_forward,
            row_inverse,
            col_inverse,
        };
        solver.build_kernel(config.gravitational_constant);
        log::debug!(
            "fft solver ready: {}x{} grid, {}x{} padded",
            width, height, pad_w, pad_h
        );
        Ok(solver)
    }

    /// Fill the kernel with the field of a unit mass at (W, H) and transform it.
    ///
    /// Both transforms are unnormalized, so the 1/(4·W·H) normalization and
    /// the sign flip are folded into the kernel here instead of every pass.
    fn build_kernel(&mut self, g: f32) {
        let (w, h, pad_w) = (self.width, self.height, self.pad_w);
        let scale = -g / (4 * w * h) as f32;

        self.kernel
            .par_chunks_mut(pad_w)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, k) in row.iter_mut().enumerate() {
                    if x == w && y == h {
                        *k = ZERO;
                        continue;
                    }
                    let dx = x as f32 - w as f32;
                    let dy = y as f32 - h as f32;
                    let d2 = dx * dx + dy * dy;
                    let d3 = d2 * d2.sqrt();
                    *k = Complex::new(scale * dx / d3, scale * dy / d3);
                }
            });

        let mut kernel = std::mem::take(&mut self.kernel);
        self.transform(&mut kernel, true);
        self.kernel = kernel;
    }

    /// In-place 2D transform: every row, then every column.
    fn transform(&mut self, data: &mut [Complex<f32>], forward: bool) {
        let (row_fft, col_fft) = if forward {
            (&self.row_forward, &self.col_forward)
        } else {
            (&self.row_inverse, &self.col_inverse)
        };
        let (pad_w, pad_h) = (self.pad_w, self.pad_h);

        // Rows are contiguous: one call processes all of them in chunks.
        row_fft.process_with_scratch(data, &mut self.scratch);

        for c in 0..pad_w {
            for r in 0..pad_h {
                self.column[r] = data[r * pad_w + c];
            }
            col_fft.process_with_scratch(&mut self.column, &mut self.scratch);
            for r in 0..pad_h {
                data[r * pad_w + c] = self.column[r];
            }
        }
    }
}

impl FieldSolver for FftSolver {
    fn name(&self) -> &'static str {
        "fft"
    }

    fn solve(&mut self, previous: &MassGrid, mass: &MassGrid, out: &mut FieldSet) -> bool {
        debug_assert_eq!(mass.dim(), (self.height, self.width));
        if grids_bit_identical(previous, mass) {
            return false;
        }
        let (w, h, pad_w) = (self.width, self.height, self.pad_w);

        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.fill(ZERO);
        for ((y, x), &m) in mass.indexed_iter() {
            buffer[(y + h) * pad_w + x + w] = Complex::new(m, 0.0);
        }

        self.transform(&mut buffer, true);
        buffer
            .par_iter_mut()
            .zip(self.kernel.par_iter())
            .for_each(|(b, k)| *b *= *k);
        self.transform(&mut buffer, false);

        for y in 0..h {
            for x in 0..w {
                let v = buffer[y * pad_w + x];
                out.x[[y, x]] = v.re;
                out.y[[y, x]] = v.im;
                out.potential[[y, x]] = v.norm();
            }
        }
        self.buffer = buffer;
        true
    }
}

fn try_zeroed(len: usize) -> Result<Vec<Complex<f32>>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)?;
    v.resize(len, ZERO);
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn identical_mass_skips_and_keeps_previous_field() {
        let config = GravityConfig::with_size(8, 6);
        let mut solver = FftSolver::new(&config).unwrap();
        let zero = Array2::zeros((6, 8));
        let mut mass = Array2::zeros((6, 8));
        mass[[2, 3]] = 4.0;

        let mut out = FieldSet::new(8, 6);
        assert!(solver.solve(&zero, &mass, &mut out));
        let first = out.clone();
        assert!(!first.is_zero());

        assert!(!solver.solve(&mass, &mass, &mut out));
        assert_eq!(out, first);
    }

    #[test]
    fn all_zero_mass_never_changes() {
        let config = GravityConfig::with_size(8, 6);
        let mut solver = FftSolver::new(&config).unwrap();
        let zero = Array2::zeros((6, 8));
        let mut out = FieldSet::new(8, 6);
        for _ in 0..3 {
            assert!(!solver.solve(&zero, &zero, &mut out));
            assert!(out.is_zero());
        }
    }

    #[test]
    fn potential_is_norm_of_components() {
        let config = GravityConfig::with_size(10, 10);
        let mut solver = FftSolver::new(&config).unwrap();
        let mut mass = Array2::zeros((10, 10));
        mass[[1, 1]] = 2.0;
        mass[[8, 6]] = 1.0;
        let mut out = FieldSet::new(10, 10);
        solver.solve(&Array2::zeros((10, 10)), &mass, &mut out);
        for ((&x, &y), &p) in out.x.iter().zip(out.y.iter()).zip(out.potential.iter()) {
            assert!((p - (x * x + y * y).sqrt()).abs() < 1e-5);
        }
    }

    #[test]
    fn no_wraparound_from_opposite_edge() {
        // A mass on the left edge must pull the right edge leftward, not right.
        let config = GravityConfig::with_size(12, 4);
        let mut solver = FftSolver::new(&config).unwrap();
        let mut mass = Array2::zeros((4, 12));
        mass[[2, 0]] = 10.0;
        let mut out = FieldSet::new(12, 4);
        solver.solve(&Array2::zeros((4, 12)), &mass, &mut out);
        assert!(out.x[[2, 11]] < 0.0);
        let expected = -config.gravitational_constant * 10.0 / (11.0 * 11.0);
        assert!((out.x[[2, 11]] - expected).abs() < 1e-3);
    }
}
