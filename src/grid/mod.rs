//! Coarse gravity grids: the mass input and the solved (x, y, potential) triple.
//!
//! Every grid is an `Array2<f32>` of shape `(height, width)`, indexed `[[y, x]]`.
//! Each coarse cell covers a `cell_size × cell_size` block of fine pixels.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{GravityError, Result};

/// Per-cell accumulated particle mass.
pub type MassGrid = Array2<f32>;

/// One solved pass: acceleration components and the potential proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSet {
    pub x: Array2<f32>,
    pub y: Array2<f32>,
    pub potential: Array2<f32>,
}

impl FieldSet {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            x: Array2::zeros((height, width)),
            y: Array2::zeros((height, width)),
            potential: Array2::zeros((height, width)),
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.x.ncols()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.x.nrows()
    }

    pub fn clear(&mut self) {
        self.x.fill(0.0);
        self.y.fill(0.0);
        self.potential.fill(0.0);
    }

    pub fn is_zero(&self) -> bool {
        self.x.iter()
            .chain(self.y.iter())
            .chain(self.potential.iter())
            .all(|&v| v == 0.0)
    }

    /// Copy another triple into this one without reallocating.
    pub fn assign(&mut self, other: &FieldSet) {
        self.x.assign(&other.x);
        self.y.assign(&other.y);
        self.potential.assign(&other.potential);
    }
}

/// Bitwise equality: `-0.0 != 0.0` and identical NaN payloads compare equal.
pub fn grids_bit_identical(a: &Array2<f32>, b: &Array2<f32>) -> bool {
    a.dim() == b.dim() && a.iter().zip(b.iter()).all(|(l, r)| l.to_bits() == r.to_bits())
}

pub fn check_shape(grid: &Array2<f32>, width: usize, height: usize) -> Result<()> {
    let (h, w) = grid.dim();
    if w != width || h != height {
        return Err(GravityError::DimensionMismatch {
            expected_w: width,
            expected_h: height,
            found_w: w,
            found_h: h,
        });
    }
    Ok(())
}

/// Bilinear upsampling of a coarse grid to `out_w × out_h`, e.g. the fine
/// resolution for field visualisation.
pub fn upscale_bilinear(src: &Array2<f32>, out_w: usize, out_h: usize) -> Array2<f32> {
    let (sh, sw) = src.dim();
    let mut dst = Array2::zeros((out_h, out_w));
    if sw == 0 || sh == 0 {
        return dst;
    }

    for y in 0..out_h {
        let fy = y as f32 * sh as f32 / out_h as f32;
        let y0 = fy.floor() as usize;
        let y1 = (fy.ceil() as usize).min(sh - 1);
        let ty = fy.fract();
        for x in 0..out_w {
            let fx = x as f32 * sw as f32 / out_w as f32;
            let x0 = fx.floor() as usize;
            let x1 = (fx.ceil() as usize).min(sw - 1);
            let tx = fx.fract();

            let top = src[[y0, x0]] * (1.0 - tx) + src[[y0, x1]] * tx;
            let bottom = src[[y1, x0]] * (1.0 - tx) + src[[y1, x1]] * tx;
            dst[[y, x]] = top * (1.0 - ty) + bottom * ty;
        }
    }
    dst
}

/// Ambient particle gravity combined with the Newtonian field when sampling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GravityMode {
    /// Constant downward pull.
    #[default]
    Vertical,
    /// No ambient gravity; only the Newtonian field applies.
    Off,
    /// Pull toward the centre of the fine simulation area.
    Radial,
}

impl GravityMode {
    /// Ambient acceleration at fine pixel `(px, py)` in a `fine_w × fine_h` area.
    pub fn ambient(
        self,
        px: usize,
        py: usize,
        fine_w: usize,
        fine_h: usize,
        particle_grav: f32,
    ) -> (f32, f32) {
        match self {
            GravityMode::Vertical => (0.0, particle_grav),
            GravityMode::Off => (0.0, 0.0),
            GravityMode::Radial => {
                let dx = px as f32 - (fine_w / 2) as f32;
                let dy = py as f32 - (fine_h / 2) as f32;
                if dx == 0.0 && dy == 0.0 {
                    return (0.0, 0.0);
                }
                let mult = particle_grav / (dx * dx + dy * dy).sqrt();
                (-mult * dx, -mult * dy)
            }
        }
    }
}
