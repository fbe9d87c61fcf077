//! gravfield: asynchronous Newtonian gravity for cellular particle simulations.
//!
//! Architecture:
//! - Coarse grids as `ndarray::Array2<f32>` (grid module), one cell per 4×4 fine pixels
//! - Pairwise and FFT-convolution field solvers behind one trait (solver module)
//! - Scanline flood fill that suppresses gravity inside walled-off rooms (mask module)
//! - Double-buffered worker thread handing finished passes to the frame loop (pipeline module)
//!
//! The host deposits particle mass each frame and polls once per frame; the
//! field it reads is always one complete pass, at most a frame or two behind.

pub mod config;
pub mod error;
pub mod grid;
pub mod mask;
pub mod pipeline;
pub mod solver;

pub use config::{DirectVariant, GravityConfig, SolverKind};
pub use error::{GravityError, Result};
pub use grid::{upscale_bilinear, FieldSet, GravityMode, MassGrid};
pub use mask::{Mask, MaskBuilder, MASK_ACTIVE, MASK_SUPPRESSED};
pub use pipeline::{GravityField, PassState, PassStats};
pub use solver::{build_solver, DirectSolver, FftSolver, FieldSolver};
