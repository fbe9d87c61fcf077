//! Error types for the gravity subsystem.

use std::collections::TryReserveError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GravityError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("configuration parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("grid is {found_w}x{found_h}, expected {expected_w}x{expected_h}")]
    DimensionMismatch {
        expected_w: usize,
        expected_h: usize,
        found_w: usize,
        found_h: usize,
    },

    #[error("could not allocate solver buffers: {0}")]
    Allocation(#[from] TryReserveError),

    #[error("could not spawn gravity worker: {0}")]
    WorkerSpawn(std::io::Error),

    #[error("gravity worker panicked")]
    WorkerPanicked,

    #[error("flood fill exceeded its stack capacity of {capacity} coordinates")]
    StackOverflow { capacity: usize },
}

pub type Result<T> = std::result::Result<T, GravityError>;
