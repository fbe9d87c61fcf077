// ============================================================================
// Gravity Configuration
//
// Sizing of the coarse gravity grid, the physical constant, solver selection
// and the mask rebuild policy. Hosts either build this in code or load it
// from a JSON document.
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{GravityError, Result};

/// How the direct solver treats successive passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectVariant {
    /// Re-sum the whole field from every occupied cell when anything changed.
    Recompute,
    /// Keep a running field and only add the mass delta since the last pass.
    Delta,
}

/// Which field solver the worker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Exact pairwise summation, O(occupied × cells).
    Direct(DirectVariant),
    /// Convolution against a cached frequency-domain kernel.
    Fft,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GravityConfig {
    /// Coarse grid width in cells
    pub width: usize,
    /// Coarse grid height in cells
    pub height: usize,
    /// Fine simulation pixels per coarse cell edge
    pub cell_size: usize,
    /// Scalar G applied to every mass contribution
    pub gravitational_constant: f32,
    pub solver: SolverKind,
    /// Direct mode ignores cells whose |mass| is at or below this
    pub mass_epsilon: f32,
    /// Frames between the last wall edit and the mask rebuild
    pub mask_debounce_frames: u32,
    /// Flood-fill stack bound; `None` uses one slot per cell
    pub flood_stack_capacity: Option<usize>,
}

impl Default for GravityConfig {
    fn default() -> Self {
        Self {
            width:                  153,   // 612 px / 4
            height:                 96,    // 384 px / 4
            cell_size:              4,
            gravitational_constant: 6.673e-1,
            solver:                 SolverKind::Fft,
            mass_epsilon:           1e-4,
            mask_debounce_frames:   60,
            flood_stack_capacity:   None,
        }
    }
}

impl GravityConfig {
    /// Convenience for tests and small hosts: default config at a given size.
    pub fn with_size(width: usize, height: usize) -> Self {
        Self { width, height, ..Default::default() }
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }

    /// Fine simulation resolution covered by the coarse grid.
    pub fn fine_resolution(&self) -> (usize, usize) {
        (self.width * self.cell_size, self.height * self.cell_size)
    }

    pub fn stack_capacity(&self) -> usize {
        self.flood_stack_capacity.unwrap_or_else(|| self.cell_count())
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(GravityError::InvalidConfig(format!(
                "grid must be non-empty, got {}x{}",
                self.width, self.height
            )));
        }
        if self.cell_size == 0 {
            return Err(GravityError::InvalidConfig("cell_size must be at least 1".into()));
        }
        if !self.gravitational_constant.is_finite() {
            return Err(GravityError::InvalidConfig(format!(
                "gravitational_constant must be finite, got {}",
                self.gravitational_constant
            )));
        }
        if !(self.mass_epsilon >= 0.0) {
            return Err(GravityError::InvalidConfig(format!(
                "mass_epsilon must be non-negative, got {}",
                self.mass_epsilon
            )));
        }
        if self.flood_stack_capacity == Some(0) {
            return Err(GravityError::InvalidConfig(
                "flood_stack_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: GravityConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_fine_resolution() {
        let config = GravityConfig::default();
        assert_eq!(config.fine_resolution(), (612, 384));
        assert_eq!(config.stack_capacity(), 153 * 96);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_partial_document_uses_defaults() {
        let config = GravityConfig::from_json(
            r#"{ "width": 32, "height": 16, "solver": { "direct": "delta" } }"#,
        )
        .unwrap();
        assert_eq!(config.width, 32);
        assert_eq!(config.height, 16);
        assert_eq!(config.solver, SolverKind::Direct(DirectVariant::Delta));
        assert_eq!(config.mask_debounce_frames, 60);
    }

    #[test]
    fn json_fft_selector() {
        let config = GravityConfig::from_json(r#"{ "solver": "fft" }"#).unwrap();
        assert_eq!(config.solver, SolverKind::Fft);
    }

    #[test]
    fn rejects_empty_grid() {
        let err = GravityConfig::with_size(0, 8).validate().unwrap_err();
        assert!(matches!(err, GravityError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = GravityConfig::from_json("{ width: ").unwrap_err();
        assert!(matches!(err, GravityError::Json(_)));
    }

    #[test]
    fn rejects_zero_stack() {
        let config = GravityConfig { flood_stack_capacity: Some(0), ..Default::default() };
        assert!(config.validate().is_err());
    }
}
