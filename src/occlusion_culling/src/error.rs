//! Error and warning types.
//!
//! Configuration problems (bad leaf size, bad field of view, bad tolerance)
//! are fatal and surface as [`CullingError`] at construction time. Degenerate
//! but usable inputs, such as an empty model, are reported as
//! [`CullingWarning`]s and logged instead.

use thiserror::Error;

/// Errors raised while building grids, frusta, or evaluating poses.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CullingError {
    #[error("invalid pose: {0}")]
    InvalidPose(String),

    #[error("degenerate voxel grid: leaf size must be finite and > 0 on every axis (got {leaf_size:?})")]
    DegenerateGrid { leaf_size: [f32; 3] },

    #[error("invalid field of view: {0}")]
    InvalidFov(String),

    #[error("invalid set tolerance {0}: must be finite and > 0")]
    InvalidTolerance(f32),

    #[error("invalid accuracy model: {0}")]
    InvalidAccuracyModel(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for CullingError {
    fn from(e: serde_json::Error) -> Self {
        CullingError::Config(e.to_string())
    }
}

/// Non-fatal conditions detected while building a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullingWarning {
    /// The model has no usable points: coverage stays 0 and every query is empty.
    EmptyModel,
    /// Points with NaN or infinite coordinates were left out of the grid.
    NonFinitePoints { dropped: usize },
}

impl std::fmt::Display for CullingWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CullingWarning::EmptyModel => write!(f, "model contains no finite points"),
            CullingWarning::NonFinitePoints { dropped } => {
                write!(f, "{dropped} non-finite points excluded from the grid")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CullingError::DegenerateGrid {
            leaf_size: [0.0, 1.0, 1.0],
        };
        assert!(err.to_string().contains("leaf size"));

        let err = CullingError::InvalidTolerance(-1.0);
        assert!(err.to_string().contains("-1"));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: CullingError = parse.unwrap_err().into();
        assert!(matches!(err, CullingError::Config(_)));
    }

    #[test]
    fn test_warning_display() {
        let w = CullingWarning::NonFinitePoints { dropped: 3 };
        assert_eq!(w.to_string(), "3 non-finite points excluded from the grid");
    }
}
