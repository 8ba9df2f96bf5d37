//! Top-level configuration.
//!
//! Every section deserializes with defaults, so a JSON document only needs
//! the values it overrides:
//!
//! ```json
//! { "grid": { "leaf_size": [0.25, 0.25, 0.25] }, "fov": { "far": 8.0 } }
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::accuracy::AccuracyConfig;
use crate::coverage::CoverageConfig;
use crate::error::CullingError;
use crate::frustum::FovConfig;
use crate::voxel_grid::VoxelGridConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcclusionCullingConfig {
    pub grid: VoxelGridConfig,
    pub fov: FovConfig,
    pub accuracy: AccuracyConfig,
    pub coverage: CoverageConfig,
}

impl OcclusionCullingConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, CullingError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn to_json_string(&self) -> Result<String, CullingError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every section. Configuration errors are fatal.
    pub fn validate(&self) -> Result<(), CullingError> {
        self.grid.validate()?;
        self.fov.validate()?;
        self.accuracy.validate()?;
        self.coverage.tolerance()?;
        Ok(())
    }
}
