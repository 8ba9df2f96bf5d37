//! Visibility and coverage estimation for view planning.
//!
//! Given a static 3-D model and candidate sensor poses, this library
//! determines which model points each pose actually observes (inside the
//! field of view and not blocked by other geometry) and accumulates that
//! across poses into a running coverage ratio and accuracy estimate.
//!
//! # Architecture
//!
//! A query runs in stages:
//! - Grid: the model is indexed once into a sparse voxel occupancy grid
//! - Transform: model points are brought into the sensor frame
//! - Frustum: points outside the truncated view pyramid are dropped
//! - Occlusion: a ray is walked through the grid from the sensor to each
//!   remaining point; an occupied cell before the point's own cell hides it
//! - Aggregation: visible subsets are folded into a [`CoverageState`] with
//!   tolerance-based deduplication, and scored by an [`AccuracyModel`]
//!
//! # Usage
//!
//! ```ignore
//! use occlusion_culling::{OcclusionCulling, Pose};
//!
//! let culling = OcclusionCulling::new(model_points)?;
//! let mut coverage = culling.new_coverage();
//!
//! for pose in candidate_poses {
//!     let subset = culling.visible(&pose)?;
//!     let accuracy = culling.accuracy(&subset);
//!     let report = coverage.fold(&subset);
//!     println!(
//!         "{} visible, coverage {:.1}%, accuracy {:.3}",
//!         subset.len(),
//!         report.ratio * 100.0,
//!         accuracy.mean_accuracy
//!     );
//! }
//! ```

pub mod accuracy;
pub mod campaign;
pub mod cloud;
pub mod colors;
pub mod config;
pub mod coverage;
pub mod culling;
pub mod error;
pub mod frustum;
pub mod occlusion;
pub mod set_ops;
pub mod test_utils;
pub mod timing;
pub mod transform;
pub mod visualization;
pub mod voxel_grid;

pub use accuracy::{
    evaluate_accuracy, AccuracyConfig, AccuracyModel, AccuracyRange, AccuracyReport,
    DepthErrorModel,
};
pub use campaign::{CoverageUpdate, CoverageWorker, UpdateCallback, WorkerStats};
pub use cloud::PointCloud;
pub use config::OcclusionCullingConfig;
pub use coverage::{CoverageConfig, CoveragePhase, CoverageState, FoldReport};
pub use error::{CullingError, CullingWarning};
pub use frustum::{frustum_subset, FovConfig, Frustum};
pub use occlusion::{OcclusionEstimator, Visibility};
pub use set_ops::{contains, difference, PointBuckets, Tolerance};
pub use timing::QueryTiming;
pub use transform::Pose;
pub use visualization::{fov_wireframe, LineSegment, VisualizationSink};
pub use voxel_grid::{CellState, OccupancyQuery, VoxelCoord, VoxelGrid, VoxelGridConfig};

// High-level API (recommended for most users)
pub use culling::{
    build_grid, campaign_accuracy_range, fold_coverage, query_accuracy, query_visible,
    OcclusionCulling, OcclusionCullingBuilder, VisibleSubset,
};
