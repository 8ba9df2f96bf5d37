//! Visibility queries over a static model.
//!
//! The free functions are the stateless entry points:
//!
//! - [`build_grid`] indexes a model into a [`VoxelGrid`].
//! - [`query_visible`] runs transform, frustum culling and occlusion for one pose.
//! - [`fold_coverage`] threads a [`CoverageState`] through one visible subset.
//! - [`query_accuracy`] scores a visible subset.
//! - [`campaign_accuracy_range`] scores batches of poses in parallel.
//!
//! [`OcclusionCulling`] bundles a model, its grid, a configuration and an
//! accuracy model behind one handle for callers that evaluate many poses.
//!
//! # Example
//!
//! ```ignore
//! use occlusion_culling::{OcclusionCulling, Pose};
//!
//! let culling = OcclusionCulling::builder()
//!     .leaf_size(0.25)
//!     .far(8.0)
//!     .build(model_points)?;
//!
//! let mut coverage = culling.new_coverage();
//! for pose in candidate_poses {
//!     let subset = culling.visible(&pose)?;
//!     let report = coverage.fold(&subset);
//!     println!("ratio {:.3} (+{})", report.ratio, report.newly_covered.len());
//! }
//! ```

use std::sync::Arc;

use rayon::prelude::*;

use crate::accuracy::{evaluate_accuracy, AccuracyModel, AccuracyRange, AccuracyReport, DepthErrorModel};
use crate::campaign::{CoverageWorker, UpdateCallback};
use crate::cloud::PointCloud;
use crate::config::OcclusionCullingConfig;
use crate::coverage::CoverageState;
use crate::error::CullingError;
use crate::frustum::{FovConfig, Frustum};
use crate::occlusion::OcclusionEstimator;
use crate::set_ops::Tolerance;
use crate::timing::{QueryTiming, Timer};
use crate::transform::Pose;
use crate::visualization::{publish_pose, VisualizationSink};
use crate::voxel_grid::{OccupancyQuery, VoxelGrid, VoxelGridConfig};

/// Points of the model seen from one pose: inside the field of view and
/// not occluded.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleSubset {
    pub pose: Pose,
    /// Visible model indices, ascending.
    pub indices: Vec<usize>,
    /// World-frame positions, parallel to `indices`.
    pub points: Vec<[f32; 3]>,
    /// Normals parallel to `indices`, when the model carries them.
    pub normals: Option<Vec<[f32; 3]>>,
    /// Model indices inside the field of view (before occlusion), ascending.
    pub frustum_indices: Vec<usize>,
    pub timing: QueryTiming,
}

impl VisibleSubset {
    pub fn empty(pose: Pose) -> Self {
        Self {
            pose,
            indices: Vec::new(),
            points: Vec::new(),
            normals: None,
            frustum_indices: Vec::new(),
            timing: QueryTiming::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Fraction of the in-view points that survived occlusion.
    pub fn visible_fraction(&self) -> f64 {
        if self.frustum_indices.is_empty() {
            0.0
        } else {
            self.indices.len() as f64 / self.frustum_indices.len() as f64
        }
    }

    /// Attach the normals of the visible points from `cloud`.
    pub fn attach_normals(&mut self, cloud: &PointCloud) {
        self.normals = cloud.normals().map(|normals| {
            self.indices
                .iter()
                .filter_map(|&i| normals.get(i).copied())
                .collect()
        });
    }
}

/// Index `model` into an occupancy grid with the given leaf size.
pub fn build_grid(model: &[[f32; 3]], leaf_size: [f32; 3]) -> Result<VoxelGrid, CullingError> {
    VoxelGrid::from_points(model, VoxelGridConfig { leaf_size })
}

/// Visible subset of `model` (world frame) from `pose`.
///
/// `grid` must be expressed in the same frame as `model`; it is usually
/// built from `model` itself but may cover a different occluder set.
pub fn query_visible<G>(
    pose: &Pose,
    fov: &FovConfig,
    model: &[[f32; 3]],
    grid: &G,
) -> Result<VisibleSubset, CullingError>
where
    G: OccupancyQuery + Sync,
{
    let frustum = Frustum::new(*pose, *fov)?;
    Ok(query_visible_in(&frustum, model, grid))
}

fn query_visible_in<G>(frustum: &Frustum, model: &[[f32; 3]], grid: &G) -> VisibleSubset
where
    G: OccupancyQuery + Sync,
{
    let pose = *frustum.pose();
    let total = Timer::new("query");

    let timer = Timer::new("transform");
    let sensor_points = pose.to_sensor_frame(model);
    let transform_ms = timer.elapsed_ms();

    let timer = Timer::new("frustum");
    let frustum_indices = frustum.cull(&sensor_points);
    let frustum_ms = timer.elapsed_ms();

    let timer = Timer::new("occlusion");
    let estimator = OcclusionEstimator::new(grid, pose.origin());
    let indices = estimator.filter_visible(model, &frustum_indices);
    let occlusion_ms = timer.elapsed_ms();

    let points = indices.iter().map(|&i| model[i]).collect();

    tracing::debug!(
        in_view = frustum_indices.len(),
        visible = indices.len(),
        "visibility query"
    );

    VisibleSubset {
        pose,
        indices,
        points,
        normals: None,
        frustum_indices,
        timing: QueryTiming {
            total_ms: total.elapsed_ms(),
            transform_ms,
            frustum_ms,
            occlusion_ms,
        },
    }
}

/// Fold `subset` into `state` and return the updated state.
pub fn fold_coverage(mut state: CoverageState, subset: &VisibleSubset) -> CoverageState {
    state.fold(subset);
    state
}

/// Mean accuracy of the subset's points as seen from `pose`.
pub fn query_accuracy(subset: &VisibleSubset, pose: &Pose, model: &dyn AccuracyModel) -> AccuracyReport {
    evaluate_accuracy(model, &subset.points, subset.normals.as_deref(), pose)
}

/// Global min/max of per-pose mean accuracy over every pose of every set.
///
/// Poses are evaluated in parallel. Poses that see nothing do not
/// contribute; the range is empty if no pose sees any point.
pub fn campaign_accuracy_range<G>(
    pose_sets: &[Vec<Pose>],
    fov: &FovConfig,
    model: &[[f32; 3]],
    grid: &G,
    accuracy: &dyn AccuracyModel,
) -> Result<AccuracyRange, CullingError>
where
    G: OccupancyQuery + Sync,
{
    fov.validate()?;
    let poses: Vec<&Pose> = pose_sets.iter().flatten().collect();

    let ranges: Vec<AccuracyRange> = poses
        .par_iter()
        .map(|pose| {
            let subset = query_visible(pose, fov, model, grid)?;
            let mut range = AccuracyRange::empty();
            range.observe_report(&query_accuracy(&subset, pose, accuracy));
            Ok(range)
        })
        .collect::<Result<_, CullingError>>()?;

    let range = ranges
        .into_iter()
        .fold(AccuracyRange::empty(), AccuracyRange::merge);
    tracing::debug!(poses = poses.len(), ?range, "campaign accuracy range");
    Ok(range)
}

/// Builder for [`OcclusionCulling`].
#[derive(Clone)]
pub struct OcclusionCullingBuilder {
    config: OcclusionCullingConfig,
    accuracy_model: Option<Arc<dyn AccuracyModel>>,
}

impl OcclusionCullingBuilder {
    pub fn new() -> Self {
        Self {
            config: OcclusionCullingConfig::default(),
            accuracy_model: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: OcclusionCullingConfig) -> Self {
        self.config = config;
        self
    }

    /// Set a cubic leaf size.
    pub fn leaf_size(mut self, leaf: f32) -> Self {
        self.config.grid.leaf_size = [leaf; 3];
        self
    }

    pub fn leaf_size_xyz(mut self, leaf_size: [f32; 3]) -> Self {
        self.config.grid.leaf_size = leaf_size;
        self
    }

    /// Set horizontal and vertical half-angles in degrees.
    pub fn half_angles_deg(mut self, horizontal: f64, vertical: f64) -> Self {
        self.config.fov.horizontal_half_angle_deg = horizontal;
        self.config.fov.vertical_half_angle_deg = vertical;
        self
    }

    pub fn near(mut self, near: f64) -> Self {
        self.config.fov.near = near;
        self
    }

    pub fn far(mut self, far: f64) -> Self {
        self.config.fov.far = far;
        self
    }

    /// Point-equality tolerance for coverage deduplication.
    pub fn tolerance(mut self, tolerance: f32) -> Self {
        self.config.coverage.tolerance = tolerance;
        self
    }

    /// Replace the default depth-error accuracy model.
    pub fn accuracy_model(mut self, model: Arc<dyn AccuracyModel>) -> Self {
        self.accuracy_model = Some(model);
        self
    }

    /// Validate the configuration and index `model`.
    pub fn build(self, model: impl Into<PointCloud>) -> Result<OcclusionCulling, CullingError> {
        OcclusionCulling::with_parts(model.into(), self.config, self.accuracy_model)
    }
}

impl Default for OcclusionCullingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A static model, its occupancy grid and the query configuration.
///
/// Model and grid are shared behind `Arc` and never mutated, so one
/// instance can serve queries from many threads.
#[derive(Clone)]
pub struct OcclusionCulling {
    config: OcclusionCullingConfig,
    model: Arc<PointCloud>,
    grid: Arc<VoxelGrid>,
    accuracy: Arc<dyn AccuracyModel>,
    tolerance: Tolerance,
}

impl std::fmt::Debug for OcclusionCulling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcclusionCulling")
            .field("config", &self.config)
            .field("model_points", &self.model.len())
            .field("occupied_cells", &self.grid.len())
            .finish()
    }
}

impl OcclusionCulling {
    /// Default configuration over `model`.
    pub fn new(model: impl Into<PointCloud>) -> Result<Self, CullingError> {
        Self::with_config(model, OcclusionCullingConfig::default())
    }

    pub fn with_config(
        model: impl Into<PointCloud>,
        config: OcclusionCullingConfig,
    ) -> Result<Self, CullingError> {
        Self::with_parts(model.into(), config, None)
    }

    pub fn builder() -> OcclusionCullingBuilder {
        OcclusionCullingBuilder::new()
    }

    fn with_parts(
        model: PointCloud,
        config: OcclusionCullingConfig,
        accuracy: Option<Arc<dyn AccuracyModel>>,
    ) -> Result<Self, CullingError> {
        config.validate()?;
        let tolerance = config.coverage.tolerance()?;
        let accuracy = match accuracy {
            Some(model) => model,
            None => Arc::new(DepthErrorModel::new(config.accuracy)?),
        };
        let grid = VoxelGrid::from_cloud(&model, config.grid)?;

        tracing::debug!(
            points = model.len(),
            occupied_cells = grid.len(),
            leaf_size = ?config.grid.leaf_size,
            "occlusion culling ready"
        );

        Ok(Self {
            config,
            model: Arc::new(model),
            grid: Arc::new(grid),
            accuracy,
            tolerance,
        })
    }

    pub fn config(&self) -> &OcclusionCullingConfig {
        &self.config
    }

    pub fn model(&self) -> &PointCloud {
        &self.model
    }

    pub fn model_arc(&self) -> Arc<PointCloud> {
        Arc::clone(&self.model)
    }

    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    pub fn grid_arc(&self) -> Arc<VoxelGrid> {
        Arc::clone(&self.grid)
    }

    pub fn accuracy_model(&self) -> &dyn AccuracyModel {
        self.accuracy.as_ref()
    }

    /// View volume at `pose` with the configured field of view.
    pub fn frustum(&self, pose: &Pose) -> Result<Frustum, CullingError> {
        Frustum::new(*pose, self.config.fov)
    }

    /// Visible subset from `pose`, with normals attached when the model
    /// has them.
    pub fn visible(&self, pose: &Pose) -> Result<VisibleSubset, CullingError> {
        let frustum = self.frustum(pose)?;

        // The model lies inside the grid extent; a view volume that misses
        // the extent sees nothing.
        if let Some((lo, hi)) = self.grid.extent() {
            if !frustum.may_intersect_box(&lo, &hi) {
                tracing::trace!("view volume misses the model extent");
                return Ok(VisibleSubset::empty(*pose));
            }
        } else {
            return Ok(VisibleSubset::empty(*pose));
        }

        let mut subset = query_visible_in(&frustum, self.model.points(), self.grid.as_ref());
        subset.attach_normals(&self.model);
        Ok(subset)
    }

    /// Accuracy of a subset produced by [`visible`](Self::visible).
    pub fn accuracy(&self, subset: &VisibleSubset) -> AccuracyReport {
        query_accuracy(subset, &subset.pose, self.accuracy.as_ref())
    }

    /// Visible subsets and accuracy for many poses, evaluated in parallel.
    /// Results are in pose order.
    pub fn evaluate_batch(
        &self,
        poses: &[Pose],
    ) -> Result<Vec<(VisibleSubset, AccuracyReport)>, CullingError> {
        poses
            .par_iter()
            .map(|pose| {
                let subset = self.visible(pose)?;
                let report = self.accuracy(&subset);
                Ok((subset, report))
            })
            .collect()
    }

    /// Global min/max of per-pose mean accuracy over batches of poses.
    pub fn accuracy_range(&self, pose_sets: &[Vec<Pose>]) -> Result<AccuracyRange, CullingError> {
        let poses: Vec<Pose> = pose_sets.iter().flatten().copied().collect();
        let results = self.evaluate_batch(&poses)?;
        Ok(results
            .iter()
            .fold(AccuracyRange::empty(), |mut range, (_, report)| {
                range.observe_report(report);
                range
            }))
    }

    /// Empty coverage state sized to this model.
    pub fn new_coverage(&self) -> CoverageState {
        CoverageState::for_grid(&self.grid, self.tolerance)
    }

    /// Start a single-writer coverage worker for this model.
    pub fn coverage_worker(&self, callback: Option<UpdateCallback>) -> anyhow::Result<CoverageWorker> {
        CoverageWorker::spawn(self.new_coverage(), callback)
    }

    /// Push the wireframe and accuracy-colored visible points of `subset`.
    pub fn publish(
        &self,
        sink: &mut dyn VisualizationSink,
        subset: &VisibleSubset,
        range: Option<&AccuracyRange>,
    ) -> Result<(), CullingError> {
        let frustum = self.frustum(&subset.pose)?;
        publish_pose(sink, &frustum, subset, self.accuracy.as_ref(), range);
        Ok(())
    }
}
