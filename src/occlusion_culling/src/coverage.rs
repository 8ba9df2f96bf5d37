//! Campaign-scoped coverage accumulation.
//!
//! [`CoverageState`] holds the tolerance-deduplicated union of every visible
//! subset folded so far. It starts [`CoveragePhase::Empty`] and moves to
//! [`CoveragePhase::Accumulating`] on the first fold; there is no terminal
//! phase.
//!
//! Folding is order-sensitive only for "newly covered" reporting. The final
//! covered set and ratio do not depend on fold order.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::accuracy::{AccuracyRange, AccuracyReport};
use crate::culling::VisibleSubset;
use crate::error::CullingError;
use crate::set_ops::{PointBuckets, Tolerance};
use crate::voxel_grid::{OccupancyQuery, VoxelCoord, VoxelGrid};

/// Coverage accumulation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Point-equality tolerance for deduplication (m).
    pub tolerance: f32,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            tolerance: crate::set_ops::DEFAULT_TOLERANCE,
        }
    }
}

impl CoverageConfig {
    pub fn tolerance(&self) -> Result<Tolerance, CullingError> {
        Tolerance::new(self.tolerance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoveragePhase {
    /// No pose folded yet.
    Empty,
    Accumulating,
}

/// Result of folding one visible subset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FoldReport {
    /// Model indices of the subset's points that were not covered before.
    pub newly_covered: Vec<usize>,
    /// Positions of those points.
    pub newly_covered_points: Vec<[f32; 3]>,
    /// Covered point count after the fold.
    pub covered: usize,
    /// Coverage ratio after the fold.
    pub ratio: f64,
}

#[derive(Debug, Clone)]
pub struct CoverageState {
    model_size: usize,
    covered: PointBuckets,
    covered_points: Vec<[f32; 3]>,
    poses_folded: usize,
    accuracy: AccuracyRange,
}

impl CoverageState {
    /// Fresh state for a model with `model_size` coverable points.
    pub fn new(model_size: usize, tolerance: Tolerance) -> Self {
        Self {
            model_size,
            covered: PointBuckets::new(tolerance),
            covered_points: Vec::new(),
            poses_folded: 0,
            accuracy: AccuracyRange::empty(),
        }
    }

    /// Fresh state sized to the grid's finite model points.
    pub fn for_grid(grid: &VoxelGrid, tolerance: Tolerance) -> Self {
        Self::new(grid.point_count(), tolerance)
    }

    pub fn phase(&self) -> CoveragePhase {
        if self.poses_folded == 0 {
            CoveragePhase::Empty
        } else {
            CoveragePhase::Accumulating
        }
    }

    pub fn model_size(&self) -> usize {
        self.model_size
    }

    pub fn tolerance(&self) -> Tolerance {
        self.covered.tolerance()
    }

    pub fn covered_count(&self) -> usize {
        self.covered.len()
    }

    /// Covered points in the order they were first observed.
    pub fn covered_points(&self) -> &[[f32; 3]] {
        &self.covered_points
    }

    pub fn poses_folded(&self) -> usize {
        self.poses_folded
    }

    /// `|covered| / |model|`, in [0, 1]. Zero for an empty model.
    pub fn ratio(&self) -> f64 {
        if self.model_size == 0 {
            return 0.0;
        }
        (self.covered.len() as f64 / self.model_size as f64).min(1.0)
    }

    /// True if `point` is already covered (within tolerance).
    pub fn is_covered(&self, point: &[f32; 3]) -> bool {
        self.covered.contains(point)
    }

    /// Campaign min/max of per-pose mean accuracy.
    pub fn accuracy_range(&self) -> &AccuracyRange {
        &self.accuracy
    }

    pub fn record_accuracy(&mut self, report: &AccuracyReport) {
        self.accuracy.observe_report(report);
    }

    /// Merge a pose's visible subset into the covered set.
    pub fn fold(&mut self, subset: &VisibleSubset) -> FoldReport {
        self.fold_points(&subset.indices, &subset.points)
    }

    /// Merge `points` (with their model `indices`, parallel to `points`).
    /// Index reporting falls back to positions within `points` when the two
    /// slices differ in length.
    pub fn fold_points(&mut self, indices: &[usize], points: &[[f32; 3]]) -> FoldReport {
        let mut report = FoldReport::default();
        for (position, p) in points.iter().enumerate() {
            if self.covered.insert(*p) {
                self.covered_points.push(*p);
                let index = if indices.len() == points.len() {
                    indices[position]
                } else {
                    position
                };
                report.newly_covered.push(index);
                report.newly_covered_points.push(*p);
            }
        }
        self.poses_folded += 1;

        report.covered = self.covered.len();
        report.ratio = self.ratio();

        tracing::debug!(
            pose = self.poses_folded,
            observed = points.len(),
            newly_covered = report.newly_covered.len(),
            ratio = report.ratio,
            "coverage folded"
        );
        report
    }

    /// Fraction of the grid's occupied cells containing at least one covered
    /// point. Zero for an empty grid.
    pub fn voxel_coverage(&self, grid: &VoxelGrid) -> f64 {
        if grid.is_empty() {
            return 0.0;
        }
        let cells: HashSet<VoxelCoord> = self
            .covered_points
            .iter()
            .filter_map(|p| grid.coord_of(p))
            .filter(|c| grid.is_occupied(c))
            .collect();
        cells.len() as f64 / grid.len() as f64
    }

    /// Drop all coverage and return to [`CoveragePhase::Empty`].
    pub fn reset(&mut self) {
        *self = Self::new(self.model_size, self.covered.tolerance());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel_grid::VoxelGridConfig;
    use approx::assert_relative_eq;
    use rand::prelude::*;

    const P1: [f32; 3] = [0.0, 0.0, 1.0];
    const P2: [f32; 3] = [1.0, 0.0, 1.0];
    const P3: [f32; 3] = [2.0, 0.0, 1.0];

    fn state(model_size: usize) -> CoverageState {
        CoverageState::new(model_size, Tolerance::default())
    }

    #[test]
    fn test_union_counts_shared_point_once() {
        let mut coverage = state(5);
        assert_eq!(coverage.phase(), CoveragePhase::Empty);
        assert_eq!(coverage.ratio(), 0.0);

        let first = coverage.fold_points(&[0, 1], &[P1, P2]);
        assert_eq!(coverage.phase(), CoveragePhase::Accumulating);
        assert_eq!(first.newly_covered, vec![0, 1]);

        let second = coverage.fold_points(&[1, 2], &[P2, P3]);
        assert_eq!(second.newly_covered, vec![2]);
        assert_eq!(second.newly_covered_points, vec![P3]);
        assert_eq!(second.covered, 3);
        assert_relative_eq!(coverage.ratio(), 3.0 / 5.0);
        assert_eq!(coverage.covered_points(), &[P1, P2, P3]);
        assert_eq!(coverage.poses_folded(), 2);
    }

    #[test]
    fn test_near_duplicates_deduplicated() {
        let mut coverage = state(4);
        coverage.fold_points(&[0], &[P1]);
        let report = coverage.fold_points(&[0], &[[0.0, 0.0, 1.00005]]);
        assert!(report.newly_covered.is_empty());
        assert_eq!(coverage.covered_count(), 1);
    }

    #[test]
    fn test_fold_far_from_origin() {
        let mut coverage = state(2);
        let report = coverage.fold_points(&[0, 1], &[[300000.0, 0.0, 0.0], [300000.5, 0.0, 0.0]]);
        assert_eq!(report.newly_covered, vec![0, 1]);

        let again = coverage.fold_points(&[1], &[[300000.5, 0.0, 0.0]]);
        assert!(again.newly_covered.is_empty());
        assert_relative_eq!(coverage.ratio(), 1.0);
    }

    #[test]
    fn test_empty_fold_still_accumulates() {
        let mut coverage = state(3);
        let report = coverage.fold_points(&[], &[]);
        assert_eq!(coverage.phase(), CoveragePhase::Accumulating);
        assert_eq!(report.ratio, 0.0);
    }

    #[test]
    fn test_empty_model_ratio_is_zero() {
        let mut coverage = state(0);
        coverage.fold_points(&[], &[P1]);
        assert_eq!(coverage.ratio(), 0.0);
    }

    #[test]
    fn test_ratio_monotonic_and_bounded() {
        let mut rng = StdRng::seed_from_u64(11);
        let model: Vec<[f32; 3]> = (0..300)
            .map(|i| [(i % 10) as f32, ((i / 10) % 10) as f32, (i / 100) as f32])
            .collect();

        let mut coverage = state(model.len());
        let mut previous = 0.0;
        for _ in 0..40 {
            let indices: Vec<usize> = (0..model.len()).filter(|_| rng.gen_bool(0.1)).collect();
            let points: Vec<[f32; 3]> = indices.iter().map(|&i| model[i]).collect();
            let report = coverage.fold_points(&indices, &points);
            assert!(report.ratio >= previous);
            assert!((0.0..=1.0).contains(&report.ratio));
            previous = report.ratio;
        }

        // Folding every point again saturates at exactly 1.
        let all: Vec<usize> = (0..model.len()).collect();
        coverage.fold_points(&all, &model);
        assert_relative_eq!(coverage.ratio(), 1.0);
    }

    #[test]
    fn test_ratio_clamped_when_points_exceed_model() {
        let mut coverage = state(2);
        coverage.fold_points(&[0, 1, 2], &[P1, P2, P3]);
        assert_eq!(coverage.ratio(), 1.0);
    }

    #[test]
    fn test_voxel_coverage() {
        let model = vec![[0.1, 0.1, 0.1], [0.2, 0.2, 0.2], [5.5, 0.1, 0.1], [9.9, 0.1, 0.1]];
        let grid = VoxelGrid::from_points(&model, VoxelGridConfig::uniform(1.0)).unwrap();
        assert_eq!(grid.len(), 3);

        let mut coverage = CoverageState::for_grid(&grid, Tolerance::default());
        assert_eq!(coverage.model_size(), 4);
        coverage.fold_points(&[0, 2], &[model[0], model[2]]);
        assert_relative_eq!(coverage.voxel_coverage(&grid), 2.0 / 3.0);

        let empty = VoxelGrid::from_points(&[], VoxelGridConfig::default()).unwrap();
        assert_eq!(coverage.voxel_coverage(&empty), 0.0);
    }

    #[test]
    fn test_accuracy_tracking_and_reset() {
        let mut coverage = state(3);
        coverage.record_accuracy(&AccuracyReport {
            mean_accuracy: 0.7,
            mean_error: 0.001,
            count: 4,
        });
        coverage.record_accuracy(&AccuracyReport {
            mean_accuracy: 0.4,
            mean_error: 0.002,
            count: 2,
        });
        assert_eq!(coverage.accuracy_range().as_tuple(), Some((0.4, 0.7)));

        coverage.fold_points(&[0], &[P1]);
        coverage.reset();
        assert_eq!(coverage.phase(), CoveragePhase::Empty);
        assert_eq!(coverage.covered_count(), 0);
        assert!(coverage.accuracy_range().is_empty());
        assert_eq!(coverage.model_size(), 3);
    }
}
