//! CPU construction of the sparse occupancy grid.
//!
//! Construction runs in two phases. The bounding box is a parallel
//! reduction over all finite points; cell keys are then computed in
//! parallel and folded into a hash map sequentially so that every cell's
//! index list stays in ascending order.

use std::collections::HashMap;

use rayon::prelude::*;

use super::types::{GridBounds, VoxelCoord};
use crate::cloud::is_finite;

/// Axis-aligned bounds accumulated during the reduction.
#[derive(Debug, Clone, Copy)]
struct BoundsAccumulator {
    min: [f32; 3],
    max: [f32; 3],
    count: usize,
}

impl BoundsAccumulator {
    fn empty() -> Self {
        Self {
            min: [f32::MAX; 3],
            max: [f32::MIN; 3],
            count: 0,
        }
    }

    fn add_point(mut self, p: &[f32; 3]) -> Self {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(p[axis]);
            self.max[axis] = self.max[axis].max(p[axis]);
        }
        self.count += 1;
        self
    }

    fn merge(mut self, other: Self) -> Self {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(other.min[axis]);
            self.max[axis] = self.max[axis].max(other.max[axis]);
        }
        self.count += other.count;
        self
    }
}

/// Bounding box over the finite points of `points`.
///
/// Returns `None` when no point is finite.
pub fn compute_point_bounds(points: &[[f32; 3]]) -> Option<([f32; 3], [f32; 3])> {
    let acc = points
        .par_iter()
        .filter(|p| is_finite(p))
        .fold(BoundsAccumulator::empty, |acc, p| acc.add_point(p))
        .reduce(BoundsAccumulator::empty, BoundsAccumulator::merge);

    if acc.count == 0 {
        None
    } else {
        Some((acc.min, acc.max))
    }
}

/// Assign every finite point to its cell.
///
/// # Returns
/// The cell map (cell -> ascending point indices), the grid bounds, and the
/// number of non-finite points that were skipped. Bounds are `None` when the
/// cloud has no finite point.
pub fn build_occupancy_cpu(
    points: &[[f32; 3]],
    leaf_size: &[f32; 3],
) -> (HashMap<VoxelCoord, Vec<usize>>, Option<GridBounds>, usize) {
    let Some((min, max)) = compute_point_bounds(points) else {
        return (HashMap::new(), None, points.len());
    };
    let bounds = GridBounds::new(min, max, leaf_size);

    // Phase 1: cell keys (parallel)
    let keys: Vec<Option<VoxelCoord>> = points
        .par_iter()
        .map(|p| is_finite(p).then(|| VoxelCoord::from_point(p, &min, leaf_size)))
        .collect();

    // Phase 2: group indices by cell
    let mut cells: HashMap<VoxelCoord, Vec<usize>> = HashMap::new();
    let mut dropped = 0;
    for (index, key) in keys.into_iter().enumerate() {
        match key {
            Some(coord) => cells.entry(coord).or_default().push(index),
            None => dropped += 1,
        }
    }

    (cells, Some(bounds), dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate_clustered_points(center: [f32; 3], spread: f32, count: usize) -> Vec<[f32; 3]> {
        use rand::prelude::*;
        use rand_distr::Normal;

        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let dist = Normal::new(0.0, spread as f64).unwrap();

        (0..count)
            .map(|_| {
                [
                    center[0] + dist.sample(&mut rng) as f32,
                    center[1] + dist.sample(&mut rng) as f32,
                    center[2] + dist.sample(&mut rng) as f32,
                ]
            })
            .collect()
    }

    #[test]
    fn test_compute_point_bounds() {
        let points = vec![[-2.0, 1.0, 0.0], [3.0, -1.0, 2.0], [0.0, 0.0, 1.0]];
        let (min, max) = compute_point_bounds(&points).unwrap();
        assert_eq!(min, [-2.0, -1.0, 0.0]);
        assert_eq!(max, [3.0, 1.0, 2.0]);
    }

    #[test]
    fn test_compute_point_bounds_ignores_non_finite() {
        let points = vec![[f32::NAN, 0.0, 0.0], [1.0, 1.0, 1.0], [f32::INFINITY, 5.0, 5.0]];
        let (min, max) = compute_point_bounds(&points).unwrap();
        assert_eq!(min, [1.0, 1.0, 1.0]);
        assert_eq!(max, [1.0, 1.0, 1.0]);

        assert!(compute_point_bounds(&[[f32::NAN; 3]]).is_none());
        assert!(compute_point_bounds(&[]).is_none());
    }

    #[test]
    fn test_build_single_cluster() {
        let points = generate_clustered_points([5.0, 5.0, 5.0], 0.05, 20);
        let (cells, bounds, dropped) = build_occupancy_cpu(&points, &[10.0, 10.0, 10.0]);

        assert_eq!(dropped, 0);
        assert_eq!(cells.len(), 1);
        assert_eq!(bounds.unwrap().divisions, [2, 2, 2]);
        let members = &cells[&VoxelCoord::new(0, 0, 0)];
        assert_eq!(members.len(), 20);
    }

    #[test]
    fn test_build_multiple_clusters() {
        let mut points = Vec::new();
        points.extend(generate_clustered_points([1.0, 1.0, 1.0], 0.1, 10));
        points.extend(generate_clustered_points([11.0, 1.0, 1.0], 0.1, 10));
        points.extend(generate_clustered_points([1.0, 11.0, 1.0], 0.1, 10));

        let (cells, _, _) = build_occupancy_cpu(&points, &[2.0, 2.0, 2.0]);
        assert_eq!(cells.len(), 3, "Expected 3 cells but got {}", cells.len());

        let total: usize = cells.values().map(Vec::len).sum();
        assert_eq!(total, points.len());
    }

    #[test]
    fn test_indices_ascending_within_cell() {
        let points = vec![[0.1, 0.1, 0.1], [5.0, 5.0, 5.0], [0.2, 0.2, 0.2], [0.3, 0.1, 0.2]];
        let (cells, _, _) = build_occupancy_cpu(&points, &[1.0, 1.0, 1.0]);
        assert_eq!(cells[&VoxelCoord::new(0, 0, 0)], vec![0, 2, 3]);
    }

    #[test]
    fn test_non_finite_points_dropped() {
        let points = vec![[0.0, 0.0, 0.0], [f32::NAN, 1.0, 1.0], [1.0, 1.0, 1.0]];
        let (cells, bounds, dropped) = build_occupancy_cpu(&points, &[1.0, 1.0, 1.0]);
        assert_eq!(dropped, 1);
        assert_eq!(cells.len(), 2);
        assert_eq!(bounds.unwrap().divisions, [2, 2, 2]);
    }

    #[test]
    fn test_empty_point_cloud() {
        let (cells, bounds, dropped) = build_occupancy_cpu(&[], &[1.0, 1.0, 1.0]);
        assert!(cells.is_empty());
        assert!(bounds.is_none());
        assert_eq!(dropped, 0);
    }
}
