//! Ray-based occlusion estimation against the model's occupancy grid.
//!
//! For each candidate point a segment is cast from the sensor origin to the
//! point and walked cell by cell. The candidate is occluded as soon as an
//! occupied cell is met strictly before the candidate's own cell.
//!
//! Policies:
//! - A candidate in the same cell as the sensor is visible.
//! - A candidate outside the grid's bounding box is visible: the grid holds
//!   no information that could occlude it.
//! - When the sensor is outside the grid, the walk starts where the segment
//!   enters the grid box; the empty space in front of the box cannot occlude.
//! - An empty grid occludes nothing.
//!
//! The estimator only reads the grid, so candidates are evaluated in
//! parallel.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use crate::cloud::to_point3;
use crate::voxel_grid::{GridBounds, OccupancyQuery, VoxelCoord, VoxelTraversal};

/// Parameter nudge applied past the grid-box entry point so the first cell
/// lookup lands inside the box rather than on its face.
pub const RAY_EPSILON: f64 = 1e-9;

/// Outcome of a single visibility test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// No occupied cell between the sensor and the target cell.
    Visible,
    /// The target shares the sensor's cell.
    SameCell,
    /// The target lies outside the grid; treated as visible.
    OutOfGrid,
    /// An occupied cell blocks the line of sight.
    Occluded { by: VoxelCoord },
}

impl Visibility {
    pub fn is_visible(&self) -> bool {
        !matches!(self, Visibility::Occluded { .. })
    }
}

/// Visibility queries from one sensor origin against one grid.
#[derive(Debug)]
pub struct OcclusionEstimator<'a, G: OccupancyQuery> {
    grid: &'a G,
    origin: Point3<f64>,
}

impl<'a, G: OccupancyQuery + Sync> OcclusionEstimator<'a, G> {
    /// `origin` is the sensor position in the grid's frame.
    pub fn new(grid: &'a G, origin: Point3<f64>) -> Self {
        Self { grid, origin }
    }

    pub fn origin(&self) -> Point3<f64> {
        self.origin
    }

    /// Classify the line of sight from the sensor to `target`.
    pub fn visibility(&self, target: &Point3<f64>) -> Visibility {
        let Some(bounds) = self.grid.bounds() else {
            return Visibility::OutOfGrid;
        };
        let leaf = self.grid.leaf_size();

        let target_f32 = [target.x as f32, target.y as f32, target.z as f32];
        let target_cell = VoxelCoord::from_point(&target_f32, &bounds.min, &leaf);
        if !bounds.contains_coord(&target_cell) {
            return Visibility::OutOfGrid;
        }

        let origin_f32 = [self.origin.x as f32, self.origin.y as f32, self.origin.z as f32];
        let origin_cell = VoxelCoord::from_point(&origin_f32, &bounds.min, &leaf);
        if origin_cell == target_cell {
            return Visibility::SameCell;
        }

        let (lo, hi) = bounds.cell_extent(&leaf);
        let dir = target - self.origin;
        let (t_start, start_cell) = if bounds.contains_coord(&origin_cell) {
            (0.0, origin_cell)
        } else {
            match segment_box_entry(&self.origin, &dir, &lo, &hi) {
                Some(t_enter) => {
                    let t = (t_enter + RAY_EPSILON).min(1.0);
                    let p = self.origin + dir * t;
                    let cell = VoxelCoord::from_point(
                        &[p.x as f32, p.y as f32, p.z as f32],
                        &bounds.min,
                        &leaf,
                    );
                    (t, clamp_to_bounds(cell, bounds))
                }
                // The target is inside the box, so this only happens through
                // rounding at the box faces.
                None => return Visibility::Visible,
            }
        };

        let traversal = VoxelTraversal::new(
            &self.origin,
            target,
            start_cell,
            t_start,
            1.0,
            &bounds.min,
            &leaf,
        );

        for (cell, _) in traversal {
            if cell == target_cell {
                return Visibility::Visible;
            }
            if !bounds.contains_coord(&cell) {
                break;
            }
            if self.grid.is_occupied(&cell) {
                tracing::trace!(?cell, ?target_cell, "line of sight blocked");
                return Visibility::Occluded { by: cell };
            }
        }

        // Walk ended without reaching the target cell (rounding at a cell
        // face right next to the target).
        Visibility::Visible
    }

    pub fn is_visible(&self, target: &Point3<f64>) -> bool {
        self.visibility(target).is_visible()
    }

    /// Subset of `candidates` (indices into `points`) that are visible,
    /// preserving candidate order.
    pub fn filter_visible(&self, points: &[[f32; 3]], candidates: &[usize]) -> Vec<usize> {
        candidates
            .par_iter()
            .copied()
            .filter(|&i| {
                points
                    .get(i)
                    .is_some_and(|p| self.is_visible(&to_point3(p)))
            })
            .collect()
    }

    /// Classify every candidate, preserving candidate order.
    pub fn classify(&self, points: &[[f32; 3]], candidates: &[usize]) -> Vec<(usize, Visibility)> {
        candidates
            .par_iter()
            .filter_map(|&i| points.get(i).map(|p| (i, self.visibility(&to_point3(p)))))
            .collect()
    }
}

/// Parameter at which the segment `origin + t * dir`, `t ∈ [0, 1]`, enters the
/// box `[lo, hi]` (slab test). `None` if the segment misses the box.
pub fn segment_box_entry(
    origin: &Point3<f64>,
    dir: &Vector3<f64>,
    lo: &Point3<f64>,
    hi: &Point3<f64>,
) -> Option<f64> {
    let mut t_near = 0.0f64;
    let mut t_far = 1.0f64;

    for axis in 0..3 {
        let o = origin[axis];
        let d = dir[axis];
        if d.abs() <= f64::EPSILON {
            if o < lo[axis] || o > hi[axis] {
                return None;
            }
            continue;
        }
        let mut t0 = (lo[axis] - o) / d;
        let mut t1 = (hi[axis] - o) / d;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_near = t_near.max(t0);
        t_far = t_far.min(t1);
        if t_near > t_far {
            return None;
        }
    }

    Some(t_near)
}

fn clamp_to_bounds(cell: VoxelCoord, bounds: &GridBounds) -> VoxelCoord {
    let c = cell.as_array();
    let mut out = [0i32; 3];
    for axis in 0..3 {
        let max = bounds.divisions[axis] as i32 - 1;
        out[axis] = c[axis].clamp(0, max);
    }
    VoxelCoord::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel_grid::{VoxelGrid, VoxelGridConfig};

    fn grid(points: &[[f32; 3]], leaf: f32) -> VoxelGrid {
        VoxelGrid::from_points(points, VoxelGridConfig::uniform(leaf)).unwrap()
    }

    #[test]
    fn test_occluder_blocks_far_point() {
        let model = vec![[0.0, 0.0, 5.0], [0.0, 0.0, 10.0]];
        let grid = grid(&model, 1.0);
        let estimator = OcclusionEstimator::new(&grid, Point3::origin());

        assert!(estimator.is_visible(&Point3::new(0.0, 0.0, 5.0)));
        assert_eq!(
            estimator.visibility(&Point3::new(0.0, 0.0, 10.0)),
            Visibility::Occluded {
                by: VoxelCoord::new(0, 0, 0)
            }
        );
    }

    #[test]
    fn test_without_occluder_far_point_visible() {
        // Same lattice as above with the near cell left empty.
        let occupancy = vec![[0.0, 0.0, 5.0], [0.0, 0.0, 10.0]];
        let with_occluder = grid(&occupancy, 1.0);
        let without_occluder = grid(&occupancy[1..], 1.0);

        let target = Point3::new(0.0, 0.0, 10.0);
        assert!(!OcclusionEstimator::new(&with_occluder, Point3::origin()).is_visible(&target));
        assert!(OcclusionEstimator::new(&without_occluder, Point3::origin()).is_visible(&target));
    }

    #[test]
    fn test_same_cell_is_visible() {
        let model = vec![[0.1, 0.1, 0.1], [0.9, 0.9, 0.9], [3.0, 3.0, 3.0]];
        let grid = grid(&model, 1.0);
        let estimator = OcclusionEstimator::new(&grid, Point3::new(0.5, 0.5, 0.5));
        assert_eq!(
            estimator.visibility(&Point3::new(0.9, 0.9, 0.9)),
            Visibility::SameCell
        );
    }

    #[test]
    fn test_sensor_cell_occupied_blocks() {
        // Sensor sits in an occupied cell; everything further out is behind it.
        let model = vec![[0.0, 0.0, 0.0], [0.0, 0.0, 4.0]];
        let grid = grid(&model, 1.0);
        let estimator = OcclusionEstimator::new(&grid, Point3::new(0.5, 0.5, 0.5));
        assert!(!estimator.is_visible(&Point3::new(0.0, 0.0, 4.0)));
    }

    #[test]
    fn test_out_of_grid_target_is_visible() {
        let model = vec![[0.0, 0.0, 5.0], [1.0, 1.0, 6.0]];
        let grid = grid(&model, 1.0);
        let estimator = OcclusionEstimator::new(&grid, Point3::origin());
        assert_eq!(
            estimator.visibility(&Point3::new(0.0, 0.0, 50.0)),
            Visibility::OutOfGrid
        );
    }

    #[test]
    fn test_empty_grid_occludes_nothing() {
        let grid = grid(&[], 1.0);
        let estimator = OcclusionEstimator::new(&grid, Point3::origin());
        assert!(estimator.is_visible(&Point3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn test_wall_occludes_points_behind() {
        // A 5 x 5 m wall at z = 3 and a target plane at z = 8 behind it.
        let mut model = Vec::new();
        for i in 0..=10 {
            for j in 0..=10 {
                let x = -2.5 + i as f32 * 0.5;
                let y = -2.5 + j as f32 * 0.5;
                model.push([x, y, 3.0]);
                model.push([x, y, 8.0]);
            }
        }
        let grid = grid(&model, 0.5);
        let estimator = OcclusionEstimator::new(&grid, Point3::new(0.0, 0.0, 0.0));

        let all: Vec<usize> = (0..model.len()).collect();
        let visible = estimator.filter_visible(&model, &all);

        // Every wall point is visible; central back-plane points are hidden.
        for (i, p) in model.iter().enumerate() {
            if p[2] == 3.0 {
                assert!(visible.contains(&i), "wall point {p:?} should be visible");
            } else if p[0].abs() < 1.0 && p[1].abs() < 1.0 {
                assert!(!visible.contains(&i), "back point {p:?} should be hidden");
            }
        }
    }

    #[test]
    fn test_sensor_inside_grid_lateral_ray() {
        // Sensor in a free cell inside the box; an occupied cell between it
        // and the far target.
        let model = vec![[0.0, 0.0, 0.0], [2.5, 1.5, 0.5], [4.5, 1.5, 0.5]];
        let grid = grid(&model, 1.0);
        let estimator = OcclusionEstimator::new(&grid, Point3::new(0.5, 1.5, 0.5));
        assert!(estimator.is_visible(&Point3::new(2.5, 1.5, 0.5)));
        assert_eq!(
            estimator.visibility(&Point3::new(4.5, 1.5, 0.5)),
            Visibility::Occluded {
                by: VoxelCoord::new(2, 1, 0)
            }
        );
    }

    #[test]
    fn test_filter_visible_preserves_order() {
        let model = vec![[0.0, 0.0, 5.0], [0.0, 0.0, 10.0], [0.0, 0.0, 6.0]];
        let grid = grid(&model, 1.0);
        let estimator = OcclusionEstimator::new(&grid, Point3::origin());
        let visible = estimator.filter_visible(&model, &[2, 1, 0]);
        assert_eq!(visible, vec![0]);

        let classes = estimator.classify(&model, &[0, 1]);
        assert_eq!(classes[0], (0, Visibility::Visible));
        assert!(!classes[1].1.is_visible());
    }

    #[test]
    fn test_segment_box_entry() {
        let lo = Point3::new(0.0, 0.0, 5.0);
        let hi = Point3::new(1.0, 1.0, 11.0);

        let t = segment_box_entry(&Point3::new(0.5, 0.5, 0.0), &Vector3::new(0.0, 0.0, 10.0), &lo, &hi);
        approx::assert_relative_eq!(t.unwrap(), 0.5);

        // Parallel to z but outside the x slab.
        let t = segment_box_entry(&Point3::new(2.0, 0.5, 0.0), &Vector3::new(0.0, 0.0, 10.0), &lo, &hi);
        assert!(t.is_none());

        // Stops short of the box.
        let t = segment_box_entry(&Point3::new(0.5, 0.5, 0.0), &Vector3::new(0.0, 0.0, 4.0), &lo, &hi);
        assert!(t.is_none());

        // Starts inside.
        let t = segment_box_entry(&Point3::new(0.5, 0.5, 6.0), &Vector3::new(0.0, 0.0, 1.0), &lo, &hi);
        assert_eq!(t, Some(0.0));
    }
}
