//! Type definitions for voxel grid structures.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::error::CullingError;

/// Configuration for voxel grid construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxelGridConfig {
    /// Leaf (cell) size per axis in meters. Must be finite and > 0 on every axis.
    pub leaf_size: [f32; 3],
}

impl Default for VoxelGridConfig {
    fn default() -> Self {
        Self {
            leaf_size: [0.5, 0.5, 0.5],
        }
    }
}

impl VoxelGridConfig {
    /// Cubic cells of side `leaf`.
    pub fn uniform(leaf: f32) -> Self {
        Self {
            leaf_size: [leaf, leaf, leaf],
        }
    }

    pub fn validate(&self) -> Result<(), CullingError> {
        if self.leaf_size.iter().all(|l| l.is_finite() && *l > 0.0) {
            Ok(())
        } else {
            Err(CullingError::DegenerateGrid {
                leaf_size: self.leaf_size,
            })
        }
    }
}

/// Integer cell coordinates `(i, j, k)` relative to the grid's minimum corner.
///
/// Coordinates of points outside the bounding box are still representable
/// (they may be negative or beyond the divisions); use
/// [`GridBounds::contains_coord`] to test membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoxelCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl VoxelCoord {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Cell containing `point` for a grid anchored at `origin`:
    /// `floor((coord - origin) / leaf)` per axis.
    pub fn from_point(point: &[f32; 3], origin: &[f32; 3], leaf_size: &[f32; 3]) -> Self {
        Self {
            x: ((point[0] - origin[0]) / leaf_size[0]).floor() as i32,
            y: ((point[1] - origin[1]) / leaf_size[1]).floor() as i32,
            z: ((point[2] - origin[2]) / leaf_size[2]).floor() as i32,
        }
    }

    pub fn as_array(&self) -> [i32; 3] {
        [self.x, self.y, self.z]
    }

    /// Offset by `(dx, dy, dz)`, saturating at the i32 extremes.
    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.z.saturating_add(dz),
        )
    }
}

impl From<[i32; 3]> for VoxelCoord {
    fn from(c: [i32; 3]) -> Self {
        Self::new(c[0], c[1], c[2])
    }
}

/// Bounding box of the points a grid was built from, with the derived
/// number of divisions per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridBounds {
    /// Minimum corner of the point bounding box.
    pub min: [f32; 3],
    /// Maximum corner of the point bounding box.
    pub max: [f32; 3],
    /// `ceil((max - min) / leaf) + 1` per axis.
    pub divisions: [u32; 3],
}

impl GridBounds {
    /// Derive divisions for the box `[min, max]` at `leaf_size`.
    pub fn new(min: [f32; 3], max: [f32; 3], leaf_size: &[f32; 3]) -> Self {
        let mut divisions = [1u32; 3];
        for axis in 0..3 {
            let span = ((max[axis] - min[axis]) / leaf_size[axis]).ceil();
            divisions[axis] = span.max(0.0) as u32 + 1;
        }
        Self {
            min,
            max,
            divisions,
        }
    }

    /// True when `coord` addresses a cell inside the grid.
    pub fn contains_coord(&self, coord: &VoxelCoord) -> bool {
        let c = coord.as_array();
        (0..3).all(|axis| c[axis] >= 0 && (c[axis] as i64) < self.divisions[axis] as i64)
    }

    /// World-space extent covered by the cells: `[min, min + divisions * leaf]`.
    pub fn cell_extent(&self, leaf_size: &[f32; 3]) -> (Point3<f64>, Point3<f64>) {
        let lo = Point3::new(self.min[0] as f64, self.min[1] as f64, self.min[2] as f64);
        let hi = Point3::new(
            lo.x + self.divisions[0] as f64 * leaf_size[0] as f64,
            lo.y + self.divisions[1] as f64 * leaf_size[1] as f64,
            lo.z + self.divisions[2] as f64 * leaf_size[2] as f64,
        );
        (lo, hi)
    }

    /// Total number of addressable cells.
    pub fn cell_count(&self) -> u64 {
        self.divisions.iter().map(|&d| d as u64).product()
    }
}

/// Occupancy state of a single cell lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    /// At least one model point lies in the cell.
    Occupied,
    /// Inside the grid but empty.
    Free,
    /// Outside the grid's bounding box (or the grid is empty).
    OutOfBounds,
}
