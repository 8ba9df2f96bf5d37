//! Sparse voxel occupancy grid over the model.
//!
//! The grid is anchored at the minimum corner of the model's bounding box.
//! Every finite point is assigned to cell `floor((p - min) / leaf)` and the
//! grid stores, per occupied cell, the indices of its points. Cells are kept
//! in a hash map keyed by integer coordinates rather than a dense array, so
//! memory scales with the number of occupied cells, not the box volume.
//!
//! The grid is read-only once built and can be shared across threads.
//! Consumers query it through the [`OccupancyQuery`] trait.

pub mod cpu;
pub mod traversal;
pub mod types;

pub use traversal::VoxelTraversal;
pub use types::{CellState, GridBounds, VoxelCoord, VoxelGridConfig};

use std::collections::HashMap;

use nalgebra::Point3;

use crate::cloud::PointCloud;
use crate::error::{CullingError, CullingWarning};
use crate::voxel_grid::cpu::build_occupancy_cpu;

/// Occupancy queries over a bounded grid.
///
/// This is the only capability the occlusion estimator needs from a spatial
/// index: where the lattice is, how big its cells are, and whether a cell is
/// occupied.
pub trait OccupancyQuery {
    /// Bounds of the grid, or `None` for an empty grid.
    fn bounds(&self) -> Option<&GridBounds>;

    /// Cell size per axis.
    fn leaf_size(&self) -> [f32; 3];

    /// True if the cell holds at least one model point.
    fn is_occupied(&self, coord: &VoxelCoord) -> bool;

    /// Cell containing `point` (may lie outside the bounds).
    ///
    /// Returns `None` for an empty grid, where no lattice is defined.
    fn coord_of(&self, point: &[f32; 3]) -> Option<VoxelCoord> {
        let bounds = self.bounds()?;
        Some(VoxelCoord::from_point(point, &bounds.min, &self.leaf_size()))
    }

    /// Occupancy state of `coord`, distinguishing out-of-bounds lookups.
    fn cell_state(&self, coord: &VoxelCoord) -> CellState {
        match self.bounds() {
            Some(bounds) if bounds.contains_coord(coord) => {
                if self.is_occupied(coord) {
                    CellState::Occupied
                } else {
                    CellState::Free
                }
            }
            _ => CellState::OutOfBounds,
        }
    }
}

/// Sparse occupancy grid built from a point cloud.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    config: VoxelGridConfig,
    cells: HashMap<VoxelCoord, Vec<usize>>,
    bounds: Option<GridBounds>,
    point_count: usize,
    warnings: Vec<CullingWarning>,
}

impl VoxelGrid {
    /// Build a grid from raw positions.
    ///
    /// Fails with [`CullingError::DegenerateGrid`] when the leaf size is not
    /// strictly positive and finite on every axis. An empty cloud yields an
    /// empty grid (no bounds, no occupied cells) plus an
    /// [`CullingWarning::EmptyModel`] warning.
    pub fn from_points(points: &[[f32; 3]], config: VoxelGridConfig) -> Result<Self, CullingError> {
        config.validate()?;

        let (cells, bounds, dropped) = build_occupancy_cpu(points, &config.leaf_size);

        let mut warnings = Vec::new();
        if dropped > 0 && bounds.is_some() {
            tracing::warn!("{dropped} non-finite points excluded from the voxel grid");
            warnings.push(CullingWarning::NonFinitePoints { dropped });
        }
        if bounds.is_none() {
            tracing::warn!(
                "voxel grid built from a model with no finite points ({} input points)",
                points.len()
            );
            warnings.push(CullingWarning::EmptyModel);
        }

        let point_count = points.len() - dropped;
        if let Some(b) = &bounds {
            tracing::debug!(
                occupied = cells.len(),
                points = point_count,
                divisions = ?b.divisions,
                "voxel grid built"
            );
        }

        Ok(Self {
            config,
            cells,
            bounds,
            point_count,
            warnings,
        })
    }

    /// Build a grid over a [`PointCloud`].
    pub fn from_cloud(cloud: &PointCloud, config: VoxelGridConfig) -> Result<Self, CullingError> {
        Self::from_points(cloud.points(), config)
    }

    /// Number of occupied cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True if no cell is occupied. An empty grid occludes nothing.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of points that were assigned to cells.
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn config(&self) -> &VoxelGridConfig {
        &self.config
    }

    /// Non-fatal conditions found while building.
    pub fn warnings(&self) -> &[CullingWarning] {
        &self.warnings
    }

    /// Grid dimensions, `None` for an empty grid.
    pub fn divisions(&self) -> Option<[u32; 3]> {
        self.bounds.map(|b| b.divisions)
    }

    /// Indices of the points in `coord` (empty if the cell is free).
    pub fn points_in(&self, coord: &VoxelCoord) -> &[usize] {
        self.cells.get(coord).map(Vec::as_slice).unwrap_or(&[])
    }

    /// World-space centre of a cell.
    pub fn cell_center(&self, coord: &VoxelCoord) -> Option<Point3<f64>> {
        let bounds = self.bounds.as_ref()?;
        let leaf = self.config.leaf_size;
        let c = coord.as_array();
        Some(Point3::new(
            bounds.min[0] as f64 + (c[0] as f64 + 0.5) * leaf[0] as f64,
            bounds.min[1] as f64 + (c[1] as f64 + 0.5) * leaf[1] as f64,
            bounds.min[2] as f64 + (c[2] as f64 + 0.5) * leaf[2] as f64,
        ))
    }

    /// World-space extent covered by the grid's cells.
    pub fn extent(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        self.bounds
            .as_ref()
            .map(|b| b.cell_extent(&self.config.leaf_size))
    }

    /// Iterate over occupied cells and their point indices.
    pub fn iter(&self) -> impl Iterator<Item = (&VoxelCoord, &[usize])> {
        self.cells.iter().map(|(c, v)| (c, v.as_slice()))
    }
}

impl OccupancyQuery for VoxelGrid {
    fn bounds(&self) -> Option<&GridBounds> {
        self.bounds.as_ref()
    }

    fn leaf_size(&self) -> [f32; 3] {
        self.config.leaf_size
    }

    fn is_occupied(&self, coord: &VoxelCoord) -> bool {
        self.cells.contains_key(coord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn generate_test_points() -> Vec<[f32; 3]> {
        use rand::prelude::*;
        use rand_distr::Normal;

        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let dist = Normal::<f64>::new(0.0, 0.1).unwrap();

        // Anchor point at the origin fixes the grid minimum near (0, 0, 0);
        // cluster centres sit mid-cell for leaf 2.0.
        let centers = [[1.0, 1.0, 1.0], [11.0, 1.0, 1.0], [1.0, 11.0, 1.0]];
        let mut points = vec![[0.0, 0.0, 0.0]];

        for center in &centers {
            for _ in 0..50 {
                points.push([
                    center[0] + dist.sample(&mut rng).clamp(-0.5, 0.5) as f32,
                    center[1] + dist.sample(&mut rng).clamp(-0.5, 0.5) as f32,
                    center[2] + dist.sample(&mut rng).clamp(-0.5, 0.5) as f32,
                ]);
            }
        }

        points
    }

    #[test]
    fn test_voxel_grid_from_points() {
        let points = generate_test_points();
        let grid = VoxelGrid::from_points(&points, VoxelGridConfig::uniform(2.0)).unwrap();

        assert_eq!(grid.len(), 3, "Expected 3 cells but got {}", grid.len());
        assert_eq!(grid.point_count(), points.len());
        assert!(grid.warnings().is_empty());
    }

    #[test]
    fn test_degenerate_leaf_size() {
        let points = generate_test_points();
        for leaf in [[0.0, 1.0, 1.0], [1.0, -0.5, 1.0], [1.0, 1.0, f32::INFINITY]] {
            let result = VoxelGrid::from_points(&points, VoxelGridConfig { leaf_size: leaf });
            assert!(matches!(result, Err(CullingError::DegenerateGrid { .. })));
        }
    }

    #[test]
    fn test_empty_voxel_grid() {
        let grid = VoxelGrid::from_points(&[], VoxelGridConfig::uniform(1.0)).unwrap();

        assert!(grid.is_empty());
        assert_eq!(grid.len(), 0);
        assert!(grid.bounds().is_none());
        assert!(grid.divisions().is_none());
        assert_eq!(grid.warnings(), &[CullingWarning::EmptyModel]);
        assert_eq!(grid.coord_of(&[0.0, 0.0, 0.0]), None);
        assert_eq!(
            grid.cell_state(&VoxelCoord::new(0, 0, 0)),
            CellState::OutOfBounds
        );
    }

    #[test]
    fn test_non_finite_warning() {
        let points = vec![[0.0, 0.0, 0.0], [f32::NAN, 0.0, 0.0]];
        let grid = VoxelGrid::from_points(&points, VoxelGridConfig::uniform(1.0)).unwrap();
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.point_count(), 1);
        assert_eq!(
            grid.warnings(),
            &[CullingWarning::NonFinitePoints { dropped: 1 }]
        );
    }

    #[test]
    fn test_cell_states() {
        let points = vec![[0.0, 0.0, 5.0], [0.0, 0.0, 10.0]];
        let grid = VoxelGrid::from_points(&points, VoxelGridConfig::uniform(1.0)).unwrap();

        assert_eq!(grid.divisions(), Some([1, 1, 6]));
        assert_eq!(grid.cell_state(&VoxelCoord::new(0, 0, 0)), CellState::Occupied);
        assert_eq!(grid.cell_state(&VoxelCoord::new(0, 0, 5)), CellState::Occupied);
        assert_eq!(grid.cell_state(&VoxelCoord::new(0, 0, 3)), CellState::Free);
        assert_eq!(
            grid.cell_state(&VoxelCoord::new(0, 0, 6)),
            CellState::OutOfBounds
        );
        assert_eq!(
            grid.cell_state(&VoxelCoord::new(-1, 0, 0)),
            CellState::OutOfBounds
        );
    }

    #[test]
    fn test_points_in_and_coord_of() {
        let points = vec![[0.0, 0.0, 0.0], [0.4, 0.4, 0.4], [3.0, 0.0, 0.0]];
        let grid = VoxelGrid::from_points(&points, VoxelGridConfig::uniform(1.0)).unwrap();

        let coord = grid.coord_of(&[0.2, 0.1, 0.3]).unwrap();
        assert_eq!(coord, VoxelCoord::new(0, 0, 0));
        assert_eq!(grid.points_in(&coord), &[0, 1]);
        assert_eq!(grid.points_in(&VoxelCoord::new(3, 0, 0)), &[2]);
        assert!(grid.points_in(&VoxelCoord::new(1, 0, 0)).is_empty());
    }

    #[test]
    fn test_cell_center_and_extent() {
        let points = vec![[1.0, 2.0, 3.0], [2.0, 2.0, 3.0]];
        let grid = VoxelGrid::from_points(&points, VoxelGridConfig::uniform(0.5)).unwrap();

        let center = grid.cell_center(&VoxelCoord::new(2, 0, 0)).unwrap();
        assert_relative_eq!(center.x, 2.25);
        assert_relative_eq!(center.y, 2.25);
        assert_relative_eq!(center.z, 3.25);

        let (lo, hi) = grid.extent().unwrap();
        assert_relative_eq!(lo.x, 1.0);
        assert_relative_eq!(hi.x, 2.5);
        assert_relative_eq!(hi.y, 2.5);
    }

    #[test]
    fn test_every_point_lands_in_bounds() {
        let points = generate_test_points();
        let grid = VoxelGrid::from_points(&points, VoxelGridConfig::uniform(0.3)).unwrap();
        let bounds = *grid.bounds().unwrap();

        for (i, p) in points.iter().enumerate() {
            let coord = grid.coord_of(p).unwrap();
            assert!(bounds.contains_coord(&coord));
            assert!(grid.points_in(&coord).contains(&i));
        }
    }
}
