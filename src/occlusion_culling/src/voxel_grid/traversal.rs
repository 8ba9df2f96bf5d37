//! Incremental voxel traversal along a line segment (3-D DDA).
//!
//! The segment is parameterized as `origin + t * (end - origin)` with
//! `t ∈ [0, 1]`. For each axis the traversal keeps the parameter of the next
//! cell boundary (`t_max`) and the parameter span of one cell (`t_delta`);
//! each step advances along the axis with the smallest `t_max`. Cells are
//! yielded in strictly increasing order of entry parameter.
//!
//! When the segment crosses two or three boundaries at the same parameter
//! (within [`TIE_EPSILON`]) all of those axes advance in a single step, so a
//! segment through a cell edge or corner moves diagonally instead of
//! visiting a cell it only touches.

use nalgebra::{Point3, Vector3};

use super::types::VoxelCoord;

/// Parameter tolerance for treating boundary crossings as simultaneous.
pub const TIE_EPSILON: f64 = 1e-9;

/// Iterator over the cells a segment passes through.
///
/// Yields `(cell, t_enter)` where `t_enter` is the segment parameter at which
/// the segment enters `cell`.
#[derive(Debug, Clone)]
pub struct VoxelTraversal {
    current: VoxelCoord,
    step: [i32; 3],
    t_max: [f64; 3],
    t_delta: [f64; 3],
    t_current: f64,
    t_end: f64,
    remaining_steps: u64,
    first: bool,
}

impl VoxelTraversal {
    /// Traverse from `origin` towards `end`, starting in `start_cell` at
    /// parameter `t_start` and stopping once the entry parameter would
    /// exceed `t_end`.
    ///
    /// `grid_origin` and `leaf_size` define the cell lattice
    /// (`cell = floor((p - grid_origin) / leaf)`). `start_cell` is normally the
    /// cell containing `origin + t_start * (end - origin)`; callers may clamp
    /// it into the grid when the start point lies on the grid's outer face.
    pub fn new(
        origin: &Point3<f64>,
        end: &Point3<f64>,
        start_cell: VoxelCoord,
        t_start: f64,
        t_end: f64,
        grid_origin: &[f32; 3],
        leaf_size: &[f32; 3],
    ) -> Self {
        let dir: Vector3<f64> = end - origin;
        let coord = start_cell.as_array();

        let mut step = [0i32; 3];
        let mut t_max = [f64::INFINITY; 3];
        let mut t_delta = [f64::INFINITY; 3];
        let mut budget = 1u64;

        for axis in 0..3 {
            let leaf = leaf_size[axis] as f64;
            let d = dir[axis];
            if d.abs() <= f64::EPSILON {
                continue;
            }
            step[axis] = if d > 0.0 { 1 } else { -1 };
            t_delta[axis] = (leaf / d).abs();

            let boundary_index = if d > 0.0 { coord[axis] + 1 } else { coord[axis] };
            let boundary = grid_origin[axis] as f64 + boundary_index as f64 * leaf;
            t_max[axis] = (boundary - origin[axis]) / d;

            let span = (d * (t_end - t_start)).abs() / leaf;
            budget += span.ceil() as u64 + 1;
        }

        Self {
            current: start_cell,
            step,
            t_max,
            t_delta,
            t_current: t_start,
            t_end,
            remaining_steps: budget,
            first: true,
        }
    }
}

impl Iterator for VoxelTraversal {
    type Item = (VoxelCoord, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.first {
            self.first = false;
            return Some((self.current, self.t_current));
        }
        if self.remaining_steps == 0 {
            return None;
        }

        let t_next = self.t_max.iter().copied().fold(f64::INFINITY, f64::min);
        if !t_next.is_finite() || t_next > self.t_end + TIE_EPSILON {
            return None;
        }

        let mut coord = self.current.as_array();
        for axis in 0..3 {
            if self.t_max[axis] - t_next <= TIE_EPSILON {
                coord[axis] = coord[axis].wrapping_add(self.step[axis]);
                self.t_max[axis] += self.t_delta[axis];
            }
        }

        self.current = VoxelCoord::from(coord);
        self.t_current = t_next;
        self.remaining_steps -= 1;
        Some((self.current, t_next))
    }
}
