//! Point cloud container for the static model.
//!
//! Points are stored as `[f32; 3]` positions in the model's native (world)
//! frame. Insertion order is preserved so that visible subsets can refer to
//! points by index. Per-point surface normals are optional; when present they
//! allow the accuracy model to account for incidence angle.

use nalgebra::{Point3, Vector3};

/// An ordered, immutable-after-load point cloud.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<[f32; 3]>,
    normals: Option<Vec<[f32; 3]>>,
}

impl PointCloud {
    /// Create a cloud from positions only.
    pub fn new(points: Vec<[f32; 3]>) -> Self {
        Self {
            points,
            normals: None,
        }
    }

    /// Create a cloud with one normal per point.
    ///
    /// Returns `None` when the two arrays differ in length.
    pub fn with_normals(points: Vec<[f32; 3]>, normals: Vec<[f32; 3]>) -> Option<Self> {
        if points.len() != normals.len() {
            return None;
        }
        Some(Self {
            points,
            normals: Some(normals),
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// All positions, in insertion order.
    pub fn points(&self) -> &[[f32; 3]] {
        &self.points
    }

    pub fn normals(&self) -> Option<&[[f32; 3]]> {
        self.normals.as_deref()
    }

    /// Position of point `index` as an `f64` nalgebra point.
    pub fn point(&self, index: usize) -> Option<Point3<f64>> {
        self.points.get(index).map(to_point3)
    }

    /// Normal of point `index`, if normals were supplied.
    pub fn normal(&self, index: usize) -> Option<Vector3<f64>> {
        let n = self.normals.as_ref()?.get(index)?;
        Some(Vector3::new(n[0] as f64, n[1] as f64, n[2] as f64))
    }

    /// Gather the positions at `indices`.
    pub fn select(&self, indices: &[usize]) -> Vec<[f32; 3]> {
        indices
            .iter()
            .filter_map(|&i| self.points.get(i).copied())
            .collect()
    }

    /// Number of points whose coordinates are all finite.
    pub fn finite_count(&self) -> usize {
        self.points.iter().filter(|p| is_finite(p)).count()
    }
}

impl From<Vec<[f32; 3]>> for PointCloud {
    fn from(points: Vec<[f32; 3]>) -> Self {
        Self::new(points)
    }
}

/// True when all three coordinates are finite.
#[inline]
pub fn is_finite(p: &[f32; 3]) -> bool {
    p[0].is_finite() && p[1].is_finite() && p[2].is_finite()
}

#[inline]
pub(crate) fn to_point3(p: &[f32; 3]) -> Point3<f64> {
    Point3::new(p[0] as f64, p[1] as f64, p[2] as f64)
}

#[inline]
pub(crate) fn from_point3(p: &Point3<f64>) -> [f32; 3] {
    [p.x as f32, p.y as f32, p.z as f32]
}
