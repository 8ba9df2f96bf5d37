//! Synthetic scenes for tests.
//!
//! Generators for simple planar models with known visibility, plus a pose
//! helper that aims the sensor with world +z up.

use nalgebra::{Point3, Vector3};

use crate::transform::Pose;

/// Number of grid samples along a side of length `length` at `interval`.
fn samples(length: f32, interval: f32) -> usize {
    ((length / interval).round() as usize) + 1
}

/// Two points on the +z axis, the nearer one hiding the farther one from a
/// sensor at the origin when indexed with a 1 m leaf.
///
/// # Returns
/// The model and the index of the occluded point.
pub fn make_occluded_pair() -> (Vec<[f32; 3]>, usize) {
    (vec![[0.0, 0.0, 5.0], [0.0, 0.0, 10.0]], 1)
}

/// Square wall in the plane `x = x`, centred on the x axis.
///
/// # Arguments
/// * `x` - Position of the wall along world x
/// * `size` - Side length; the wall spans `[-size/2, size/2]` in y and z
/// * `interval` - Grid spacing between points
pub fn make_wall(x: f32, size: f32, interval: f32) -> Vec<[f32; 3]> {
    let n = samples(size, interval);
    let half = size / 2.0;
    let mut points = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            points.push([x, -half + interval * j as f32, -half + interval * i as f32]);
        }
    }
    points
}

/// Closed box room centred on the origin: four walls at `x, y = ±size/2`
/// plus floor and ceiling at `z = ±height/2`.
///
/// Edge points are shared between faces and appear more than once.
pub fn make_box_room(size: f32, height: f32, interval: f32) -> Vec<[f32; 3]> {
    let half = size / 2.0;
    let half_h = height / 2.0;
    let n = samples(size, interval);
    let m = samples(height, interval);

    let mut points = Vec::with_capacity(4 * n * m + 2 * n * n);
    for i in 0..n {
        let u = -half + interval * i as f32;
        for k in 0..m {
            let z = -half_h + interval * k as f32;
            points.push([half, u, z]);
            points.push([-half, u, z]);
            points.push([u, half, z]);
            points.push([u, -half, z]);
        }
        for j in 0..n {
            let v = -half + interval * j as f32;
            points.push([u, v, half_h]);
            points.push([u, v, -half_h]);
        }
    }
    points
}

/// Three orthogonal planes meeting at the origin (a half-open cube corner):
/// `z = 0`, `x = 0` and `y = 0`, each spanning `[0, length]` on its two axes.
pub fn make_half_cubic_pcd(length: f32, interval: f32) -> Vec<[f32; 3]> {
    let n = samples(length, interval);
    let mut points = Vec::with_capacity(3 * n * n);
    for i in 0..n {
        for j in 0..n {
            let u = interval * j as f32;
            let v = interval * i as f32;
            points.push([u, v, 0.0]);
            points.push([0.0, u, v]);
            points.push([u, 0.0, v]);
        }
    }
    points
}

/// Sensor at `eye` aimed at `target` with world +z up.
///
/// # Panics
/// If `eye` and `target` coincide or the view direction is vertical.
pub fn sensor_pose(eye: [f64; 3], target: [f64; 3]) -> Pose {
    match Pose::looking_at(Point3::from(eye), Point3::from(target), Vector3::z()) {
        Ok(pose) => pose,
        Err(e) => panic!("invalid test pose {eye:?} -> {target:?}: {e}"),
    }
}

/// Axis-aligned bounds of a point cloud.
pub fn compute_bounds(points: &[[f32; 3]]) -> ([f32; 3], [f32; 3]) {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];

    for p in points {
        for i in 0..3 {
            min[i] = min[i].min(p[i]);
            max[i] = max[i].max(p[i]);
        }
    }

    (min, max)
}
