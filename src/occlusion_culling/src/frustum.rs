//! Field-of-view filtering.
//!
//! The view volume is a truncated pyramid in the sensor frame (+z forward),
//! bounded by four side planes through the sensor origin and the near/far
//! clip planes. Each plane is stored as an inward-facing unit normal `n`
//! and offset `d`; a point `p` is inside when `n · p + d >= -FRUSTUM_EPSILON`
//! for all six planes, so points exactly on a face are kept.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cloud::to_point3;
use crate::error::CullingError;
use crate::transform::Pose;

/// Tolerance on the signed plane distance, in meters.
pub const FRUSTUM_EPSILON: f64 = 1e-6;

/// Sensor field-of-view parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FovConfig {
    /// Horizontal half-angle in degrees, in (0, 90).
    pub horizontal_half_angle_deg: f64,
    /// Vertical half-angle in degrees, in (0, 90).
    pub vertical_half_angle_deg: f64,
    /// Near clip distance along +z (meters, >= 0).
    pub near: f64,
    /// Far clip distance along +z (meters, > near).
    pub far: f64,
}

impl Default for FovConfig {
    /// 58° x 45° depth sensor with a 0.7 m to 6 m working range.
    fn default() -> Self {
        Self {
            horizontal_half_angle_deg: 29.0,
            vertical_half_angle_deg: 22.5,
            near: 0.7,
            far: 6.0,
        }
    }
}

impl FovConfig {
    pub fn validate(&self) -> Result<(), CullingError> {
        let angles = [
            ("horizontal", self.horizontal_half_angle_deg),
            ("vertical", self.vertical_half_angle_deg),
        ];
        for (name, angle) in angles {
            if !angle.is_finite() || angle <= 0.0 || angle >= 90.0 {
                return Err(CullingError::InvalidFov(format!(
                    "{name} half-angle {angle}° must be in (0, 90)"
                )));
            }
        }
        if !self.near.is_finite() || self.near < 0.0 {
            return Err(CullingError::InvalidFov(format!(
                "near plane {} must be finite and >= 0",
                self.near
            )));
        }
        if !self.far.is_finite() || self.far <= self.near {
            return Err(CullingError::InvalidFov(format!(
                "far plane {} must be finite and > near plane {}",
                self.far, self.near
            )));
        }
        Ok(())
    }
}

/// A half-space `n · p + d >= 0` in the sensor frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vector3<f64>,
    pub offset: f64,
}

impl Plane {
    #[inline]
    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&p.coords) + self.offset
    }
}

/// View volume of a sensor at a given pose.
#[derive(Debug, Clone)]
pub struct Frustum {
    pose: Pose,
    fov: FovConfig,
    /// Left, right, top, bottom, near, far.
    planes: [Plane; 6],
}

impl Frustum {
    /// Build the frustum for `pose`. Fails if `fov` is invalid.
    pub fn new(pose: Pose, fov: FovConfig) -> Result<Self, CullingError> {
        fov.validate()?;

        let (sin_h, cos_h) = fov.horizontal_half_angle_deg.to_radians().sin_cos();
        let (sin_v, cos_v) = fov.vertical_half_angle_deg.to_radians().sin_cos();

        let planes = [
            // x >= -z tan(h)
            Plane {
                normal: Vector3::new(cos_h, 0.0, sin_h),
                offset: 0.0,
            },
            // x <= z tan(h)
            Plane {
                normal: Vector3::new(-cos_h, 0.0, sin_h),
                offset: 0.0,
            },
            // y >= -z tan(v)
            Plane {
                normal: Vector3::new(0.0, cos_v, sin_v),
                offset: 0.0,
            },
            // y <= z tan(v)
            Plane {
                normal: Vector3::new(0.0, -cos_v, sin_v),
                offset: 0.0,
            },
            Plane {
                normal: Vector3::z(),
                offset: -fov.near,
            },
            Plane {
                normal: -Vector3::z(),
                offset: fov.far,
            },
        ];

        Ok(Self { pose, fov, planes })
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn fov(&self) -> &FovConfig {
        &self.fov
    }

    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    /// True if a sensor-frame point lies inside the view volume.
    #[inline]
    pub fn contains_local(&self, p: &Point3<f64>) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(p) >= -FRUSTUM_EPSILON)
    }

    /// True if a world-frame point lies inside the view volume.
    pub fn contains_world(&self, p: &Point3<f64>) -> bool {
        let local = self.pose.world_to_sensor() * p;
        self.contains_local(&local)
    }

    /// Indices of the sensor-frame points inside the view volume, ascending.
    pub fn cull(&self, sensor_points: &[[f32; 3]]) -> Vec<usize> {
        sensor_points
            .par_iter()
            .enumerate()
            .filter(|(_, p)| self.contains_local(&to_point3(p)))
            .map(|(i, _)| i)
            .collect()
    }

    /// Conservative overlap test against a world-space axis-aligned box.
    ///
    /// Returns `false` only when all eight corners lie outside the same
    /// plane, so the box certainly misses the frustum.
    pub fn may_intersect_box(&self, lo: &Point3<f64>, hi: &Point3<f64>) -> bool {
        let to_sensor = self.pose.world_to_sensor();
        let corners: Vec<Point3<f64>> = (0..8)
            .map(|i| {
                let p = Point3::new(
                    if i & 1 == 0 { lo.x } else { hi.x },
                    if i & 2 == 0 { lo.y } else { hi.y },
                    if i & 4 == 0 { lo.z } else { hi.z },
                );
                to_sensor * p
            })
            .collect();

        !self.planes.iter().any(|plane| {
            corners
                .iter()
                .all(|c| plane.signed_distance(c) < -FRUSTUM_EPSILON)
        })
    }

    /// Corners of the near and far rectangles in world coordinates.
    ///
    /// Order: near (top-left, top-right, bottom-right, bottom-left), then far
    /// in the same order. "Top" is sensor -y.
    pub fn corners_world(&self) -> [Point3<f64>; 8] {
        let tan_h = self.fov.horizontal_half_angle_deg.to_radians().tan();
        let tan_v = self.fov.vertical_half_angle_deg.to_radians().tan();
        let to_world = self.pose.sensor_to_world();

        let rect = |z: f64| {
            let x = z * tan_h;
            let y = z * tan_v;
            [
                Point3::new(-x, -y, z),
                Point3::new(x, -y, z),
                Point3::new(x, y, z),
                Point3::new(-x, y, z),
            ]
        };
        let near = rect(self.fov.near);
        let far = rect(self.fov.far);

        let mut out = [Point3::origin(); 8];
        for (slot, p) in out.iter_mut().zip(near.iter().chain(far.iter())) {
            *slot = to_world * p;
        }
        out
    }
}

/// Indices of world-frame `points` visible in the field of view at `pose`.
///
/// Points are transformed into the sensor frame first, then tested against
/// the six planes in parallel.
pub fn frustum_subset(
    points: &[[f32; 3]],
    pose: &Pose,
    fov: &FovConfig,
) -> Result<Vec<usize>, CullingError> {
    let frustum = Frustum::new(*pose, *fov)?;
    let sensor_points = pose.to_sensor_frame(points);
    Ok(frustum.cull(&sensor_points))
}
