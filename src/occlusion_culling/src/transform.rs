//! Sensor pose and rigid transforms.
//!
//! A [`Pose`] places the sensor in the world. It is stored as the
//! sensor-to-world isometry; [`Pose::world_to_sensor`] gives the inverse used
//! to bring model points into the sensor frame.
//!
//! The sensor frame follows the optical convention: +z points along the
//! viewing direction, +x to the right and +y down. The identity pose therefore
//! looks along world +z.

use nalgebra::{Isometry3, Point3, Quaternion, Translation3, UnitQuaternion, Vector3};
use rayon::prelude::*;

use crate::cloud::{from_point3, to_point3};
use crate::error::CullingError;

/// Position and orientation of a sensor in the world frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    sensor_to_world: Isometry3<f64>,
}

impl Pose {
    /// Sensor at the world origin looking along +z.
    pub fn identity() -> Self {
        Self {
            sensor_to_world: Isometry3::identity(),
        }
    }

    /// Build a pose from a translation and a unit rotation.
    pub fn new(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Result<Self, CullingError> {
        if !translation.iter().all(|v| v.is_finite()) {
            return Err(CullingError::InvalidPose(format!(
                "non-finite translation {translation:?}"
            )));
        }
        if !rotation.coords.iter().all(|v| v.is_finite()) {
            return Err(CullingError::InvalidPose(format!(
                "non-finite rotation {:?}",
                rotation.coords
            )));
        }
        Ok(Self {
            sensor_to_world: Isometry3::from_parts(Translation3::from(translation), rotation),
        })
    }

    /// Build a pose from a position and an `[x, y, z, w]` quaternion.
    ///
    /// The quaternion is normalized; a zero-norm quaternion is rejected.
    pub fn from_position_orientation(
        position: [f64; 3],
        orientation: [f64; 4],
    ) -> Result<Self, CullingError> {
        if !orientation.iter().all(|v| v.is_finite()) {
            return Err(CullingError::InvalidPose(format!(
                "non-finite orientation {orientation:?}"
            )));
        }
        let [x, y, z, w] = orientation;
        let q = Quaternion::new(w, x, y, z);
        if q.norm() <= f64::EPSILON {
            return Err(CullingError::InvalidPose(
                "orientation quaternion has zero norm".to_string(),
            ));
        }
        Self::new(
            Vector3::new(position[0], position[1], position[2]),
            UnitQuaternion::from_quaternion(q),
        )
    }

    /// Sensor at `eye` looking towards `target`, with `up` roughly opposite
    /// the sensor's +y (image down) axis.
    pub fn looking_at(
        eye: Point3<f64>,
        target: Point3<f64>,
        up: Vector3<f64>,
    ) -> Result<Self, CullingError> {
        let forward = target - eye;
        if !forward.iter().all(|v| v.is_finite()) || forward.norm() <= f64::EPSILON {
            return Err(CullingError::InvalidPose(
                "eye and target must be distinct finite points".to_string(),
            ));
        }
        if up.cross(&forward).norm() <= f64::EPSILON {
            return Err(CullingError::InvalidPose(
                "up vector is parallel to the viewing direction".to_string(),
            ));
        }
        // face_towards maps +z onto `forward` and +y onto `up`; the optical
        // frame has +y down, so build it against the negated up vector.
        let rotation = UnitQuaternion::face_towards(&forward, &(-up));
        Self::new(eye.coords, rotation)
    }

    /// Build from an existing isometry (sensor frame to world frame).
    pub fn from_isometry(sensor_to_world: Isometry3<f64>) -> Result<Self, CullingError> {
        Self::new(sensor_to_world.translation.vector, sensor_to_world.rotation)
    }

    pub fn sensor_to_world(&self) -> Isometry3<f64> {
        self.sensor_to_world
    }

    pub fn world_to_sensor(&self) -> Isometry3<f64> {
        self.sensor_to_world.inverse()
    }

    /// Sensor origin in world coordinates.
    pub fn origin(&self) -> Point3<f64> {
        Point3::from(self.sensor_to_world.translation.vector)
    }

    /// Viewing direction (+z of the sensor) in world coordinates.
    pub fn forward(&self) -> Vector3<f64> {
        self.sensor_to_world.rotation * Vector3::z()
    }

    /// Express world-frame points in the sensor frame (viewport transform).
    pub fn to_sensor_frame(&self, points: &[[f32; 3]]) -> Vec<[f32; 3]> {
        transform_points(points, &self.world_to_sensor())
    }

    /// Express sensor-frame points in the world frame.
    pub fn to_world_frame(&self, points: &[[f32; 3]]) -> Vec<[f32; 3]> {
        transform_points(points, &self.sensor_to_world)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Apply `iso` to every point in parallel, preserving order.
pub fn transform_points(points: &[[f32; 3]], iso: &Isometry3<f64>) -> Vec<[f32; 3]> {
    points
        .par_iter()
        .map(|p| from_point3(&(iso * to_point3(p))))
        .collect()
}
