//! Measurement accuracy estimation for visible points.
//!
//! Depth noise of structured-light and time-of-flight sensors grows roughly
//! with the square of the range and with the obliquity of the surface. The
//! default [`DepthErrorModel`] uses
//!
//! ```text
//! error    = k * r^2 / max(cos θ, MIN_INCIDENCE_COS)
//! accuracy = min + (max - min) / (1 + error / error_ref),   error_ref = k * r_ref^2
//! ```
//!
//! so accuracy is `max` at zero range, half-way at the reference range for a
//! head-on surface, and decays monotonically towards `min` with range. Other
//! models can be plugged in through [`AccuracyModel`].

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cloud::{is_finite, to_point3};
use crate::error::CullingError;
use crate::transform::Pose;

/// Lower clamp on the incidence cosine so grazing surfaces keep a finite error.
pub const MIN_INCIDENCE_COS: f64 = 0.1;

/// Parameters of the default depth-error accuracy model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccuracyConfig {
    /// Quadratic depth-error coefficient `k` (m⁻¹).
    pub depth_error_coefficient: f64,
    /// Range at which a head-on point scores half-way in the band (m).
    pub reference_range: f64,
    pub min_accuracy: f64,
    pub max_accuracy: f64,
}

impl Default for AccuracyConfig {
    fn default() -> Self {
        Self {
            depth_error_coefficient: 2.85e-5,
            reference_range: 6.0,
            min_accuracy: 0.0,
            max_accuracy: 1.0,
        }
    }
}

impl AccuracyConfig {
    pub fn validate(&self) -> Result<(), CullingError> {
        let all_finite = [
            self.depth_error_coefficient,
            self.reference_range,
            self.min_accuracy,
            self.max_accuracy,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !all_finite {
            return Err(CullingError::InvalidAccuracyModel(
                "parameters must be finite".to_string(),
            ));
        }
        if self.depth_error_coefficient <= 0.0 {
            return Err(CullingError::InvalidAccuracyModel(format!(
                "depth error coefficient must be positive, got {}",
                self.depth_error_coefficient
            )));
        }
        if self.reference_range <= 0.0 {
            return Err(CullingError::InvalidAccuracyModel(format!(
                "reference range must be positive, got {}",
                self.reference_range
            )));
        }
        if self.min_accuracy > self.max_accuracy {
            return Err(CullingError::InvalidAccuracyModel(format!(
                "accuracy band is inverted: [{}, {}]",
                self.min_accuracy, self.max_accuracy
            )));
        }
        Ok(())
    }
}

/// Per-point accuracy as a function of range and incidence.
///
/// Implementations must be non-increasing in `range` for a fixed
/// `incidence_cos`, and return values inside [`band`](Self::band).
pub trait AccuracyModel: Send + Sync {
    /// Expected depth error (m) at `range` with the given cosine between the
    /// surface normal and the line of sight (1 = head-on).
    fn depth_error(&self, range: f64, incidence_cos: f64) -> f64;

    /// Accuracy score for a point at `range`.
    fn accuracy(&self, range: f64, incidence_cos: f64) -> f64;

    /// The `(min, max)` clamp band of [`accuracy`](Self::accuracy).
    fn band(&self) -> (f64, f64);
}

/// Quadratic depth-error model.
#[derive(Debug, Clone)]
pub struct DepthErrorModel {
    config: AccuracyConfig,
    reference_error: f64,
}

impl DepthErrorModel {
    pub fn new(config: AccuracyConfig) -> Result<Self, CullingError> {
        config.validate()?;
        let reference_error = config.depth_error_coefficient * config.reference_range.powi(2);
        Ok(Self {
            config,
            reference_error,
        })
    }

    pub fn config(&self) -> &AccuracyConfig {
        &self.config
    }
}

impl AccuracyModel for DepthErrorModel {
    fn depth_error(&self, range: f64, incidence_cos: f64) -> f64 {
        let cos = incidence_cos.abs().clamp(MIN_INCIDENCE_COS, 1.0);
        self.config.depth_error_coefficient * range * range / cos
    }

    fn accuracy(&self, range: f64, incidence_cos: f64) -> f64 {
        let (min, max) = self.band();
        let error = self.depth_error(range.max(0.0), incidence_cos);
        let score = min + (max - min) / (1.0 + error / self.reference_error);
        score.clamp(min, max)
    }

    fn band(&self) -> (f64, f64) {
        (self.config.min_accuracy, self.config.max_accuracy)
    }
}

/// Accuracy summary over one pose's visible points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub mean_accuracy: f64,
    /// Mean expected depth error (m).
    pub mean_error: f64,
    pub count: usize,
}

impl AccuracyReport {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Cosine between the surface normal and the direction to the sensor.
/// Head-on (1.0) when the normal is missing or degenerate.
pub fn incidence_cos(point: &Point3<f64>, normal: Option<&Vector3<f64>>, sensor: &Point3<f64>) -> f64 {
    let Some(n) = normal else {
        return 1.0;
    };
    let view = sensor - point;
    let denom = n.norm() * view.norm();
    if denom <= f64::EPSILON || !denom.is_finite() {
        return 1.0;
    }
    (n.dot(&view) / denom).abs()
}

/// Mean accuracy and depth error of `points` (world frame) seen from `pose`.
///
/// `normals`, if given, must be parallel to `points`; a length mismatch is
/// treated as no normals. Non-finite points are skipped.
pub fn evaluate_accuracy(
    model: &dyn AccuracyModel,
    points: &[[f32; 3]],
    normals: Option<&[[f32; 3]]>,
    pose: &Pose,
) -> AccuracyReport {
    let sensor = pose.origin();
    let normals = normals.filter(|n| n.len() == points.len());

    let (sum_accuracy, sum_error, count) = points
        .par_iter()
        .enumerate()
        .filter(|(_, p)| is_finite(p))
        .map(|(i, p)| {
            let p = to_point3(p);
            let normal = normals.and_then(|n| n.get(i)).map(|n| {
                Vector3::new(n[0] as f64, n[1] as f64, n[2] as f64)
            });
            let cos = incidence_cos(&p, normal.as_ref(), &sensor);
            let range = (p - sensor).norm();
            (model.accuracy(range, cos), model.depth_error(range, cos), 1usize)
        })
        .reduce(
            || (0.0, 0.0, 0),
            |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2),
        );

    if count == 0 {
        return AccuracyReport::default();
    }
    AccuracyReport {
        mean_accuracy: sum_accuracy / count as f64,
        mean_error: sum_error / count as f64,
        count,
    }
}

/// Running minimum and maximum of per-pose mean accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyRange {
    pub min: f64,
    pub max: f64,
}

impl Default for AccuracyRange {
    fn default() -> Self {
        Self::empty()
    }
}

impl AccuracyRange {
    pub fn empty() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub fn observe(&mut self, value: f64) {
        if value.is_finite() {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
    }

    /// Record a pose's mean accuracy. Reports with no points carry no
    /// accuracy information and are ignored.
    pub fn observe_report(&mut self, report: &AccuracyReport) {
        if !report.is_empty() {
            self.observe(report.mean_accuracy);
        }
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Map `value` into [0, 1] relative to the observed range. A range with
    /// no spread maps everything to 0.5.
    pub fn normalize(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if self.is_empty() || span <= f64::EPSILON {
            return 0.5;
        }
        ((value - self.min) / span).clamp(0.0, 1.0)
    }

    pub fn as_tuple(&self) -> Option<(f64, f64)> {
        (!self.is_empty()).then_some((self.min, self.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model() -> DepthErrorModel {
        DepthErrorModel::new(AccuracyConfig::default()).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(AccuracyConfig::default().validate().is_ok());

        let inverted = AccuracyConfig {
            min_accuracy: 1.0,
            max_accuracy: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            DepthErrorModel::new(inverted),
            Err(CullingError::InvalidAccuracyModel(_))
        ));

        let bad_range = AccuracyConfig {
            reference_range: 0.0,
            ..Default::default()
        };
        assert!(bad_range.validate().is_err());

        let bad_k = AccuracyConfig {
            depth_error_coefficient: f64::NAN,
            ..Default::default()
        };
        assert!(bad_k.validate().is_err());
    }

    #[test]
    fn test_accuracy_reference_points() {
        let m = model();
        assert_relative_eq!(m.accuracy(0.0, 1.0), 1.0);
        assert_relative_eq!(m.accuracy(6.0, 1.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(m.depth_error(2.0, 1.0), 2.85e-5 * 4.0, epsilon = 1e-15);
    }

    #[test]
    fn test_accuracy_non_increasing_in_range() {
        let m = model();
        for &cos in &[1.0, 0.7, 0.3, 0.0] {
            let mut previous = f64::INFINITY;
            for step in 0..200 {
                let range = step as f64 * 0.1;
                let a = m.accuracy(range, cos);
                assert!(a <= previous, "accuracy increased at r={range}, cos={cos}");
                previous = a;
            }
        }
    }

    #[test]
    fn test_accuracy_clamped_to_band() {
        let config = AccuracyConfig {
            min_accuracy: 0.2,
            max_accuracy: 0.8,
            ..Default::default()
        };
        let m = DepthErrorModel::new(config).unwrap();
        for &range in &[0.0, 0.5, 3.0, 6.0, 50.0, 1e6] {
            for &cos in &[1.0, 0.5, 0.0] {
                let a = m.accuracy(range, cos);
                assert!((0.2..=0.8).contains(&a), "accuracy {a} outside band");
            }
        }
        assert_eq!(m.band(), (0.2, 0.8));
    }

    #[test]
    fn test_oblique_surface_is_less_accurate() {
        let m = model();
        assert!(m.accuracy(3.0, 0.5) < m.accuracy(3.0, 1.0));
        // Grazing angles are clamped rather than diverging.
        assert_relative_eq!(m.depth_error(3.0, 0.0), m.depth_error(3.0, MIN_INCIDENCE_COS));
    }

    #[test]
    fn test_incidence_cos() {
        let sensor = Point3::origin();
        let p = Point3::new(0.0, 0.0, 2.0);
        assert_relative_eq!(incidence_cos(&p, None, &sensor), 1.0);
        let facing = Vector3::new(0.0, 0.0, -1.0);
        assert_relative_eq!(incidence_cos(&p, Some(&facing), &sensor), 1.0);
        let tilted = Vector3::new(1.0, 0.0, -1.0);
        assert_relative_eq!(
            incidence_cos(&p, Some(&tilted), &sensor),
            std::f64::consts::FRAC_1_SQRT_2,
            epsilon = 1e-12
        );
        assert_relative_eq!(incidence_cos(&p, Some(&Vector3::zeros()), &sensor), 1.0);
    }

    #[test]
    fn test_evaluate_accuracy_mean() {
        let m = model();
        let pose = Pose::identity();
        let points = vec![[0.0, 0.0, 2.0], [0.0, 0.0, 4.0], [f32::NAN, 0.0, 0.0]];
        let report = evaluate_accuracy(&m, &points, None, &pose);

        assert_eq!(report.count, 2);
        let expected = (m.accuracy(2.0, 1.0) + m.accuracy(4.0, 1.0)) / 2.0;
        assert_relative_eq!(report.mean_accuracy, expected, epsilon = 1e-12);
        let expected_error = 2.85e-5 * (4.0 + 16.0) / 2.0;
        assert_relative_eq!(report.mean_error, expected_error, epsilon = 1e-12);

        let empty = evaluate_accuracy(&m, &[], None, &pose);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_accuracy_range() {
        let mut range = AccuracyRange::empty();
        assert!(range.is_empty());
        assert_eq!(range.as_tuple(), None);
        assert_relative_eq!(range.normalize(0.3), 0.5);

        range.observe(0.4);
        range.observe(0.9);
        range.observe(f64::NAN);
        range.observe_report(&AccuracyReport::default());
        assert_eq!(range.as_tuple(), Some((0.4, 0.9)));
        assert_relative_eq!(range.normalize(0.65), 0.5, epsilon = 1e-12);
        assert_relative_eq!(range.normalize(2.0), 1.0);
        assert_relative_eq!(range.normalize(0.0), 0.0);

        let mut other = AccuracyRange::empty();
        other.observe(0.1);
        let merged = range.merge(other);
        assert_eq!(merged.as_tuple(), Some((0.1, 0.9)));
    }
}
