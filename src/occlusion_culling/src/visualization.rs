//! Display artifacts for an external viewer.
//!
//! The core only produces geometry and colors and pushes them into a
//! [`VisualizationSink`]; nothing flows back.

use nalgebra::Vector3;

use crate::accuracy::{incidence_cos, AccuracyModel, AccuracyRange};
use crate::cloud::{from_point3, to_point3};
use crate::colors::{accuracy_to_color, ColorRGBA};
use crate::culling::VisibleSubset;
use crate::frustum::Frustum;
use crate::transform::Pose;

/// A world-frame line segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub start: [f32; 3],
    pub end: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColoredPoint {
    pub position: [f32; 3],
    pub color: ColorRGBA,
}

/// One-way consumer of display artifacts.
pub trait VisualizationSink {
    /// Field-of-view wireframe of the sensor at `pose`.
    fn publish_fov(&mut self, pose: &Pose, segments: &[LineSegment]);

    /// Visible points colored by accuracy.
    fn publish_visible(&mut self, pose: &Pose, points: &[ColoredPoint]);
}

/// Wireframe of the view volume: four rays from the sensor origin to the far
/// corners, followed by the near and far rectangles.
pub fn fov_wireframe(frustum: &Frustum) -> Vec<LineSegment> {
    let corners = frustum.corners_world().map(|c| from_point3(&c));
    let origin = from_point3(&frustum.pose().origin());

    let mut segments = Vec::with_capacity(12);
    for far in &corners[4..] {
        segments.push(LineSegment {
            start: origin,
            end: *far,
        });
    }
    for rect in [&corners[..4], &corners[4..]] {
        for i in 0..4 {
            segments.push(LineSegment {
                start: rect[i],
                end: rect[(i + 1) % 4],
            });
        }
    }
    segments
}

/// Color each visible point by its accuracy, using the subset's normals for
/// the incidence angle when present.
///
/// Colors are scaled to `range` when it has been observed, otherwise to the
/// model's accuracy band.
pub fn colored_visible_points(
    subset: &VisibleSubset,
    model: &dyn AccuracyModel,
    range: Option<&AccuracyRange>,
) -> Vec<ColoredPoint> {
    let (lower, upper) = range
        .and_then(AccuracyRange::as_tuple)
        .unwrap_or_else(|| model.band());
    let sensor = subset.pose.origin();
    let normals = subset
        .normals
        .as_deref()
        .filter(|n| n.len() == subset.points.len());

    subset
        .points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let point = to_point3(p);
            let normal = normals
                .and_then(|n| n.get(i))
                .map(|n| Vector3::new(n[0] as f64, n[1] as f64, n[2] as f64));
            let cos = incidence_cos(&point, normal.as_ref(), &sensor);
            let range = (point - sensor).norm();
            ColoredPoint {
                position: *p,
                color: accuracy_to_color(model.accuracy(range, cos), lower, upper),
            }
        })
        .collect()
}

/// Push the wireframe and colored visible points for one pose.
pub fn publish_pose(
    sink: &mut dyn VisualizationSink,
    frustum: &Frustum,
    subset: &VisibleSubset,
    model: &dyn AccuracyModel,
    range: Option<&AccuracyRange>,
) {
    sink.publish_fov(frustum.pose(), &fov_wireframe(frustum));
    sink.publish_visible(&subset.pose, &colored_visible_points(subset, model, range));
}
