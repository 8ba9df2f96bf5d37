//! Tolerance-based set algebra over point clouds.
//!
//! Two points are the same point when their Euclidean distance is strictly
//! below the tolerance ε. Membership is bucketed through a sparse grid whose
//! cell edge equals ε, so any match of a query lies in the query's cell or
//! one of its 26 neighbours.
//!
//! Non-finite points never match anything and never appear in results.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cloud::is_finite;
use crate::error::CullingError;

/// Default point-equality tolerance in metres.
pub const DEFAULT_TOLERANCE: f32 = 1e-4;

/// Point-equality tolerance (strictly positive, finite).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Tolerance(f32);

impl Tolerance {
    pub fn new(epsilon: f32) -> Result<Self, CullingError> {
        if epsilon.is_finite() && epsilon > 0.0 {
            Ok(Self(epsilon))
        } else {
            Err(CullingError::InvalidTolerance(epsilon))
        }
    }

    pub fn value(&self) -> f32 {
        self.0
    }

    /// True if `a` and `b` are closer than the tolerance.
    #[inline]
    pub fn matches(&self, a: &[f32; 3], b: &[f32; 3]) -> bool {
        let eps = self.0 as f64;
        let d2: f64 = (0..3)
            .map(|k| {
                let d = a[k] as f64 - b[k] as f64;
                d * d
            })
            .sum();
        d2 < eps * eps
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self(DEFAULT_TOLERANCE)
    }
}

impl TryFrom<f32> for Tolerance {
    type Error = CullingError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Tolerance> for f32 {
    fn from(t: Tolerance) -> Self {
        t.0
    }
}

/// ε-cell index `floor(p / ε)` of a point, saturating at the i64 extremes.
type BucketKey = [i64; 3];

/// A point set with tolerance-bucketed membership.
#[derive(Debug, Clone)]
pub struct PointBuckets {
    tolerance: Tolerance,
    buckets: HashMap<BucketKey, Vec<[f32; 3]>>,
    len: usize,
}

impl PointBuckets {
    pub fn new(tolerance: Tolerance) -> Self {
        Self {
            tolerance,
            buckets: HashMap::new(),
            len: 0,
        }
    }

    /// Index every finite point of `points`. Near-duplicates are kept; use
    /// [`insert`](Self::insert) for deduplicating insertion.
    pub fn from_points(points: &[[f32; 3]], tolerance: Tolerance) -> Self {
        let mut set = Self::new(tolerance);
        let keyed: Vec<(BucketKey, [f32; 3])> = points
            .par_iter()
            .filter(|p| is_finite(p))
            .map(|p| (set.key(p), *p))
            .collect();
        set.len = keyed.len();
        for (key, p) in keyed {
            set.buckets.entry(key).or_default().push(p);
        }
        set
    }

    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn key(&self, p: &[f32; 3]) -> BucketKey {
        let eps = self.tolerance.value() as f64;
        p.map(|c| (c as f64 / eps).floor() as i64)
    }

    /// True if some member lies within the tolerance of `p`.
    pub fn contains(&self, p: &[f32; 3]) -> bool {
        if !is_finite(p) || self.len == 0 {
            return false;
        }
        let [x, y, z] = self.key(p);
        for dx in -1i64..=1 {
            for dy in -1i64..=1 {
                for dz in -1i64..=1 {
                    let neighbour = [
                        x.saturating_add(dx),
                        y.saturating_add(dy),
                        z.saturating_add(dz),
                    ];
                    if let Some(bucket) = self.buckets.get(&neighbour) {
                        if bucket.iter().any(|q| self.tolerance.matches(p, q)) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    /// Insert `p` unless an equal point is already present.
    ///
    /// Returns `true` if the set grew.
    pub fn insert(&mut self, p: [f32; 3]) -> bool {
        if !is_finite(&p) || self.contains(&p) {
            return false;
        }
        let key = self.key(&p);
        self.buckets.entry(key).or_default().push(p);
        self.len += 1;
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f32; 3]> {
        self.buckets.values().flatten()
    }
}

/// True iff some point of `cloud` lies within `tolerance` of `point`.
///
/// One-off query: scans `cloud` without indexing it. For repeated queries
/// against the same cloud, build a [`PointBuckets`] once and use
/// [`PointBuckets::contains`].
pub fn contains(cloud: &[[f32; 3]], point: &[f32; 3], tolerance: Tolerance) -> bool {
    is_finite(point)
        && cloud
            .par_iter()
            .any(|q| is_finite(q) && tolerance.matches(point, q))
}

/// Indices of the points of `a` with no match in `b`, in ascending order.
pub fn difference_indices(a: &[[f32; 3]], b: &[[f32; 3]], tolerance: Tolerance) -> Vec<usize> {
    let index = PointBuckets::from_points(b, tolerance);
    a.par_iter()
        .enumerate()
        .filter(|(_, p)| is_finite(p) && !index.contains(p))
        .map(|(i, _)| i)
        .collect()
}

/// Points of `a` with no match in `b`, in the order they appear in `a`.
pub fn difference(a: &[[f32; 3]], b: &[[f32; 3]], tolerance: Tolerance) -> Vec<[f32; 3]> {
    difference_indices(a, b, tolerance)
        .into_iter()
        .map(|i| a[i])
        .collect()
}
