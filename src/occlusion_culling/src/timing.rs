//! Per-query stage timing.
//!
//! Timers record real durations only when the `profiling` feature is
//! enabled. Without it [`Timer`] is a zero-sized no-op and every
//! [`QueryTiming`] field stays zero.

use serde::{Deserialize, Serialize};
use std::time::Duration;
#[cfg(feature = "profiling")]
use std::time::Instant;

/// Timing breakdown for a single visibility query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryTiming {
    pub total_ms: f64,
    /// World to sensor frame transform
    pub transform_ms: f64,
    pub frustum_ms: f64,
    pub occlusion_ms: f64,
}

impl QueryTiming {
    /// Stage-wise sum of two timings, for campaign totals.
    pub fn accumulate(&mut self, other: &QueryTiming) {
        self.total_ms += other.total_ms;
        self.transform_ms += other.transform_ms;
        self.frustum_ms += other.frustum_ms;
        self.occlusion_ms += other.occlusion_ms;
    }
}

/// Timer that can be enabled/disabled at compile time.
#[cfg(feature = "profiling")]
pub struct Timer {
    start: Instant,
    name: &'static str,
}

#[cfg(feature = "profiling")]
impl Timer {
    #[inline]
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    #[inline]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// No-op timer when profiling is disabled.
#[cfg(not(feature = "profiling"))]
pub struct Timer;

#[cfg(not(feature = "profiling"))]
impl Timer {
    #[inline(always)]
    pub fn new(_name: &'static str) -> Self {
        Self
    }

    #[inline(always)]
    pub fn elapsed_ms(&self) -> f64 {
        0.0
    }

    #[inline(always)]
    pub fn elapsed(&self) -> Duration {
        Duration::ZERO
    }

    #[inline(always)]
    pub fn name(&self) -> &'static str {
        ""
    }
}
