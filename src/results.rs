//! The record a finished run hands to its caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scoring::{RatingThresholds, SpeedRating};

/// How much the latency figures can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyConfidence {
    /// At least one probe succeeded.
    Measured,
    /// No probe succeeded; latency and jitter are placeholders.
    Degraded,
}

/// Final, immutable result of one run.
///
/// All numeric fields are non-negative. The engine keeps no copy once it
/// has been returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedTestResult {
    /// Trimmed-mean download speed in Mbps
    pub download_speed_mbps: f64,
    /// Trimmed-mean upload speed in Mbps
    pub upload_speed_mbps: f64,
    /// Rounded mean round trip in milliseconds
    pub ping_ms: u32,
    /// Rounded jitter in milliseconds
    pub jitter_ms: u32,
    /// Whether `ping_ms`/`jitter_ms` come from real probes
    pub latency_confidence: LatencyConfidence,
    /// True when the run was cancelled and some phases were cut short
    #[serde(default)]
    pub cancelled: bool,
    /// When the run finished
    pub completed_at: DateTime<Utc>,
}

impl SpeedTestResult {
    /// Build a result stamped with the current time.
    ///
    /// Negative or non-finite speeds are clamped to zero.
    pub fn new(
        download_speed_mbps: f64,
        upload_speed_mbps: f64,
        ping_ms: u32,
        jitter_ms: u32,
        latency_confidence: LatencyConfidence,
    ) -> Self {
        Self {
            download_speed_mbps: sanitize_speed(download_speed_mbps),
            upload_speed_mbps: sanitize_speed(upload_speed_mbps),
            ping_ms,
            jitter_ms,
            latency_confidence,
            cancelled: false,
            completed_at: Utc::now(),
        }
    }

    pub fn with_cancelled(mut self, cancelled: bool) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn download_rating(&self, thresholds: &RatingThresholds) -> SpeedRating {
        thresholds.rate(self.download_speed_mbps)
    }

    pub fn upload_rating(&self, thresholds: &RatingThresholds) -> SpeedRating {
        thresholds.rate(self.upload_speed_mbps)
    }
}

fn sanitize_speed(speed: f64) -> f64 {
    if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        0.0
    }
}
