//! Qualitative speed ratings and human readable speed formatting.

use serde::{Deserialize, Serialize};

/// Qualitative rating for a measured speed.
///
/// Variants are ordered from worst to best for correct derived Ord behavior.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SpeedRating {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl SpeedRating {
    /// Capitalized label for display.
    pub fn label(&self) -> &'static str {
        match self {
            SpeedRating::Poor => "Poor",
            SpeedRating::Fair => "Fair",
            SpeedRating::Good => "Good",
            SpeedRating::Excellent => "Excellent",
        }
    }

    /// Hex colour associated with the rating.
    pub fn color_hex(&self) -> &'static str {
        match self {
            SpeedRating::Poor => "#EF4444",
            SpeedRating::Fair => "#F59E0B",
            SpeedRating::Good => "#10B981",
            SpeedRating::Excellent => "#3B82F6",
        }
    }
}

/// Upper bounds (exclusive, in Mbps) of the lower three ratings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingThresholds {
    /// Speeds below this are `Poor`
    pub poor: f64,
    /// Speeds below this are `Fair`
    pub fair: f64,
    /// Speeds below this are `Good`, everything else `Excellent`
    pub good: f64,
}

impl Default for RatingThresholds {
    fn default() -> Self {
        Self { poor: 5.0, fair: 15.0, good: 40.0 }
    }
}

impl RatingThresholds {
    pub fn rate(&self, speed_mbps: f64) -> SpeedRating {
        if speed_mbps < self.poor {
            SpeedRating::Poor
        } else if speed_mbps < self.fair {
            SpeedRating::Fair
        } else if speed_mbps < self.good {
            SpeedRating::Good
        } else {
            SpeedRating::Excellent
        }
    }

    /// Thresholds must be positive and strictly increasing.
    pub fn is_valid(&self) -> bool {
        self.poor > 0.0 && self.poor < self.fair && self.fair < self.good
    }
}

/// Format a speed with the unit that keeps it readable.
///
/// At or above 1 Mbps the value is shown in Mbps, below it in Kbps
/// (`mbps * 1000`). Both use two decimals, rounded by `{:.2}`.
pub fn format_speed(speed_mbps: f64) -> String {
    if speed_mbps >= 1.0 {
        format!("{:.2} Mbps", speed_mbps)
    } else {
        format!("{:.2} Kbps", speed_mbps * 1000.0)
    }
}
