//! Reduction of sample buffers into reported scalars.

use crate::measurements::SampleBuffer;

/// Buffers with at most this many samples are averaged without trimming.
pub const DEFAULT_TRIM_THRESHOLD: usize = 4;

/// Smallest threshold for which every buffer above it has samples to trim.
pub const MIN_TRIM_THRESHOLD: usize = 2;

/// How many samples the trimmed mean discards from each end.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TrimPolicy {
    /// Drop exactly one lowest and one highest sample.
    #[default]
    DropExtremes,
    /// Drop `max(1, floor(len * fraction))` samples from each end.
    Fraction(f64),
}

impl TrimPolicy {
    /// Number of samples removed from each end of a buffer of `len` samples.
    ///
    /// Always leaves at least one sample in the middle.
    pub fn trim_count(&self, len: usize) -> usize {
        if len < 3 {
            return 0;
        }

        let wanted = match *self {
            TrimPolicy::DropExtremes => 1,
            TrimPolicy::Fraction(fraction) => {
                ((len as f64 * fraction).floor() as usize).max(1)
            }
        };

        wanted.min((len - 1) / 2)
    }
}

/// Which spread statistic is reported as jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JitterMethod {
    /// Mean absolute deviation from the mean.
    #[default]
    MeanAbsoluteDeviation,
    /// Population standard deviation.
    StandardDeviation,
}

/// Arithmetic mean, or 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.iter().sum::<f64>() / values.len() as f64
}

/// Mean of `values` after trimming outliers per `policy`.
///
/// Only slices longer than `threshold` are trimmed. An empty slice yields 0.0.
pub fn trimmed_mean(values: &[f64], policy: TrimPolicy, threshold: usize) -> f64 {
    if values.len() <= threshold {
        return mean(values);
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let trim = policy.trim_count(sorted.len());
    mean(&sorted[trim..sorted.len() - trim])
}

/// Reduce a phase's buffer to one scalar. The buffer is left untouched.
pub fn reduce(buffer: &SampleBuffer, policy: TrimPolicy, threshold: usize) -> f64 {
    trimmed_mean(&buffer.values(), policy, threshold)
}

/// Spread of `values` around their (unrounded) mean.
pub fn jitter(values: &[f64], method: JitterMethod) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let avg = mean(values);
    match method {
        JitterMethod::MeanAbsoluteDeviation => {
            values.iter().map(|v| (v - avg).abs()).sum::<f64>()
                / values.len() as f64
        }
        JitterMethod::StandardDeviation => {
            let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>()
                / values.len() as f64;
            variance.sqrt()
        }
    }
}
