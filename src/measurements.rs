//! Raw observations collected while a phase is running.

use std::time::Duration;
use tokio::time::Instant;

/// Bits per megabit, decimal as network speeds are reported.
const BITS_PER_MEGABIT: f64 = 1_000_000.0;

/// A single observation: a speed in Mbps or a round trip in ms, plus the
/// instant it was taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    value: f64,
    taken_at: Instant,
}

impl Sample {
    pub fn new(value: f64, taken_at: Instant) -> Self {
        Self { value, taken_at }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn taken_at(&self) -> Instant {
        self.taken_at
    }
}

/// Append-only, chronologically ordered samples of one measurement phase.
///
/// The buffer is owned by the prober or driver running the phase. Nothing
/// can be removed from it; reducers only borrow it.
#[derive(Debug, Clone, Default)]
pub struct SampleBuffer {
    samples: Vec<Sample>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` as observed now.
    pub fn record(&mut self, value: f64) -> Sample {
        self.record_at(value, Instant::now())
    }

    /// Record `value` observed at `taken_at`.
    ///
    /// Instants earlier than the last recorded one are clamped to it so the
    /// buffer stays ordered.
    pub fn record_at(&mut self, value: f64, taken_at: Instant) -> Sample {
        let taken_at = match self.samples.last() {
            Some(last) if last.taken_at > taken_at => last.taken_at,
            _ => taken_at,
        };
        let sample = Sample::new(value, taken_at);
        self.samples.push(sample);
        sample
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// The sample values in recording order.
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(Sample::value).collect()
    }

    pub fn first_taken_at(&self) -> Option<Instant> {
        self.samples.first().map(Sample::taken_at)
    }

    pub fn last_taken_at(&self) -> Option<Instant> {
        self.samples.last().map(Sample::taken_at)
    }
}

impl FromIterator<f64> for SampleBuffer {
    fn from_iter<T: IntoIterator<Item = f64>>(iter: T) -> Self {
        let now = Instant::now();
        let mut buffer = SampleBuffer::new();
        for value in iter {
            buffer.record_at(value, now);
        }
        buffer
    }
}

/// Speed in Mbps for `bytes` moved over `elapsed`.
///
/// Returns 0.0 for a zero-length interval rather than infinity.
pub fn calculate_speed_mbps(bytes: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds <= 0.0 {
        return 0.0;
    }

    (bytes as f64 * 8.0) / seconds / BITS_PER_MEGABIT
}

/// Milliseconds in `duration` as a float.
pub fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
