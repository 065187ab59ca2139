//! Progress event types and callback interface.
//!
//! Defines the phases of a run, the events emitted by the engine while it
//! measures, and the callback trait through which callers receive them.

use crate::results::SpeedTestResult;
use serde::Serialize;

/// The phase a [`crate::SpeedTest`] is in. Phases only move forward within
/// one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestPhase {
    /// No run in progress
    Idle,
    /// Running latency probes
    ProbingLatency,
    /// Running the download driver
    MeasuringDownload,
    /// Running the upload driver
    MeasuringUpload,
    /// The last run produced a result
    Completed,
}

impl TestPhase {
    /// Whether a run is currently executing in this phase.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            TestPhase::ProbingLatency
                | TestPhase::MeasuringDownload
                | TestPhase::MeasuringUpload
        )
    }
}

/// Direction of a throughput measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Download,
    Upload,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Download => write!(f, "download"),
            Direction::Upload => write!(f, "upload"),
        }
    }
}

/// Progress events emitted during test execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// The engine entered a new phase
    PhaseChange(TestPhase),
    /// A latency probe succeeded
    LatencyMeasurement {
        /// Measured round trip in milliseconds
        value_ms: f64,
        /// Current probe number (1-indexed)
        current: usize,
        /// Total number of probes
        total: usize,
    },
    /// A throughput sample was taken
    BandwidthMeasurement {
        /// Direction of the measurement
        direction: Direction,
        /// Instantaneous speed in Mbps
        speed_mbps: f64,
        /// Sample number within the phase (1-indexed)
        sample: usize,
    },
    /// A measurement phase finished
    PhaseComplete(TestPhase),
}

/// Callback interface for progress updates.
///
/// Called synchronously from the measurement loop, so implementations must
/// return quickly. Events are passed by value; a callback never sees the
/// engine's sample buffers.
pub trait ProgressCallback: Send + Sync {
    /// Called when a progress event occurs.
    fn on_progress(&self, event: ProgressEvent);

    /// Called once with the final record, right before the run completes.
    fn on_complete(&self, _result: &SpeedTestResult) {}
}

/// Ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_progress(&self, _event: ProgressEvent) {}
}

type SpeedHook = Box<dyn Fn(f64) + Send + Sync>;
type CompleteHook = Box<dyn Fn(&SpeedTestResult) + Send + Sync>;

/// Closure-based callbacks, one optional hook per kind of update.
///
/// # Example
/// ```
/// use speed_pulse::Callbacks;
///
/// let callbacks = Callbacks::new()
///     .on_download_progress(|mbps| println!("down {:.2} Mbps", mbps))
///     .on_upload_progress(|mbps| println!("up {:.2} Mbps", mbps));
/// ```
#[derive(Default)]
pub struct Callbacks {
    ping: Option<SpeedHook>,
    download: Option<SpeedHook>,
    upload: Option<SpeedHook>,
    complete: Option<CompleteHook>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives each successful probe's round trip in milliseconds.
    pub fn on_ping_progress(
        mut self,
        hook: impl Fn(f64) + Send + Sync + 'static,
    ) -> Self {
        self.ping = Some(Box::new(hook));
        self
    }

    /// Receives each download sample in Mbps.
    pub fn on_download_progress(
        mut self,
        hook: impl Fn(f64) + Send + Sync + 'static,
    ) -> Self {
        self.download = Some(Box::new(hook));
        self
    }

    /// Receives each upload sample in Mbps.
    pub fn on_upload_progress(
        mut self,
        hook: impl Fn(f64) + Send + Sync + 'static,
    ) -> Self {
        self.upload = Some(Box::new(hook));
        self
    }

    /// Receives the final result.
    pub fn on_complete(
        mut self,
        hook: impl Fn(&SpeedTestResult) + Send + Sync + 'static,
    ) -> Self {
        self.complete = Some(Box::new(hook));
        self
    }
}

impl ProgressCallback for Callbacks {
    fn on_progress(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::LatencyMeasurement { value_ms, .. } => {
                if let Some(hook) = &self.ping {
                    hook(value_ms);
                }
            }
            ProgressEvent::BandwidthMeasurement {
                direction, speed_mbps, ..
            } => {
                let hook = match direction {
                    Direction::Download => &self.download,
                    Direction::Upload => &self.upload,
                };
                if let Some(hook) = hook {
                    hook(speed_mbps);
                }
            }
            ProgressEvent::PhaseChange(_) | ProgressEvent::PhaseComplete(_) => {}
        }
    }

    fn on_complete(&self, result: &SpeedTestResult) {
        if let Some(hook) = &self.complete {
            hook(result);
        }
    }
}
