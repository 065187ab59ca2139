use crate::cancel::CancelToken;
use crate::cloudflare::client::{Client, Transport};
use crate::cloudflare::tests::latency::{LatencyEstimate, LatencyProber};
use crate::cloudflare::tests::throughput::ThroughputDriver;
use crate::errors::SpeedTestError;
use crate::progress::{Direction, ProgressCallback, ProgressEvent, TestPhase};
use crate::results::SpeedTestResult;
use crate::scoring::RatingThresholds;
use crate::stats::{JitterMethod, TrimPolicy, DEFAULT_TRIM_THRESHOLD, MIN_TRIM_THRESHOLD};
use log::{debug, info, warn};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use url::Url;

/// Latency endpoints, tried in order for every probe.
pub const DEFAULT_PROBE_URLS: [&str; 2] = [
    "https://speed.cloudflare.com/cdn-cgi/trace",
    "https://www.cloudflare.com/cdn-cgi/trace",
];
pub const DEFAULT_DOWNLOAD_URL: &str = "https://speed.cloudflare.com/__down";
pub const DEFAULT_UPLOAD_URL: &str = "https://speed.cloudflare.com/__up";
pub const DEFAULT_META_URL: &str = "https://speed.cloudflare.com/meta";

fn parse_static(url: &'static str) -> Url {
    Url::parse(url).expect("built-in endpoint URL is valid")
}

/// Configuration for the test engine.
///
/// This struct contains every tunable of a run: endpoints, probe settings,
/// phase budgets, and how samples are reduced and rated.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Latency endpoints, tried in order until one answers.
    pub probe_urls: Vec<Url>,

    /// Endpoint serving `download_bytes` of payload per request.
    pub download_url: Url,

    /// Endpoint accepting raw upload chunks.
    pub upload_url: Url,

    /// Endpoint describing the client connection.
    pub meta_url: Url,

    /// Number of sequential latency probes.
    /// Default: 5
    pub probe_count: usize,

    /// Pause between two latency probes.
    /// Default: 200ms
    pub probe_pause: Duration,

    /// Probes slower than this are discarded. Also bounds each attempt.
    /// Default: 2000ms
    pub latency_ceiling: Duration,

    /// Default: mean absolute deviation
    pub jitter_method: JitterMethod,

    /// Wall-clock budget of each throughput phase.
    /// Default: 10s
    pub phase_duration: Duration,

    /// Minimum time between two throughput samples.
    /// Default: 200ms
    pub sample_interval: Duration,

    /// Size requested from the download endpoint per request.
    /// Default: 5 MiB
    pub download_bytes: u64,

    /// Size of each upload chunk.
    /// Default: 256 KiB
    pub chunk_size: usize,

    /// Pause between two upload chunks.
    /// Default: 50ms
    pub chunk_pause: Duration,

    /// Bound on a single request or read that the phase budget does not cover.
    /// Default: 10s
    pub request_timeout: Duration,

    /// Default: drop one lowest and one highest sample
    pub trim_policy: TrimPolicy,

    /// Buffers with at most this many samples are not trimmed.
    /// Default: 4
    pub trim_threshold: usize,

    pub rating_thresholds: RatingThresholds,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            probe_urls: DEFAULT_PROBE_URLS.into_iter().map(parse_static).collect(),
            download_url: parse_static(DEFAULT_DOWNLOAD_URL),
            upload_url: parse_static(DEFAULT_UPLOAD_URL),
            meta_url: parse_static(DEFAULT_META_URL),
            probe_count: 5,
            probe_pause: Duration::from_millis(200),
            latency_ceiling: Duration::from_millis(2000),
            jitter_method: JitterMethod::default(),
            phase_duration: Duration::from_secs(10),
            sample_interval: Duration::from_millis(200),
            download_bytes: 5 * 1024 * 1024,
            chunk_size: 256 * 1024,
            chunk_pause: Duration::from_millis(50),
            request_timeout: Duration::from_secs(10),
            trim_policy: TrimPolicy::default(),
            trim_threshold: DEFAULT_TRIM_THRESHOLD,
            rating_thresholds: RatingThresholds::default(),
        }
    }
}

impl TestConfig {
    /// Reject settings a run cannot work with.
    pub fn validate(&self) -> Result<(), SpeedTestError> {
        if self.probe_urls.is_empty() {
            return Err(SpeedTestError::config("at least one probe URL is required"));
        }
        if self.probe_count == 0 {
            return Err(SpeedTestError::config("probe count must be at least 1"));
        }
        if self.latency_ceiling.is_zero() {
            return Err(SpeedTestError::config("latency ceiling must be positive"));
        }
        if self.phase_duration.is_zero() {
            return Err(SpeedTestError::config("phase duration must be positive"));
        }
        if self.sample_interval.is_zero() {
            return Err(SpeedTestError::config("sample interval must be positive"));
        }
        if self.sample_interval >= self.phase_duration {
            return Err(SpeedTestError::config(format!(
                "sample interval {:?} leaves no room for samples in a {:?} phase",
                self.sample_interval, self.phase_duration
            )));
        }
        if self.download_bytes == 0 {
            return Err(SpeedTestError::config("download size must be positive"));
        }
        if self.chunk_size == 0 {
            return Err(SpeedTestError::config("upload chunk size must be positive"));
        }
        if self.request_timeout.is_zero() {
            return Err(SpeedTestError::config("request timeout must be positive"));
        }
        if self.trim_threshold < MIN_TRIM_THRESHOLD {
            return Err(SpeedTestError::config(format!(
                "trim threshold {} must be at least {}",
                self.trim_threshold, MIN_TRIM_THRESHOLD
            )));
        }
        if let TrimPolicy::Fraction(fraction) = self.trim_policy {
            if !(fraction > 0.0 && fraction < 0.5) {
                return Err(SpeedTestError::config(format!(
                    "trim fraction {} must be between 0 and 0.5",
                    fraction
                )));
            }
        }
        if !self.rating_thresholds.is_valid() {
            return Err(SpeedTestError::config(
                "rating thresholds must be positive and increasing",
            )
            .with_suggestion("Use poor < fair < good, e.g. 5 / 15 / 40 Mbps."));
        }

        Ok(())
    }
}

/// The test engine that sequences latency, download and upload.
///
/// It owns the current [`TestPhase`]; read it with [`SpeedTest::phase`].
/// Only one run may be active at a time: a second call while a run is in
/// progress fails with [`crate::ErrorKind::Busy`].
///
/// # Example
/// ```no_run
/// use speed_pulse::progress::NoProgress;
/// use speed_pulse::{SpeedTest, TestConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let engine = SpeedTest::http(TestConfig::default());
///     let result = engine.run(&NoProgress).await.unwrap();
///     println!("Download: {:.2} Mbps", result.download_speed_mbps);
///     println!("Upload: {:.2} Mbps", result.upload_speed_mbps);
/// }
/// ```
pub struct SpeedTest<T = Client> {
    transport: T,
    config: TestConfig,
    phase: Mutex<TestPhase>,
}

impl SpeedTest<Client> {
    /// Engine talking to the configured endpoints over HTTP.
    pub fn http(config: TestConfig) -> Self {
        Self::new(Client::new(), config)
    }
}

impl<T: Transport> SpeedTest<T> {
    pub fn new(transport: T, config: TestConfig) -> Self {
        Self { transport, config, phase: Mutex::new(TestPhase::Idle) }
    }

    /// The phase the engine is currently in.
    pub fn phase(&self) -> TestPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run the complete speed test sequence.
    pub async fn run(
        &self,
        progress: &dyn ProgressCallback,
    ) -> Result<SpeedTestResult, SpeedTestError> {
        self.run_with_cancel(progress, &CancelToken::new()).await
    }

    /// Run the complete sequence, stopping early once `cancel` fires.
    ///
    /// Executes, strictly one after the other:
    /// 1. Latency probing
    /// 2. Download measurement
    /// 3. Upload measurement
    ///
    /// A phase whose transport fails reports 0 and the run carries on. A
    /// cancelled run still completes, with `cancelled` set on the result and
    /// 0 for every phase that never started. Any other error resets the
    /// engine to idle and is returned without a result.
    pub async fn run_with_cancel(
        &self,
        progress: &dyn ProgressCallback,
        cancel: &CancelToken,
    ) -> Result<SpeedTestResult, SpeedTestError> {
        self.config.validate()?;

        let mut guard = PhaseGuard::begin(&self.phase, progress)?;
        info!("Starting speed test sequence");

        let latency = LatencyProber::new(&self.transport, &self.config, cancel)
            .probe(progress)
            .await?;
        guard.complete();

        let download_speed_mbps = if cancel.is_cancelled() {
            0.0
        } else {
            guard.enter(TestPhase::MeasuringDownload);
            let speed = ThroughputDriver::new(&self.transport, &self.config, cancel)
                .measure(Direction::Download, progress)
                .await?;
            guard.complete();
            speed
        };

        let upload_speed_mbps = if cancel.is_cancelled() {
            0.0
        } else {
            guard.enter(TestPhase::MeasuringUpload);
            let speed = ThroughputDriver::new(&self.transport, &self.config, cancel)
                .measure(Direction::Upload, progress)
                .await?;
            guard.complete();
            speed
        };

        let result = self.assemble(
            &latency,
            download_speed_mbps,
            upload_speed_mbps,
            cancel.is_cancelled(),
        );

        progress.on_complete(&result);
        guard.finish();

        Ok(result)
    }

    fn assemble(
        &self,
        latency: &LatencyEstimate,
        download_speed_mbps: f64,
        upload_speed_mbps: f64,
        cancelled: bool,
    ) -> SpeedTestResult {
        let result = SpeedTestResult::new(
            download_speed_mbps,
            upload_speed_mbps,
            latency.latency_ms,
            latency.jitter_ms,
            latency.confidence,
        )
        .with_cancelled(cancelled);

        if cancelled {
            warn!("Speed test cancelled, reporting partial result");
        }
        info!(
            "Speed test complete: download={:.2} Mbps, upload={:.2} Mbps, ping={} ms, jitter={} ms",
            result.download_speed_mbps,
            result.upload_speed_mbps,
            result.ping_ms,
            result.jitter_ms
        );

        result
    }
}

/// Moves the engine through its phases for one run.
///
/// Dropping the guard before [`PhaseGuard::finish`] (an error, or the run
/// future being dropped) puts the engine back to idle.
struct PhaseGuard<'a> {
    phase: &'a Mutex<TestPhase>,
    progress: &'a dyn ProgressCallback,
    current: TestPhase,
    finished: bool,
}

impl<'a> PhaseGuard<'a> {
    fn begin(
        phase: &'a Mutex<TestPhase>,
        progress: &'a dyn ProgressCallback,
    ) -> Result<Self, SpeedTestError> {
        {
            let mut state = phase.lock().unwrap_or_else(PoisonError::into_inner);
            if state.is_running() {
                warn!("Rejecting run: engine is {:?}", *state);
                return Err(SpeedTestError::busy());
            }
            *state = TestPhase::ProbingLatency;
        }

        progress.on_progress(ProgressEvent::PhaseChange(TestPhase::ProbingLatency));

        Ok(Self {
            phase,
            progress,
            current: TestPhase::ProbingLatency,
            finished: false,
        })
    }

    fn set(&self, next: TestPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn enter(&mut self, next: TestPhase) {
        debug_assert!(next > self.current);
        debug!("Phase {:?} -> {:?}", self.current, next);
        self.current = next;
        self.set(next);
        self.progress.on_progress(ProgressEvent::PhaseChange(next));
    }

    fn complete(&self) {
        self.progress.on_progress(ProgressEvent::PhaseComplete(self.current));
    }

    fn finish(mut self) {
        self.enter(TestPhase::Completed);
        self.finished = true;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Run ended in {:?}, resetting to idle", self.current);
            self.set(TestPhase::Idle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudflare::tests::fake::{
        Call, DownloadStep, FakeTransport, ProbeStep, Recorder, UploadStep,
    };
    use crate::errors::ErrorKind;
    use crate::results::LatencyConfidence;
    use tokio::time::{sleep, timeout, Instant};

    fn fast_config() -> TestConfig {
        TestConfig {
            phase_duration: Duration::from_secs(2),
            ..TestConfig::default()
        }
    }

    #[test]
    fn test_config_default() {
        let config = TestConfig::default();
        assert_eq!(config.probe_count, 5);
        assert_eq!(config.probe_urls.len(), 2);
        assert_eq!(config.latency_ceiling, Duration::from_millis(2000));
        assert_eq!(config.phase_duration, Duration::from_secs(10));
        assert_eq!(config.sample_interval, Duration::from_millis(200));
        assert_eq!(config.chunk_size, 262_144);
        assert_eq!(config.download_bytes, 5_242_880);
        assert_eq!(config.trim_policy, TrimPolicy::DropExtremes);
        assert_eq!(config.trim_threshold, 4);
        assert_eq!(config.download_url.path(), "/__down");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_unusable_values() {
        let cases = [
            TestConfig { probe_count: 0, ..TestConfig::default() },
            TestConfig { probe_urls: Vec::new(), ..TestConfig::default() },
            TestConfig { chunk_size: 0, ..TestConfig::default() },
            TestConfig { phase_duration: Duration::ZERO, ..TestConfig::default() },
            TestConfig { sample_interval: Duration::ZERO, ..TestConfig::default() },
            TestConfig {
                sample_interval: Duration::from_secs(20),
                ..TestConfig::default()
            },
            TestConfig { trim_threshold: 1, ..TestConfig::default() },
            TestConfig { trim_threshold: 0, ..TestConfig::default() },
            TestConfig {
                trim_policy: TrimPolicy::Fraction(0.5),
                ..TestConfig::default()
            },
            TestConfig {
                rating_thresholds: RatingThresholds { poor: 20.0, fair: 15.0, good: 40.0 },
                ..TestConfig::default()
            },
        ];

        for config in cases {
            let err = config.validate().unwrap_err();
            assert_eq!(err.kind, ErrorKind::Config);
        }

        let fraction = TestConfig {
            trim_policy: TrimPolicy::Fraction(0.2),
            ..TestConfig::default()
        };
        assert!(fraction.validate().is_ok());

        let smallest = TestConfig { trim_threshold: 2, ..TestConfig::default() };
        assert!(smallest.validate().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_produces_result() {
        let engine = SpeedTest::new(FakeTransport::new(), fast_config());
        let recorder = Recorder::default();

        let result = engine.run(&recorder).await.unwrap();

        assert_eq!(result.ping_ms, 20);
        assert_eq!(result.jitter_ms, 0);
        assert_eq!(result.latency_confidence, LatencyConfidence::Measured);
        assert!((result.download_speed_mbps - 20.0).abs() < 0.01);
        assert!(result.upload_speed_mbps > 0.0);
        assert!(!result.cancelled);
        assert_eq!(engine.phase(), TestPhase::Completed);
        assert_eq!(recorder.completed(), vec![result]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_phases_run_strictly_in_order() {
        let engine = SpeedTest::new(FakeTransport::new(), fast_config());
        let recorder = Recorder::default();

        engine.run(&recorder).await.unwrap();

        let phases: Vec<TestPhase> =
            recorder.phase_changes().into_iter().map(|(p, _)| p).collect();
        assert_eq!(
            phases,
            vec![
                TestPhase::ProbingLatency,
                TestPhase::MeasuringDownload,
                TestPhase::MeasuringUpload,
                TestPhase::Completed,
            ]
        );

        let calls = engine.transport().calls();
        let last = |kind: Call| {
            calls.iter().filter(|(c, _)| *c == kind).map(|(_, at)| *at).max().unwrap()
        };
        let first = |kind: Call| {
            calls.iter().filter(|(c, _)| *c == kind).map(|(_, at)| *at).min().unwrap()
        };
        assert!(last(Call::Probe) < first(Call::Download));
        assert!(last(Call::Download) < first(Call::Upload));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_upload_keeps_download_result() {
        let transport = FakeTransport::new().with_upload(UploadStep::Fail);
        let engine = SpeedTest::new(transport, fast_config());

        let result = engine.run(&Recorder::default()).await.unwrap();

        assert_eq!(result.upload_speed_mbps, 0.0);
        assert!((result.download_speed_mbps - 20.0).abs() < 0.01);
        assert_eq!(engine.phase(), TestPhase::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_resolves_when_every_call_fails() {
        let transport = FakeTransport::new()
            .with_probe_default(ProbeStep::Fail)
            .with_download(DownloadStep::FailOpen)
            .with_upload(UploadStep::Fail);
        let engine = SpeedTest::new(transport, fast_config());

        let result = engine.run(&Recorder::default()).await.unwrap();

        assert_eq!(result.download_speed_mbps, 0.0);
        assert_eq!(result.upload_speed_mbps, 0.0);
        assert_eq!(result.ping_ms, 0);
        assert_eq!(result.jitter_ms, 0);
        assert_eq!(result.latency_confidence, LatencyConfidence::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_resolves_when_every_call_hangs() {
        let transport = FakeTransport::new()
            .with_probe_default(ProbeStep::Hang)
            .with_download(DownloadStep::Stall)
            .with_upload(UploadStep::Hang);
        let config = fast_config();
        let engine = SpeedTest::new(transport, config.clone());

        let started = Instant::now();
        let result = engine.run(&Recorder::default()).await.unwrap();

        // Two endpoints per probe, each cut off at the ceiling
        let latency_bound = (config.latency_ceiling * 2 + config.probe_pause)
            * config.probe_count as u32;
        let bound = latency_bound + config.phase_duration + config.request_timeout;
        assert!(started.elapsed() <= bound);
        assert_eq!(result.download_speed_mbps, 0.0);
        assert_eq!(result.upload_speed_mbps, 0.0);
        assert_eq!(result.latency_confidence, LatencyConfidence::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_run_is_rejected() {
        let engine = SpeedTest::new(FakeTransport::new(), fast_config());
        let recorder = Recorder::default();

        let (first, second) = tokio::join!(engine.run(&recorder), async {
            sleep(Duration::from_millis(10)).await;
            let phase = engine.phase();
            (phase, engine.run(&recorder).await)
        });

        let (phase, second) = second;
        assert_eq!(phase, TestPhase::ProbingLatency);
        assert_eq!(second.unwrap_err().kind, ErrorKind::Busy);
        assert!(first.is_ok());
        assert_eq!(recorder.completed().len(), 1);
        assert_eq!(engine.phase(), TestPhase::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_error_resets_to_idle() {
        let transport =
            FakeTransport::new().with_download(DownloadStep::Unexpected);
        let engine = SpeedTest::new(transport, fast_config());
        let recorder = Recorder::default();

        let err = engine.run(&recorder).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::Measurement);
        assert_eq!(engine.phase(), TestPhase::Idle);
        assert!(recorder.completed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_config_leaves_engine_idle() {
        let config = TestConfig { probe_count: 0, ..fast_config() };
        let engine = SpeedTest::new(FakeTransport::new(), config);

        let err = engine.run(&Recorder::default()).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::Config);
        assert_eq!(engine.phase(), TestPhase::Idle);
        assert_eq!(engine.transport().probe_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_settles_with_partial_result() {
        let config = TestConfig {
            phase_duration: Duration::from_secs(60),
            ..TestConfig::default()
        };
        let engine = SpeedTest::new(FakeTransport::new(), config);
        let recorder = Recorder::default();
        let cancel = CancelToken::new();

        // Latency takes 5 * 20ms + 4 * 200ms, so this lands mid-download
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                sleep(Duration::from_secs(3)).await;
                cancel.cancel();
            })
        };

        let started = Instant::now();
        let result = engine.run_with_cancel(&recorder, &cancel).await.unwrap();
        canceller.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(result.cancelled);
        assert_eq!(result.ping_ms, 20);
        assert!((result.download_speed_mbps - 20.0).abs() < 0.01);
        assert_eq!(result.upload_speed_mbps, 0.0);
        assert_eq!(engine.transport().upload_calls(), 0);
        assert_eq!(engine.phase(), TestPhase::Completed);
        assert_eq!(recorder.completed().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_run_resets_to_idle() {
        let engine = SpeedTest::new(FakeTransport::new(), fast_config());
        let recorder = Recorder::default();

        let abandoned =
            timeout(Duration::from_millis(500), engine.run(&recorder)).await;

        assert!(abandoned.is_err());
        assert_eq!(engine.phase(), TestPhase::Idle);
        assert!(recorder.completed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerun_after_completion() {
        let engine = SpeedTest::new(FakeTransport::new(), fast_config());
        let recorder = Recorder::default();

        let first = engine.run(&recorder).await.unwrap();
        assert_eq!(engine.phase(), TestPhase::Completed);
        let second = engine.run(&recorder).await.unwrap();

        assert_eq!(engine.phase(), TestPhase::Completed);
        assert_eq!(engine.transport().probe_calls(), 10);
        assert_eq!(first.ping_ms, second.ping_ms);
        assert_eq!(recorder.completed().len(), 2);
        // Each run announces its own phases from the start
        let restarts = recorder
            .phase_changes()
            .into_iter()
            .filter(|(p, _)| *p == TestPhase::ProbingLatency)
            .count();
        assert_eq!(restarts, 2);
    }
}
