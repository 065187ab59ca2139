//! Speed Pulse measures the latency, jitter, download and upload speed of a
//! network connection against Cloudflare's speed test endpoints.
//!
//! The engine runs three phases strictly in order: latency probing, a
//! time-boxed download and a time-boxed upload. Each phase collects samples
//! and reduces them to one figure; the figures are packaged into a
//! [`SpeedTestResult`].
//!
//! # Example
//! ```no_run
//! use speed_pulse::{run_speed_test, Callbacks};
//!
//! #[tokio::main]
//! async fn main() {
//!     let callbacks = Callbacks::new()
//!         .on_download_progress(|mbps| println!("down {:.2} Mbps", mbps));
//!     let result = run_speed_test(&callbacks).await.unwrap();
//!     println!("ping {} ms", result.ping_ms);
//! }
//! ```

pub mod cancel;
pub mod cloudflare;
pub mod errors;
pub mod history;
pub mod measurements;
pub mod progress;
pub mod results;
pub mod retry;
pub mod scoring;
pub mod stats;

pub use cancel::CancelToken;
pub use cloudflare::client::{Client, Transport};
pub use cloudflare::tests::engine::{SpeedTest, TestConfig};
pub use errors::{ErrorKind, SpeedTestError};
pub use progress::{Callbacks, Direction, ProgressCallback, ProgressEvent, TestPhase};
pub use results::SpeedTestResult;

/// Run one test with the default configuration over HTTP.
pub async fn run_speed_test(
    callbacks: &Callbacks,
) -> Result<SpeedTestResult, SpeedTestError> {
    SpeedTest::http(TestConfig::default()).run(callbacks).await
}
