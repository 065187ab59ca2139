//! Ordered fallback across candidate endpoints.
//!
//! Each candidate gets one attempt bounded by a per-attempt timeout. The
//! first success wins; when every candidate fails the caller receives the
//! last error.

use crate::errors::SpeedTestError;
use log::{debug, warn};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Outcome of trying a list of candidates.
#[derive(Debug)]
pub enum FallbackResult<C, T> {
    /// A candidate succeeded.
    Success {
        /// The candidate that answered.
        candidate: C,
        /// Its result.
        value: T,
    },
    /// No candidate succeeded.
    Exhausted {
        /// The error from the last candidate tried, if any was tried.
        last_error: Option<SpeedTestError>,
        /// Number of candidates tried.
        attempts: usize,
    },
}

impl<C, T> FallbackResult<C, T> {
    /// Returns true if a candidate succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, FallbackResult::Success { .. })
    }

    /// Converts to Option, discarding error information.
    pub fn ok(self) -> Option<T> {
        match self {
            FallbackResult::Success { value, .. } => Some(value),
            FallbackResult::Exhausted { .. } => None,
        }
    }
}

/// Try `candidates` in order until `f` succeeds for one of them.
///
/// An attempt that exceeds `attempt_timeout` counts as a timeout failure.
/// Errors that are not transport related stop the search immediately and
/// are returned as `Err`, since another endpoint would not fix them.
///
/// # Example
/// ```no_run
/// use speed_pulse::retry::first_success;
/// use std::time::Duration;
///
/// async fn example() {
///     let mirrors = ["https://a.example", "https://b.example"];
///     let result = first_success(
///         &mirrors,
///         Duration::from_secs(2),
///         "latency probe",
///         |url| async move { Ok::<_, speed_pulse::SpeedTestError>(url.len()) },
///     )
///     .await;
/// }
/// ```
pub async fn first_success<'a, C, T, F, Fut>(
    candidates: &'a [C],
    attempt_timeout: Duration,
    operation_name: &str,
    mut f: F,
) -> Result<FallbackResult<&'a C, T>, SpeedTestError>
where
    C: Display,
    F: FnMut(&'a C) -> Fut,
    Fut: Future<Output = Result<T, SpeedTestError>>,
{
    let mut last_error = None;
    let mut attempts = 0;

    for candidate in candidates {
        attempts += 1;

        let outcome = match timeout(attempt_timeout, f(candidate)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SpeedTestError::timeout(format!(
                "{} against {} exceeded {:?}",
                operation_name, candidate, attempt_timeout
            ))),
        };

        match outcome {
            Ok(value) => {
                if attempts > 1 {
                    debug!(
                        "{}: succeeded on candidate {} ({})",
                        operation_name, attempts, candidate
                    );
                }
                return Ok(FallbackResult::Success { candidate, value });
            }
            Err(e) if e.is_transport() => {
                debug!("{}: {} failed: {}", operation_name, candidate, e.message);
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    if attempts > 0 {
        warn!(
            "{}: all {} candidates failed",
            operation_name, attempts
        );
    }

    Ok(FallbackResult::Exhausted { last_error, attempts })
}
