//! Error types for the measurement engine.
//!
//! Errors are split into two families. Transport errors (network, DNS,
//! timeout, TLS, bad HTTP status) are expected during a measurement and are
//! absorbed by the phase that produced them. Everything else is unexpected
//! and surfaces to whoever called [`crate::SpeedTest::run`].

use std::error::Error;
use std::fmt;

/// Exit codes for the command line front end.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Network error (connection failed, timeout, etc.).
    pub const NETWORK_ERROR: i32 = 1;
    /// API error (server returned an error response).
    pub const API_ERROR: i32 = 2;
    /// Configuration error (invalid arguments, unusable history file).
    pub const CONFIG_ERROR: i32 = 3;
    /// The run was interrupted and only a partial result exists.
    pub const PARTIAL_FAILURE: i32 = 4;
    /// Unknown/unexpected error.
    pub const UNKNOWN_ERROR: i32 = 99;
}

/// Categories of errors that can occur during a speed test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network connectivity issues.
    Network,
    /// DNS resolution failures.
    Dns,
    /// A request did not finish within its timeout.
    Timeout,
    /// TLS/SSL handshake failures.
    Tls,
    /// The server answered with an error status.
    Api,
    /// Invalid configuration or arguments.
    Config,
    /// Measurement produced something it never should (internal error).
    Measurement,
    /// `run()` was invoked while another run was still in progress.
    Busy,
    /// Unknown or unexpected errors.
    Unknown,
}

impl ErrorKind {
    /// Get the exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Network => exit_codes::NETWORK_ERROR,
            ErrorKind::Dns => exit_codes::NETWORK_ERROR,
            ErrorKind::Timeout => exit_codes::NETWORK_ERROR,
            ErrorKind::Tls => exit_codes::NETWORK_ERROR,
            ErrorKind::Api => exit_codes::API_ERROR,
            ErrorKind::Config => exit_codes::CONFIG_ERROR,
            ErrorKind::Measurement => exit_codes::UNKNOWN_ERROR,
            ErrorKind::Busy => exit_codes::UNKNOWN_ERROR,
            ErrorKind::Unknown => exit_codes::UNKNOWN_ERROR,
        }
    }

    /// Get a user-friendly description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::Network => "Network error",
            ErrorKind::Dns => "DNS resolution error",
            ErrorKind::Timeout => "Connection timeout",
            ErrorKind::Tls => "TLS/SSL error",
            ErrorKind::Api => "API error",
            ErrorKind::Config => "Configuration error",
            ErrorKind::Measurement => "Measurement error",
            ErrorKind::Busy => "Test already running",
            ErrorKind::Unknown => "Unknown error",
        }
    }

    /// Whether this kind stems from the network transport.
    ///
    /// Transport failures are recovered inside a phase; every other kind
    /// aborts the run.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network
                | ErrorKind::Dns
                | ErrorKind::Timeout
                | ErrorKind::Tls
                | ErrorKind::Api
        )
    }
}

/// A user-friendly error type for speed test operations.
#[derive(Debug)]
pub struct SpeedTestError {
    /// The kind of error.
    pub kind: ErrorKind,
    /// User-friendly error message.
    pub message: String,
    /// Optional suggestion for how to resolve the error.
    pub suggestion: Option<String>,
    /// The underlying error, if any.
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

impl SpeedTestError {
    /// Create a new SpeedTestError.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), suggestion: None, source: None }
    }

    /// Add a suggestion for how to resolve the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add the underlying error source.
    pub fn with_source(
        mut self,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }

    /// Shorthand for `self.kind.is_transport()`.
    pub fn is_transport(&self) -> bool {
        self.kind.is_transport()
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
            .with_suggestion("Check your internet connection and try again.")
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message).with_suggestion(
            "The server may be slow or unreachable. Try again later.",
        )
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Api, message).with_suggestion(
            "The speed test server may be experiencing issues. Try again later.",
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn measurement(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Measurement, message)
            .with_suggestion("Test failed, please retry.")
    }

    pub fn busy() -> Self {
        Self::new(ErrorKind::Busy, "a speed test is already in progress")
            .with_suggestion("Wait for the current test to finish.")
    }
}

impl fmt::Display for SpeedTestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.description(), self.message)?;

        if let Some(ref suggestion) = self.suggestion {
            write!(f, "\n  Suggestion: {}", suggestion)?;
        }

        Ok(())
    }
}

impl Error for SpeedTestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

impl From<reqwest::Error> for SpeedTestError {
    fn from(error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            ErrorKind::Timeout
        } else if error.is_status() {
            ErrorKind::Api
        } else if error.is_builder() {
            ErrorKind::Config
        } else if error.is_connect() || error.is_request() || error.is_body()
        {
            match classify_error(&error) {
                ErrorKind::Unknown => ErrorKind::Network,
                kind => kind,
            }
        } else {
            match classify_error(&error) {
                // A decode failure while streaming a body is still a
                // transfer that went wrong on the wire.
                ErrorKind::Unknown if error.is_decode() => ErrorKind::Network,
                kind => kind,
            }
        };

        to_speed_test_error(kind, Box::new(error), "HTTP request failed")
    }
}

impl From<url::ParseError> for SpeedTestError {
    fn from(error: url::ParseError) -> Self {
        SpeedTestError::config(format!("invalid endpoint URL: {}", error))
            .with_source(error)
    }
}

impl From<std::io::Error> for SpeedTestError {
    fn from(error: std::io::Error) -> Self {
        let kind = classify_error(&error);
        to_speed_test_error(kind, Box::new(error), "I/O error")
    }
}

impl From<serde_json::Error> for SpeedTestError {
    fn from(error: serde_json::Error) -> Self {
        SpeedTestError::config(format!("malformed JSON: {}", error))
            .with_source(error)
    }
}

/// Classify an error into an ErrorKind based on its message.
///
/// Walks the source chain so that wrapped hyper / io errors are seen too.
pub fn classify_error(error: &(dyn Error + 'static)) -> ErrorKind {
    let mut error_str = error.to_string().to_lowercase();
    let mut source = error.source();
    while let Some(inner) = source {
        error_str.push(' ');
        error_str.push_str(&inner.to_string().to_lowercase());
        source = inner.source();
    }

    if error_str.contains("dns")
        || error_str.contains("resolve")
        || error_str.contains("no such host")
    {
        return ErrorKind::Dns;
    }

    if error_str.contains("timeout")
        || error_str.contains("timed out")
        || error_str.contains("deadline")
    {
        return ErrorKind::Timeout;
    }

    if error_str.contains("tls")
        || error_str.contains("ssl")
        || error_str.contains("certificate")
        || error_str.contains("handshake")
    {
        return ErrorKind::Tls;
    }

    if error_str.contains("connection refused")
        || error_str.contains("connection reset")
        || error_str.contains("connection closed")
        || error_str.contains("network unreachable")
        || error_str.contains("host unreachable")
        || error_str.contains("no route")
        || error_str.contains("broken pipe")
    {
        return ErrorKind::Network;
    }

    if error_str.contains("status: 4")
        || error_str.contains("status: 5")
        || error_str.contains("server error")
    {
        return ErrorKind::Api;
    }

    ErrorKind::Unknown
}

/// Wrap an error into a SpeedTestError carrying a suggestion for its kind.
fn to_speed_test_error(
    kind: ErrorKind,
    error: Box<dyn Error + Send + Sync>,
    context: &str,
) -> SpeedTestError {
    let message = format!("{}: {}", context, error);

    let mut speed_error = SpeedTestError::new(kind, message);
    speed_error.source = Some(error);

    match kind {
        ErrorKind::Network => speed_error
            .with_suggestion("Check your internet connection and try again."),
        ErrorKind::Dns => speed_error.with_suggestion(
            "Check your DNS settings or try using a different DNS server.",
        ),
        ErrorKind::Timeout => speed_error.with_suggestion(
            "The server may be slow or unreachable. Try again later.",
        ),
        ErrorKind::Tls => speed_error.with_suggestion(
            "There may be a certificate issue. Check your system time.",
        ),
        ErrorKind::Api => speed_error.with_suggestion(
            "The speed test server may be experiencing issues. Try again later.",
        ),
        _ => speed_error,
    }
}

/// Format an error for user display.
pub fn format_error_for_display(error: &SpeedTestError) -> String {
    let mut output = format!("Error: {}", error.message);

    if let Some(ref suggestion) = error.suggestion {
        output.push_str(&format!("\n\nSuggestion: {}", suggestion));
    }

    output
}
