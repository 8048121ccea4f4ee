//! Error types for the resilience pipeline.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Transport-level failure, produced by the HTTP transport collaborator.
///
/// A response received with a non-2xx status is *not* a transport error: the
/// transport returns it as a successful call and the pipeline decides how to
/// classify it (see [`PipelineError::HttpStatus`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// TCP connection refused or reset by the target
    #[error("connection failed: {0}")]
    ConnectionRefused(String),

    /// Hostname resolution failed
    #[error("DNS resolution failed: {0}")]
    Dns(String),

    /// TLS handshake or certificate verification failed
    #[error("TLS failure: {0}")]
    Tls(String),

    /// The attempt exceeded its per-attempt timeout budget
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Any other I/O failure while sending the request or reading the response
    #[error("transport I/O error: {0}")]
    Io(String),
}

/// Failure half of the pipeline [`Outcome`](crate::types::Outcome).
///
/// This enum covers every expected failure mode with enough context for
/// callers to distinguish target-down from throttled from exhausted-retries
/// from deadline-exceeded.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// The transport call itself failed (network, DNS, TLS, timeout)
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The transport succeeded but the target answered with a non-2xx status
    #[error("HTTP status {status}: {detail}")]
    HttpStatus {
        /// Response status code
        status: u16,
        /// Truncated response body for diagnostics
        detail: String,
    },

    /// The target's circuit breaker is open; no transport call was attempted
    #[error("circuit open for target {target}")]
    CircuitOpen {
        /// Target whose breaker rejected the call
        target: String,
        /// Time remaining until a half-open trial will be admitted
        retry_in: Option<Duration>,
    },

    /// The local rate limiter had no tokens for this target
    #[error("rate limited for target {target}")]
    RateLimited {
        /// Target whose bucket was empty
        target: String,
    },

    /// All retry attempts were consumed; carries the *last* underlying error
    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    RetryBudgetExhausted {
        /// Total attempts made, including the first
        attempts: u32,
        /// The error from the final attempt
        last: Box<PipelineError>,
    },

    /// The caller-supplied overall deadline would be (or was) exceeded
    #[error("overall deadline exceeded after {elapsed:?}")]
    DeadlineExceeded {
        /// Time elapsed since the logical call started
        elapsed: Duration,
    },

    /// A verb method was invoked after the client was closed
    #[error("client is closed")]
    ClientClosed,

    /// A plugin hook returned an error or panicked
    #[error("plugin {plugin} failed: {message}")]
    Plugin {
        /// Name of the misbehaving plugin
        plugin: String,
        /// What went wrong
        message: String,
    },

    /// Invalid configuration or request construction (bad URL, bad header)
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the invalid setting
        message: String,
    },
}

impl PipelineError {
    /// Returns true if this error is eligible for retry evaluation.
    ///
    /// Retryable: timeouts, connection/DNS/IO failures, HTTP 429, and 5xx
    /// statuses. Circuit-breaker and rate-limiter rejections are terminal,
    /// as are 4xx statuses other than 429.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Transport(_) => true,
            PipelineError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns true if this failure should count against the target's circuit
    /// breaker. Only transport-level failures and 5xx statuses indicate target
    /// unhealthiness; 4xx statuses indicate a bad request and count neither way.
    pub fn is_breaker_failure(&self) -> bool {
        match self {
            PipelineError::Transport(_) => true,
            PipelineError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<url::ParseError> for PipelineError {
    fn from(err: url::ParseError) -> Self {
        PipelineError::Configuration {
            message: format!("invalid URL: {}", err),
        }
    }
}
