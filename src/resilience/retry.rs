//! Retry decision policy with exponential backoff and jitter.

use crate::config::RetryConfig;
use crate::errors::PipelineError;
use crate::types::Request;
use rand::Rng;
use std::time::Duration;

/// Whether to re-attempt a failed call, and after how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// True when another attempt should be made
    pub retry: bool,
    /// Backoff to sleep before the next attempt (zero when not retrying)
    pub delay: Duration,
}

impl RetryDecision {
    fn no() -> Self {
        Self {
            retry: false,
            delay: Duration::ZERO,
        }
    }
}

/// Decides, after a failed attempt, whether and when to retry.
///
/// Only idempotent requests are eligible; retries are bounded by
/// `max_retries`; only retryable error kinds (timeouts, connection failures,
/// 429, 5xx) qualify. Breaker and rate-limiter rejections are terminal.
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Maximum retries after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Decide whether to retry after the attempt with `attempt_index`
    /// (0-based) failed with `error`.
    pub fn decide(
        &self,
        attempt_index: u32,
        error: &PipelineError,
        request: &Request,
    ) -> RetryDecision {
        if !request.is_idempotent() {
            return RetryDecision::no();
        }
        if !error.is_retryable() {
            return RetryDecision::no();
        }
        if attempt_index >= self.config.max_retries {
            return RetryDecision::no();
        }
        RetryDecision {
            retry: true,
            delay: self.backoff(attempt_index),
        }
    }

    /// True when the error was retryable for this request but the attempt
    /// budget is spent; the pipeline wraps such failures in
    /// [`PipelineError::RetryBudgetExhausted`].
    pub fn budget_exhausted(
        &self,
        attempt_index: u32,
        error: &PipelineError,
        request: &Request,
    ) -> bool {
        request.is_idempotent()
            && error.is_retryable()
            && attempt_index >= self.config.max_retries
            && self.config.max_retries > 0
    }

    /// Backoff with jitter:
    /// `min(max_delay, base_delay * 2^attempt_index) * random(0.5, 1.0)`.
    /// The jitter factor decorrelates retry storms across many callers.
    fn backoff(&self, attempt_index: u32) -> Duration {
        let capped = self.delay_without_jitter(attempt_index);
        let jitter = rand::thread_rng().gen_range(0.5..1.0);
        capped.mul_f64(jitter)
    }

    /// The deterministic backoff curve, before jitter. Monotonically
    /// non-decreasing up to `max_delay`.
    pub fn delay_without_jitter(&self, attempt_index: u32) -> Duration {
        let exponent = attempt_index.min(63);
        let multiplier = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let scaled = self
            .config
            .base_delay
            .checked_mul(multiplier.min(u32::MAX as u64) as u32)
            .unwrap_or(self.config.max_delay);
        scaled.min(self.config.max_delay)
    }
}
