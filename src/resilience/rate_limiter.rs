//! Per-target token-bucket rate limiter.

use crate::config::RateLimitConfig;
use crate::types::TargetKey;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

// Continuous token bucket: refill is computed lazily from elapsed time on
// each check, so no background timer thread exists.
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity: capacity as f64,
            tokens: capacity as f64,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn time_until_available(&mut self) -> Duration {
        self.refill();
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
        }
    }
}

/// Caps outbound request rate per target.
///
/// A request finding zero tokens is rejected immediately; backpressure is
/// surfaced to the caller rather than queued. Buckets are created lazily per
/// target and reset only by configuration reload (a new client).
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: RwLock<HashMap<TargetKey, Arc<Mutex<TokenBucket>>>>,
}

impl RateLimiter {
    /// Create a limiter from configuration. With `requests_per_second` unset
    /// every acquire is granted.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Try to take one token for the target. Returns false when the bucket is
    /// empty; never blocks.
    pub fn acquire(&self, target: &TargetKey) -> bool {
        let Some(rate) = self.config.requests_per_second else {
            return true;
        };
        let bucket = self.bucket(target, rate);
        let granted = bucket.lock().try_consume();
        if !granted {
            tracing::debug!(target_key = %target, "rate limiter rejected call");
        }
        granted
    }

    /// Time until the target's bucket will hold a token again.
    pub fn time_until_available(&self, target: &TargetKey) -> Duration {
        let Some(rate) = self.config.requests_per_second else {
            return Duration::ZERO;
        };
        self.bucket(target, rate).lock().time_until_available()
    }

    fn bucket(&self, target: &TargetKey, rate: f64) -> Arc<Mutex<TokenBucket>> {
        if let Some(bucket) = self.buckets.read().get(target) {
            return Arc::clone(bucket);
        }
        let mut buckets = self.buckets.write();
        Arc::clone(
            buckets
                .entry(target.clone())
                .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(self.config.burst, rate)))),
        )
    }
}
