//! Client configuration types and builder.

use crate::errors::{PipelineError, PipelineResult};
use crate::{
    DEFAULT_BASE_DELAY_MS, DEFAULT_BREAKER_FAILURE_THRESHOLD, DEFAULT_BREAKER_HALF_OPEN_TRIALS,
    DEFAULT_BREAKER_OPEN_DURATION_SECS, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL_SECS,
    DEFAULT_MAX_DELAY_SECS, DEFAULT_MAX_RETRIES, DEFAULT_PER_ATTEMPT_TIMEOUT_SECS,
    DEFAULT_RATE_LIMIT_BURST,
};
use std::time::Duration;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Backoff for the first retry
    pub base_delay: Duration,
    /// Upper bound on any single backoff delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
        }
    }
}

/// Circuit breaker configuration, applied per target.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,
    /// How long the breaker stays open before admitting a trial
    pub open_duration: Duration,
    /// Consecutive half-open trial successes required to close
    pub half_open_trials: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_BREAKER_FAILURE_THRESHOLD,
            open_duration: Duration::from_secs(DEFAULT_BREAKER_OPEN_DURATION_SECS),
            half_open_trials: DEFAULT_BREAKER_HALF_OPEN_TRIALS,
        }
    }
}

/// Rate limiter configuration, applied per target.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Sustained refill rate in requests per second; `None` disables limiting
    pub requests_per_second: Option<f64>,
    /// Burst capacity of each target's token bucket
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: None,
            burst: DEFAULT_RATE_LIMIT_BURST,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries before least-recently-inserted eviction
    pub capacity: usize,
    /// TTL applied when a put does not specify one
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            default_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }
}

/// Configuration for the client facade and its resilience pipeline.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Optional base URL that relative request paths are joined against
    pub base_url: Option<String>,
    /// Retry policy settings
    pub retry: RetryConfig,
    /// Circuit breaker settings
    pub circuit_breaker: CircuitBreakerConfig,
    /// Rate limiter settings
    pub rate_limit: RateLimitConfig,
    /// Response cache settings
    pub cache: CacheConfig,
    /// Timeout applied to each transport attempt
    pub per_attempt_timeout: Duration,
    /// Optional overall deadline across all retries of a call
    pub overall_deadline: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            per_attempt_timeout: Duration::from_secs(DEFAULT_PER_ATTEMPT_TIMEOUT_SECS),
            overall_deadline: None,
        }
    }
}

impl ClientConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Creates a configuration from `PALISADE_*` environment variables.
    ///
    /// Unset variables fall back to defaults; set-but-unparseable variables
    /// are a configuration error.
    pub fn from_env() -> PipelineResult<Self> {
        let mut builder = Self::builder();
        if let Ok(base_url) = std::env::var("PALISADE_BASE_URL") {
            builder = builder.base_url(base_url);
        }
        if let Some(v) = env_parse::<u32>("PALISADE_MAX_RETRIES")? {
            builder = builder.max_retries(v);
        }
        if let Some(v) = env_parse::<u64>("PALISADE_BASE_DELAY_MS")? {
            builder = builder.base_delay(Duration::from_millis(v));
        }
        if let Some(v) = env_parse::<u64>("PALISADE_MAX_DELAY_MS")? {
            builder = builder.max_delay(Duration::from_millis(v));
        }
        if let Some(v) = env_parse::<u32>("PALISADE_BREAKER_FAILURE_THRESHOLD")? {
            builder = builder.breaker_failure_threshold(v);
        }
        if let Some(v) = env_parse::<u64>("PALISADE_BREAKER_OPEN_DURATION_MS")? {
            builder = builder.breaker_open_duration(Duration::from_millis(v));
        }
        if let Some(v) = env_parse::<u32>("PALISADE_BREAKER_HALF_OPEN_TRIALS")? {
            builder = builder.breaker_half_open_trials(v);
        }
        if let Some(v) = env_parse::<usize>("PALISADE_CACHE_CAPACITY")? {
            builder = builder.cache_capacity(v);
        }
        if let Some(v) = env_parse::<u64>("PALISADE_CACHE_DEFAULT_TTL_SECS")? {
            builder = builder.cache_default_ttl(Duration::from_secs(v));
        }
        if let Some(v) = env_parse::<f64>("PALISADE_RATE_LIMIT_RPS")? {
            builder = builder.rate_limit_rps(v);
        }
        if let Some(v) = env_parse::<u32>("PALISADE_RATE_LIMIT_BURST")? {
            builder = builder.rate_limit_burst(v);
        }
        if let Some(v) = env_parse::<u64>("PALISADE_PER_ATTEMPT_TIMEOUT_MS")? {
            builder = builder.per_attempt_timeout(Duration::from_millis(v));
        }
        if let Some(v) = env_parse::<u64>("PALISADE_OVERALL_DEADLINE_MS")? {
            builder = builder.overall_deadline(Duration::from_millis(v));
        }
        builder.build()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> PipelineResult<Option<T>> {
    match std::env::var(name) {
        Err(_) => Ok(None),
        Ok(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            PipelineError::Configuration {
                message: format!("environment variable {} has invalid value {:?}", name, raw),
            }
        }),
    }
}

/// Builder for [`ClientConfig`].
///
/// Option names match the recognized configuration surface: `max_retries`,
/// `base_delay`, `max_delay`, `breaker_failure_threshold`,
/// `breaker_open_duration`, `breaker_half_open_trials`, `cache_capacity`,
/// `cache_default_ttl`, `rate_limit_rps`, `rate_limit_burst`,
/// `per_attempt_timeout`, `overall_deadline`.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    max_retries: Option<u32>,
    base_delay: Option<Duration>,
    max_delay: Option<Duration>,
    breaker_failure_threshold: Option<u32>,
    breaker_open_duration: Option<Duration>,
    breaker_half_open_trials: Option<u32>,
    cache_capacity: Option<usize>,
    cache_default_ttl: Option<Duration>,
    rate_limit_rps: Option<f64>,
    rate_limit_burst: Option<u32>,
    per_attempt_timeout: Option<Duration>,
    overall_deadline: Option<Duration>,
}

impl ClientConfigBuilder {
    /// Sets the base URL that relative request paths are joined against.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the maximum number of retries after the first attempt.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets the backoff for the first retry.
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = Some(base_delay);
        self
    }

    /// Sets the upper bound on any single backoff delay.
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Sets the consecutive-failure count that opens a target's breaker.
    pub fn breaker_failure_threshold(mut self, threshold: u32) -> Self {
        self.breaker_failure_threshold = Some(threshold);
        self
    }

    /// Sets how long an open breaker blocks calls before a half-open trial.
    pub fn breaker_open_duration(mut self, duration: Duration) -> Self {
        self.breaker_open_duration = Some(duration);
        self
    }

    /// Sets how many consecutive trial successes close a half-open breaker.
    pub fn breaker_half_open_trials(mut self, trials: u32) -> Self {
        self.breaker_half_open_trials = Some(trials);
        self
    }

    /// Sets the cache capacity in entries.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Sets the default cache TTL.
    pub fn cache_default_ttl(mut self, ttl: Duration) -> Self {
        self.cache_default_ttl = Some(ttl);
        self
    }

    /// Sets the sustained per-target request rate.
    pub fn rate_limit_rps(mut self, rps: f64) -> Self {
        self.rate_limit_rps = Some(rps);
        self
    }

    /// Sets the per-target burst capacity.
    pub fn rate_limit_burst(mut self, burst: u32) -> Self {
        self.rate_limit_burst = Some(burst);
        self
    }

    /// Sets the timeout applied to each transport attempt.
    pub fn per_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = Some(timeout);
        self
    }

    /// Sets an overall deadline across all retries of a call.
    pub fn overall_deadline(mut self, deadline: Duration) -> Self {
        self.overall_deadline = Some(deadline);
        self
    }

    /// Builds the configuration, validating cross-field constraints.
    pub fn build(self) -> PipelineResult<ClientConfig> {
        let retry = RetryConfig {
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            base_delay: self
                .base_delay
                .unwrap_or(Duration::from_millis(DEFAULT_BASE_DELAY_MS)),
            max_delay: self
                .max_delay
                .unwrap_or(Duration::from_secs(DEFAULT_MAX_DELAY_SECS)),
        };
        if retry.max_delay < retry.base_delay {
            return Err(PipelineError::Configuration {
                message: "max_delay must be at least base_delay".to_string(),
            });
        }

        let circuit_breaker = CircuitBreakerConfig {
            failure_threshold: self
                .breaker_failure_threshold
                .unwrap_or(DEFAULT_BREAKER_FAILURE_THRESHOLD),
            open_duration: self
                .breaker_open_duration
                .unwrap_or(Duration::from_secs(DEFAULT_BREAKER_OPEN_DURATION_SECS)),
            half_open_trials: self
                .breaker_half_open_trials
                .unwrap_or(DEFAULT_BREAKER_HALF_OPEN_TRIALS),
        };
        if circuit_breaker.failure_threshold == 0 {
            return Err(PipelineError::Configuration {
                message: "breaker_failure_threshold must be at least 1".to_string(),
            });
        }
        if circuit_breaker.half_open_trials == 0 {
            return Err(PipelineError::Configuration {
                message: "breaker_half_open_trials must be at least 1".to_string(),
            });
        }

        if let Some(rps) = self.rate_limit_rps {
            if !rps.is_finite() || rps <= 0.0 {
                return Err(PipelineError::Configuration {
                    message: "rate_limit_rps must be a positive finite number".to_string(),
                });
            }
        }
        let rate_limit = RateLimitConfig {
            requests_per_second: self.rate_limit_rps,
            burst: self.rate_limit_burst.unwrap_or(DEFAULT_RATE_LIMIT_BURST).max(1),
        };

        let cache = CacheConfig {
            capacity: self.cache_capacity.unwrap_or(DEFAULT_CACHE_CAPACITY),
            default_ttl: self
                .cache_default_ttl
                .unwrap_or(Duration::from_secs(DEFAULT_CACHE_TTL_SECS)),
        };

        Ok(ClientConfig {
            base_url: self.base_url,
            retry,
            circuit_breaker,
            rate_limit,
            cache,
            per_attempt_timeout: self
                .per_attempt_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_PER_ATTEMPT_TIMEOUT_SECS)),
            overall_deadline: self.overall_deadline,
        })
    }
}
