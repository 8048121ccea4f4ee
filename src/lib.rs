//! # Palisade
//!
//! Resilient HTTP client foundation. Every outbound call is wrapped in a
//! configurable pipeline (response caching, retry with backoff, per-target
//! circuit breaking and rate limiting) so calling code only ever sees a
//! uniform success/failure [`Outcome`](types::Outcome), never a raw
//! transport exception.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use palisade::{ClientConfig, HttpClient};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .base_url("https://api.example.com")
//!         .max_retries(3)
//!         .breaker_failure_threshold(5)
//!         .cache_default_ttl(Duration::from_secs(60))
//!         .rate_limit_rps(50.0)
//!         .build()?;
//!
//!     let client = HttpClient::new(config)?;
//!
//!     match client.send(client.get("/users/1")?).await {
//!         Ok(response) => println!("{} (cached: {})", response.status, response.from_cache),
//!         Err(error) => eprintln!("call failed: {}", error),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - `client` - Client facade with verb methods and lifecycle
//! - `config` - Configuration types and builder
//! - `pipeline` - Plugin chain and the retry loop around the transport
//! - `resilience` - Circuit breaker, retry policy, rate limiter
//! - `cache` - Bounded TTL response cache
//! - `transport` - HTTP transport boundary and reqwest implementation
//! - `errors` - Error taxonomy
//! - `types` - Request/Response values and the Outcome type
//! - `observability` - Structured logging setup

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod client;
pub mod config;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod resilience;
pub mod transport;
pub mod types;

#[cfg(test)]
pub mod mocks;

pub use cache::{CacheKey, ResponseCache};
pub use client::{HttpClient, HttpClientBuilder};
pub use config::{
    CacheConfig, CircuitBreakerConfig, ClientConfig, ClientConfigBuilder, RateLimitConfig,
    RetryConfig,
};
pub use errors::{PipelineError, PipelineResult, TransportError};
pub use observability::{LogFormat, LogLevel, LoggingConfig};
pub use pipeline::{HeaderInjector, Pipeline, Plugin, RequestLogger};
pub use resilience::{
    CircuitBreaker, CircuitBreakerHook, CircuitBreakerRegistry, CircuitState, RateLimiter,
    RetryDecision, RetryPolicy,
};
pub use transport::{ReqwestTransport, Transport};
pub use types::{Idempotency, Outcome, Request, RequestBuilder, Response, TargetKey};

/// Default maximum number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff before the first retry, in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 100;

/// Default upper bound on any single backoff delay, in seconds.
pub const DEFAULT_MAX_DELAY_SECS: u64 = 30;

/// Default consecutive-failure count that opens a target's breaker.
pub const DEFAULT_BREAKER_FAILURE_THRESHOLD: u32 = 5;

/// Default open-state duration before a half-open trial, in seconds.
pub const DEFAULT_BREAKER_OPEN_DURATION_SECS: u64 = 30;

/// Default consecutive trial successes required to close a breaker.
pub const DEFAULT_BREAKER_HALF_OPEN_TRIALS: u32 = 3;

/// Default response cache capacity, in entries.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Default response cache TTL, in seconds.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60;

/// Default per-target burst capacity for the rate limiter.
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 100;

/// Default per-attempt timeout, in seconds.
pub const DEFAULT_PER_ATTEMPT_TIMEOUT_SECS: u64 = 30;
