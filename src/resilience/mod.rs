//! Stateful resilience policies: circuit breaker, retry, rate limiter.

mod circuit_breaker;
mod rate_limiter;
mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerHook, CircuitBreakerRegistry, CircuitState, CallPermit,
};
pub use rate_limiter::RateLimiter;
pub use retry::{RetryDecision, RetryPolicy};
