//! Structured logging setup.
//!
//! The pipeline emits `tracing` events throughout (attempt retries, breaker
//! transitions, cache hits and evictions, rate-limiter rejections). This
//! module provides the subscriber configuration for binaries that want the
//! client's logs without wiring `tracing-subscriber` themselves.

mod logging;

pub use logging::{LogFormat, LogLevel, LoggingConfig};
