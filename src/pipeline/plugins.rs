//! Built-in plugins.

use super::Plugin;
use crate::errors::PipelineError;
use crate::types::{Outcome, Request};
use async_trait::async_trait;
use http::header::{HeaderName, HeaderValue};

/// Adds a fixed set of headers to every request.
///
/// Useful for static auth headers or service identifiers the pipeline carries
/// but does not interpret. Existing headers of the same name are overwritten.
pub struct HeaderInjector {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderInjector {
    /// Create an injector with no headers.
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
        }
    }

    /// Add a header to inject. Invalid names or values surface as a plugin
    /// failure at call time rather than panicking here.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, PipelineError> {
        let name = HeaderName::try_from(name).map_err(|_| PipelineError::Configuration {
            message: format!("invalid header name {:?}", name),
        })?;
        let value = HeaderValue::try_from(value).map_err(|_| PipelineError::Configuration {
            message: format!("invalid header value for {}", name),
        })?;
        self.headers.push((name, value));
        Ok(self)
    }
}

impl Default for HeaderInjector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for HeaderInjector {
    fn name(&self) -> &str {
        "header-injector"
    }

    async fn before_request(&self, request: Request) -> Result<Request, PipelineError> {
        let mut current = request;
        for (name, value) in &self.headers {
            current = current.with_header(name.clone(), value.clone());
        }
        Ok(current)
    }
}

/// Logs every call's method, URL and outcome through `tracing`.
pub struct RequestLogger;

#[async_trait]
impl Plugin for RequestLogger {
    fn name(&self) -> &str {
        "request-logger"
    }

    async fn before_request(&self, request: Request) -> Result<Request, PipelineError> {
        tracing::debug!(method = %request.method(), url = %request.url(), "outbound request");
        Ok(request)
    }

    async fn after_response(&self, outcome: Outcome) -> Outcome {
        match &outcome {
            Ok(response) => tracing::info!(
                status = response.status.as_u16(),
                from_cache = response.from_cache,
                attempts = response.attempt_count,
                elapsed = ?response.elapsed,
                "call succeeded"
            ),
            Err(error) => tracing::warn!(%error, "call failed"),
        }
        outcome
    }
}
