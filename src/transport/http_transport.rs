//! Reqwest-based transport implementation.

use crate::errors::TransportError;
use crate::types::{Request, Response};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::{Duration, Instant};

/// HTTP transport capability consumed by the pipeline.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one attempt of the request against the network.
    ///
    /// Returns `Ok` for any response the target produced, regardless of
    /// status. Errors are reserved for transport-level failures: connection,
    /// DNS, TLS, timeout, I/O.
    async fn execute(&self, request: &Request) -> Result<Response, TransportError>;
}

/// Reqwest-backed transport.
///
/// Owns the underlying connection pool; dropping it releases the pool.
pub struct ReqwestTransport {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport with the given default per-attempt timeout.
    pub fn new(default_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Io(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            default_timeout,
        })
    }

    fn map_error(err: reqwest::Error, timeout: Duration) -> TransportError {
        if err.is_timeout() {
            return TransportError::Timeout(timeout);
        }
        // Walk the source chain; reqwest does not expose DNS/TLS failures as
        // typed variants.
        let mut chain = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            chain.push_str(": ");
            chain.push_str(&inner.to_string());
            source = inner.source();
        }
        let lowered = chain.to_ascii_lowercase();
        if lowered.contains("dns") || lowered.contains("resolve") {
            TransportError::Dns(chain)
        } else if lowered.contains("tls") || lowered.contains("certificate") {
            TransportError::Tls(chain)
        } else if err.is_connect() {
            TransportError::ConnectionRefused(chain)
        } else {
            TransportError::Io(chain)
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        let timeout = request.per_attempt_timeout().unwrap_or(self.default_timeout);

        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone())
            .timeout(timeout);
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        let started = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_error(e, timeout))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body: Bytes = response
            .bytes()
            .await
            .map_err(|e| Self::map_error(e, timeout))?;

        Ok(Response {
            status,
            headers,
            body,
            elapsed: started.elapsed(),
            from_cache: false,
            attempt_count: 0,
        })
    }
}
