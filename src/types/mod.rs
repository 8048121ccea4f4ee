//! Common value types carried through the pipeline.

use crate::errors::{PipelineError, PipelineResult};
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use std::time::Duration;
use url::Url;

/// The sum-type result returned by every pipeline operation.
pub type Outcome = Result<Response, PipelineError>;

/// Whether a request may be retried and cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Idempotency {
    /// Resolve from the method: GET and HEAD are idempotent, others are not
    #[default]
    Auto,
    /// Caller explicitly opted in (e.g. an idempotent POST)
    Enabled,
    /// Caller explicitly opted out
    Disabled,
}

/// A logical upstream identified by scheme+host(+port), or a caller-supplied
/// key. Circuit breaker and rate limiter state is tracked per target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetKey(String);

impl TargetKey {
    /// Create a target key from a caller-supplied string.
    pub fn custom(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive the target key from a URL: lowercase scheme and host, plus the
    /// port when it differs from the scheme default.
    pub fn from_url(url: &Url) -> Self {
        let host = url.host_str().unwrap_or("").to_ascii_lowercase();
        match url.port() {
            Some(port) => Self(format!("{}://{}:{}", url.scheme(), host, port)),
            None => Self(format!("{}://{}", url.scheme(), host)),
        }
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TargetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable outbound request value.
///
/// Created per call and never mutated; plugins that need to add headers use
/// [`Request::with_header`] to copy-with-changes.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
    idempotency: Idempotency,
    cache_opt_out: bool,
    cache_key_headers: Vec<String>,
    per_attempt_timeout: Option<Duration>,
    overall_deadline: Option<Duration>,
    target_override: Option<TargetKey>,
}

impl Request {
    /// Start building a request.
    pub fn builder(method: Method, url: impl AsRef<str>) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request body, if any.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Whether retry and caching are permitted for this call.
    pub fn is_idempotent(&self) -> bool {
        match self.idempotency {
            Idempotency::Auto => matches!(self.method, Method::GET | Method::HEAD),
            Idempotency::Enabled => true,
            Idempotency::Disabled => false,
        }
    }

    /// Whether the caller opted out of response caching.
    pub fn cache_opt_out(&self) -> bool {
        self.cache_opt_out
    }

    /// Header names the caller opted into cache-key derivation.
    pub fn cache_key_headers(&self) -> &[String] {
        &self.cache_key_headers
    }

    /// Per-attempt timeout override, if any.
    pub fn per_attempt_timeout(&self) -> Option<Duration> {
        self.per_attempt_timeout
    }

    /// Overall deadline override, if any.
    pub fn overall_deadline(&self) -> Option<Duration> {
        self.overall_deadline
    }

    /// The target this request counts against.
    pub fn target(&self) -> TargetKey {
        self.target_override
            .clone()
            .unwrap_or_else(|| TargetKey::from_url(&self.url))
    }

    /// Copy-with-changes: returns a new request with the header set.
    pub fn with_header(&self, name: HeaderName, value: HeaderValue) -> Request {
        let mut copy = self.clone();
        copy.headers.insert(name, value);
        copy
    }
}

/// Builder for [`Request`].
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    url: Result<Url, url::ParseError>,
    headers: HeaderMap,
    body: Option<Bytes>,
    idempotency: Idempotency,
    cache_opt_out: bool,
    cache_key_headers: Vec<String>,
    per_attempt_timeout: Option<Duration>,
    overall_deadline: Option<Duration>,
    target_override: Option<TargetKey>,
    error: Option<PipelineError>,
}

impl RequestBuilder {
    /// Create a builder for the given method and URL.
    pub fn new(method: Method, url: impl AsRef<str>) -> Self {
        Self {
            method,
            url: Url::parse(url.as_ref()),
            headers: HeaderMap::new(),
            body: None,
            idempotency: Idempotency::Auto,
            cache_opt_out: false,
            cache_key_headers: Vec::new(),
            per_attempt_timeout: None,
            overall_deadline: None,
            target_override: None,
            error: None,
        }
    }

    pub(crate) fn with_url(method: Method, url: Url) -> Self {
        Self {
            method,
            url: Ok(url),
            headers: HeaderMap::new(),
            body: None,
            idempotency: Idempotency::Auto,
            cache_opt_out: false,
            cache_key_headers: Vec::new(),
            per_attempt_timeout: None,
            overall_deadline: None,
            target_override: None,
            error: None,
        }
    }

    /// Add a header. Invalid names or values surface as a configuration error
    /// at build time.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let parsed = HeaderName::try_from(name.as_ref()).ok().zip(
            HeaderValue::try_from(value.as_ref()).ok(),
        );
        match parsed {
            Some((name, value)) => {
                self.headers.append(name, value);
            }
            None => {
                self.error = Some(PipelineError::Configuration {
                    message: format!("invalid header {:?}", name.as_ref()),
                });
            }
        }
        self
    }

    /// Set an opaque byte body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize a JSON body and set the content type.
    pub fn json<T: serde::Serialize>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                self.headers.insert(
                    http::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                self.body = Some(Bytes::from(bytes));
            }
            Err(err) => {
                self.error = Some(PipelineError::Configuration {
                    message: format!("JSON serialization failed: {}", err),
                });
            }
        }
        self
    }

    /// Mark the request explicitly safe to retry and cache.
    pub fn idempotent(mut self) -> Self {
        self.idempotency = Idempotency::Enabled;
        self
    }

    /// Mark the request explicitly unsafe to retry or cache.
    pub fn non_idempotent(mut self) -> Self {
        self.idempotency = Idempotency::Disabled;
        self
    }

    /// Opt out of response caching while remaining retryable.
    pub fn no_cache(mut self) -> Self {
        self.cache_opt_out = true;
        self
    }

    /// Include a header in cache-key derivation. Headers not named here never
    /// affect which cached entry is returned.
    pub fn cache_key_header(mut self, name: impl Into<String>) -> Self {
        self.cache_key_headers.push(name.into().to_ascii_lowercase());
        self
    }

    /// Override the per-attempt timeout for this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = Some(timeout);
        self
    }

    /// Set an overall deadline across all retries of this request.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.overall_deadline = Some(deadline);
        self
    }

    /// Track breaker and rate-limiter state under a caller-supplied key
    /// instead of the URL's scheme+host.
    pub fn target(mut self, key: impl Into<String>) -> Self {
        self.target_override = Some(TargetKey::custom(key));
        self
    }

    /// Build the immutable request value.
    pub fn build(self) -> PipelineResult<Request> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let url = self.url?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PipelineError::Configuration {
                message: format!("unsupported URL scheme {:?}", url.scheme()),
            });
        }
        Ok(Request {
            method: self.method,
            url,
            headers: self.headers,
            body: self.body,
            idempotency: self.idempotency,
            cache_opt_out: self.cache_opt_out,
            cache_key_headers: self.cache_key_headers,
            per_attempt_timeout: self.per_attempt_timeout,
            overall_deadline: self.overall_deadline,
            target_override: self.target_override,
        })
    }
}

/// Response value produced by the transport or reconstructed from the cache.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
    /// Wall-clock time the transport call took (zero for cache hits)
    pub elapsed: Duration,
    /// Whether this response was served from the cache
    pub from_cache: bool,
    /// Number of transport attempts made for this logical call (zero for
    /// cache hits)
    pub attempt_count: u32,
}

impl Response {
    /// Response body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> PipelineResult<T> {
        serde_json::from_slice(&self.body).map_err(|err| PipelineError::Configuration {
            message: format!("JSON deserialization failed: {}", err),
        })
    }
}
