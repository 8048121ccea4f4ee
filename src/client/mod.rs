//! Client facade: the public entry point over the resilience pipeline.

use crate::config::ClientConfig;
use crate::errors::{PipelineError, PipelineResult};
use crate::pipeline::{Pipeline, Plugin};
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{Outcome, Request, RequestBuilder};
use http::Method;
use parking_lot::RwLock;
use std::sync::Arc;
use url::Url;

/// HTTP client wrapping every outbound call with the resilience pipeline.
///
/// Owns one plugin pipeline, one circuit-breaker registry, one response
/// cache, one rate limiter and the retry policy. Verb methods build a
/// [`Request`] and run it through [`HttpClient::execute`]; callers only ever
/// see an [`Outcome`], never a raw transport error.
///
/// The client is started on construction. [`HttpClient::close`] releases the
/// pipeline (and with it the transport's connection resources); any verb
/// method after that returns [`PipelineError::ClientClosed`].
pub struct HttpClient {
    pipeline: RwLock<Option<Arc<Pipeline>>>,
    base_url: Option<Url>,
}

impl HttpClient {
    /// Create a client from configuration with the default reqwest transport.
    pub fn new(config: ClientConfig) -> PipelineResult<Self> {
        let transport = Arc::new(
            ReqwestTransport::new(config.per_attempt_timeout)
                .map_err(PipelineError::Transport)?,
        );
        Self::builder().config(config).transport(transport).build()
    }

    /// Create a client from `PALISADE_*` environment variables.
    pub fn from_env() -> PipelineResult<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Start building a client with plugins or a custom transport.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience for a GET request.
    pub fn get(&self, url: impl AsRef<str>) -> PipelineResult<RequestBuilder> {
        self.request(Method::GET, url)
    }

    /// Convenience for a POST request.
    pub fn post(&self, url: impl AsRef<str>) -> PipelineResult<RequestBuilder> {
        self.request(Method::POST, url)
    }

    /// Convenience for a PUT request.
    pub fn put(&self, url: impl AsRef<str>) -> PipelineResult<RequestBuilder> {
        self.request(Method::PUT, url)
    }

    /// Convenience for a DELETE request.
    pub fn delete(&self, url: impl AsRef<str>) -> PipelineResult<RequestBuilder> {
        self.request(Method::DELETE, url)
    }

    /// Convenience for a PATCH request.
    pub fn patch(&self, url: impl AsRef<str>) -> PipelineResult<RequestBuilder> {
        self.request(Method::PATCH, url)
    }

    /// Build a request for an arbitrary method, resolving relative paths
    /// against the configured base URL.
    pub fn request(&self, method: Method, url: impl AsRef<str>) -> PipelineResult<RequestBuilder> {
        let raw = url.as_ref();
        let resolved = match &self.base_url {
            Some(base) => base.join(raw)?,
            None => Url::parse(raw)?,
        };
        Ok(RequestBuilder::with_url(method, resolved))
    }

    /// Run a request through the pipeline.
    pub async fn execute(&self, request: Request) -> Outcome {
        let pipeline = match self.pipeline.read().as_ref() {
            Some(pipeline) => Arc::clone(pipeline),
            None => return Err(PipelineError::ClientClosed),
        };
        pipeline.execute(request).await
    }

    /// Build and run in one step.
    pub async fn send(&self, builder: RequestBuilder) -> Outcome {
        self.execute(builder.build()?).await
    }

    /// Release the pipeline and the transport's connection resources.
    /// Idempotent; calls in flight complete, later calls fail with
    /// [`PipelineError::ClientClosed`].
    pub fn close(&self) {
        self.pipeline.write().take();
    }

    /// Whether the client has been closed.
    pub fn is_closed(&self) -> bool {
        self.pipeline.read().is_none()
    }
}

/// Builder for [`HttpClient`].
#[derive(Default)]
pub struct HttpClientBuilder {
    config: Option<ClientConfig>,
    transport: Option<Arc<dyn Transport>>,
    plugins: Vec<Arc<dyn Plugin>>,
}

impl HttpClientBuilder {
    /// Sets the configuration (defaults apply otherwise).
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Injects a custom transport (tests, alternative HTTP stacks).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Registers a plugin; registration order is hook order.
    pub fn plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Builds the client, acquiring transport resources.
    pub fn build(self) -> PipelineResult<HttpClient> {
        let config = self.config.unwrap_or_default();
        let base_url = config
            .base_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| PipelineError::Configuration {
                message: format!("invalid base_url: {}", e),
            })?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                ReqwestTransport::new(config.per_attempt_timeout)
                    .map_err(PipelineError::Transport)?,
            ),
        };

        let mut pipeline = Pipeline::new(&config, transport);
        for plugin in self.plugins {
            pipeline.register(plugin);
        }

        Ok(HttpClient {
            pipeline: RwLock::new(Some(Arc::new(pipeline))),
            base_url,
        })
    }
}
