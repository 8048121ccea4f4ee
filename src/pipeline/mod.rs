//! Plugin pipeline: the ordered chain wrapped around every transport call.
//!
//! Registration order is the `before_request` execution order and the reverse
//! order for `after_response`, like nested middleware. Between the hooks sits
//! the resilience stack: cache read, rate-limiter gate, circuit-breaker gate,
//! the transport call with a per-attempt timeout, and the cache write. The
//! retry loop wraps the whole attempt, hooks included, so a retried attempt
//! re-enters the entire pipeline.

mod plugins;

#[cfg(test)]
mod tests;

pub use plugins::{HeaderInjector, RequestLogger};

use crate::cache::{CacheKey, ResponseCache};
use crate::config::ClientConfig;
use crate::errors::{PipelineError, TransportError};
use crate::resilience::{CircuitBreakerRegistry, RateLimiter, RetryPolicy};
use crate::transport::Transport;
use crate::types::{Outcome, Request};
use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A pipeline interceptor.
///
/// Plugins may have arbitrary side effects (logging, metrics, header
/// injection) but must be idempotent with respect to retries: each retry
/// attempt re-runs every hook.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Name used in logs and plugin-failure errors.
    fn name(&self) -> &str;

    /// Runs before the transport call, in registration order. May transform
    /// the request (copy-with-changes) or short-circuit the call by returning
    /// an error; a short-circuit aborts later hooks and the transport call,
    /// but `after_response` still runs for plugins that already executed.
    async fn before_request(&self, request: Request) -> Result<Request, PipelineError> {
        Ok(request)
    }

    /// Runs after the call settles, in reverse registration order. May
    /// transform the response (e.g. decompression) but must not change its
    /// success/failure classification; a reclassifying result is discarded.
    async fn after_response(&self, outcome: Outcome) -> Outcome {
        outcome
    }
}

/// The ordered plugin chain plus the resilience stack around the transport.
pub struct Pipeline {
    plugins: Vec<Arc<dyn Plugin>>,
    transport: Arc<dyn Transport>,
    cache: ResponseCache,
    breakers: CircuitBreakerRegistry,
    limiter: RateLimiter,
    retry: RetryPolicy,
    per_attempt_timeout: Duration,
    overall_deadline: Option<Duration>,
}

impl Pipeline {
    /// Assemble a pipeline from configuration and a transport.
    pub fn new(config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            plugins: Vec::new(),
            transport,
            cache: ResponseCache::new(&config.cache),
            breakers: CircuitBreakerRegistry::new(config.circuit_breaker.clone()),
            limiter: RateLimiter::new(config.rate_limit.clone()),
            retry: RetryPolicy::new(config.retry.clone()),
            per_attempt_timeout: config.per_attempt_timeout,
            overall_deadline: config.overall_deadline,
        }
    }

    /// Append a plugin; registration order defines hook order.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// The circuit-breaker registry (exposed for inspection and tests).
    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// The response cache (exposed for inspection and tests).
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Run one logical call: the retry loop around full pipeline attempts.
    ///
    /// Attempts are strictly sequential; the backoff sleep holds no shared
    /// lock. A breaker that opens mid-sequence aborts remaining retries, and
    /// a retry whose backoff would cross the overall deadline is never
    /// started.
    pub async fn execute(&self, request: Request) -> Outcome {
        let started = Instant::now();
        let deadline = request.overall_deadline().or(self.overall_deadline);
        let mut attempt_index: u32 = 0;

        loop {
            let outcome = self.run_attempt(&request).await;
            match outcome {
                Ok(mut response) => {
                    if !response.from_cache {
                        response.attempt_count = attempt_index + 1;
                    }
                    return Ok(response);
                }
                Err(error) => {
                    let decision = self.retry.decide(attempt_index, &error, &request);
                    if !decision.retry {
                        if self.retry.budget_exhausted(attempt_index, &error, &request) {
                            return Err(PipelineError::RetryBudgetExhausted {
                                attempts: attempt_index + 1,
                                last: Box::new(error),
                            });
                        }
                        return Err(error);
                    }
                    if let Some(deadline) = deadline {
                        if started.elapsed() + decision.delay >= deadline {
                            tracing::debug!(
                                url = %request.url(),
                                elapsed = ?started.elapsed(),
                                "refusing retry that would exceed the overall deadline"
                            );
                            return Err(PipelineError::DeadlineExceeded {
                                elapsed: started.elapsed(),
                            });
                        }
                    }
                    tracing::debug!(
                        url = %request.url(),
                        attempt = attempt_index + 1,
                        delay = ?decision.delay,
                        error = %error,
                        "retrying after failed attempt"
                    );
                    tokio::time::sleep(decision.delay).await;
                    attempt_index += 1;
                }
            }
        }
    }

    /// One full pipeline attempt: pre-hooks, resilience stack, post-hooks.
    async fn run_attempt(&self, request: &Request) -> Outcome {
        let mut executed: Vec<Arc<dyn Plugin>> = Vec::with_capacity(self.plugins.len());
        let mut current = request.clone();
        let mut aborted = None;

        for plugin in &self.plugins {
            match AssertUnwindSafe(plugin.before_request(current.clone()))
                .catch_unwind()
                .await
            {
                Ok(Ok(next)) => {
                    current = next;
                    executed.push(Arc::clone(plugin));
                }
                Ok(Err(error)) => {
                    tracing::warn!(
                        plugin = plugin.name(),
                        %error,
                        "before_request hook aborted the call"
                    );
                    aborted = Some(error);
                    break;
                }
                Err(_) => {
                    aborted = Some(PipelineError::Plugin {
                        plugin: plugin.name().to_string(),
                        message: "before_request hook panicked".to_string(),
                    });
                    break;
                }
            }
        }

        let mut outcome = match aborted {
            Some(error) => Err(error),
            None => self.dispatch(&current).await,
        };

        // Post-response hooks run in reverse for every plugin whose
        // before_request completed, so logging/metrics plugins still observe
        // aborted calls.
        for plugin in executed.iter().rev() {
            let was_success = outcome.is_ok();
            match AssertUnwindSafe(plugin.after_response(outcome.clone()))
                .catch_unwind()
                .await
            {
                Ok(next) if next.is_ok() == was_success => outcome = next,
                Ok(_) => {
                    tracing::warn!(
                        plugin = plugin.name(),
                        "after_response hook tried to reclassify the outcome; ignored"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        plugin = plugin.name(),
                        "after_response hook panicked; outcome unchanged"
                    );
                }
            }
        }

        outcome
    }

    /// Cache read, gates, transport call, breaker accounting, cache write.
    async fn dispatch(&self, request: &Request) -> Outcome {
        // Cache lookup comes before the gates: a cache hit is never blocked
        // by target unhealthiness or local throttling.
        let cache_key = (request.is_idempotent() && !request.cache_opt_out())
            .then(|| CacheKey::derive(request));
        if let Some(key) = &cache_key {
            if let Some(hit) = self.cache.get(key) {
                tracing::debug!(url = %request.url(), "served from cache");
                return Ok(hit);
            }
        }

        let target = request.target();
        if !self.limiter.acquire(&target) {
            return Err(PipelineError::RateLimited {
                target: target.to_string(),
            });
        }

        let permit = match self.breakers.breaker(&target).try_acquire() {
            Ok(permit) => permit,
            Err(retry_in) => {
                return Err(PipelineError::CircuitOpen {
                    target: target.to_string(),
                    retry_in,
                });
            }
        };

        let timeout = request
            .per_attempt_timeout()
            .unwrap_or(self.per_attempt_timeout);
        let result = match tokio::time::timeout(timeout, self.transport.execute(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };

        match result {
            Ok(response) if response.status.is_success() => {
                permit.record_success();
                if let Some(key) = cache_key {
                    if ResponseCache::admits(request, &response) {
                        self.cache.put(key, response.clone(), None);
                    }
                }
                Ok(response)
            }
            Ok(response) => {
                let error = PipelineError::HttpStatus {
                    status: response.status.as_u16(),
                    detail: body_snippet(&response.body),
                };
                if error.is_breaker_failure() {
                    permit.record_failure();
                } else {
                    // 3xx/4xx: the target answered, counts neither way
                    permit.release();
                }
                Err(error)
            }
            Err(transport_error) => {
                permit.record_failure();
                Err(PipelineError::Transport(transport_error))
            }
        }
    }
}

const SNIPPET_LIMIT: usize = 256;

fn body_snippet(body: &Bytes) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= SNIPPET_LIMIT {
        text.into_owned()
    } else {
        let mut end = SNIPPET_LIMIT;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &text[..end])
    }
}
