//! Integration tests for the full pipeline stack.

use super::*;
use crate::config::ClientConfig;
use crate::mocks::MockTransport;
use crate::resilience::CircuitState;
use crate::types::{Response, TargetKey};
use http::Method;
use std::sync::Mutex;
use tokio_test::assert_ok;

fn fast_config() -> ClientConfig {
    ClientConfig::builder()
        .max_retries(3)
        .base_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(10))
        .breaker_failure_threshold(100)
        .build()
        .unwrap()
}

fn pipeline_with(config: ClientConfig, transport: Arc<MockTransport>) -> Pipeline {
    Pipeline::new(&config, transport)
}

fn get(url: &str) -> Request {
    Request::builder(Method::GET, url).build().unwrap()
}

fn timeout_error() -> TransportError {
    TransportError::Timeout(Duration::from_millis(5))
}

#[tokio::test]
async fn server_errors_then_success_reports_attempt_count() {
    // 500 three times then 200; max_retries=3 -> Success with attempt_count 4
    let transport = Arc::new(
        MockTransport::new()
            .respond(500, "boom")
            .respond(500, "boom")
            .respond(500, "boom")
            .respond(200, "finally"),
    );
    let pipeline = pipeline_with(fast_config(), Arc::clone(&transport));

    let response =
        tokio_test::assert_ok!(pipeline.execute(get("https://api.example.com/flaky")).await);

    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.attempt_count, 4);
    assert!(!response.from_cache);
    assert_eq!(transport.calls(), 4);
}

#[tokio::test]
async fn breaker_short_circuits_without_transport_call() {
    // Five consecutive transport timeouts open the breaker; the sixth call is
    // rejected before reaching the transport.
    let transport = Arc::new(MockTransport::new().fail(timeout_error()));
    let config = ClientConfig::builder()
        .max_retries(0)
        .breaker_failure_threshold(5)
        .breaker_open_duration(Duration::from_secs(60))
        .build()
        .unwrap();
    let pipeline = pipeline_with(config, Arc::clone(&transport));

    for _ in 0..5 {
        let outcome = pipeline.execute(get("https://api.example.com/down")).await;
        assert!(matches!(outcome, Err(PipelineError::Transport(_))));
    }
    assert_eq!(transport.calls(), 5);

    let outcome = pipeline.execute(get("https://api.example.com/down")).await;
    assert!(matches!(outcome, Err(PipelineError::CircuitOpen { .. })));
    assert_eq!(transport.calls(), 5);
}

#[tokio::test]
async fn cached_get_makes_zero_transport_calls() {
    let transport = Arc::new(MockTransport::new().respond(200, "user-1"));
    let pipeline = pipeline_with(fast_config(), Arc::clone(&transport));

    let first = pipeline
        .execute(get("https://api.example.com/users/1"))
        .await
        .unwrap();
    assert!(!first.from_cache);
    assert_eq!(first.attempt_count, 1);

    let second = pipeline
        .execute(get("https://api.example.com/users/1"))
        .await
        .unwrap();
    assert!(second.from_cache);
    assert_eq!(second.attempt_count, 0);
    assert_eq!(second.text(), "user-1");
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn cache_ttl_expiry_forces_transport_call() {
    let transport = Arc::new(MockTransport::new().respond(200, "fresh"));
    let config = ClientConfig::builder()
        .cache_default_ttl(Duration::from_millis(20))
        .build()
        .unwrap();
    let pipeline = pipeline_with(config, Arc::clone(&transport));

    pipeline
        .execute(get("https://api.example.com/users/1"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let after_expiry = pipeline
        .execute(get("https://api.example.com/users/1"))
        .await
        .unwrap();
    assert!(!after_expiry.from_cache);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn cache_opt_out_always_hits_transport() {
    let transport = Arc::new(MockTransport::new().respond(200, "ok"));
    let pipeline = pipeline_with(fast_config(), Arc::clone(&transport));

    let request = Request::builder(Method::GET, "https://api.example.com/x")
        .no_cache()
        .build()
        .unwrap();
    pipeline.execute(request.clone()).await.unwrap();
    pipeline.execute(request).await.unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn cache_hit_bypasses_open_breaker() {
    // A cache hit is served even when the target's breaker is open.
    let transport = Arc::new(
        MockTransport::new()
            .respond(200, "cached")
            .fail(timeout_error()),
    );
    let config = ClientConfig::builder()
        .max_retries(0)
        .breaker_failure_threshold(1)
        .breaker_open_duration(Duration::from_secs(60))
        .build()
        .unwrap();
    let pipeline = pipeline_with(config, Arc::clone(&transport));

    // Populate the cache, then open the breaker with an uncacheable call.
    pipeline
        .execute(get("https://api.example.com/users/1"))
        .await
        .unwrap();
    let uncached = Request::builder(Method::GET, "https://api.example.com/other")
        .build()
        .unwrap();
    let _ = pipeline.execute(uncached).await;
    let target = TargetKey::custom("https://api.example.com");
    assert_eq!(
        pipeline.breakers().breaker(&target).state(),
        CircuitState::Open
    );

    let hit = pipeline
        .execute(get("https://api.example.com/users/1"))
        .await
        .unwrap();
    assert!(hit.from_cache);
}

#[tokio::test]
async fn rate_limited_second_call_is_rejected_and_not_retried() {
    let transport = Arc::new(MockTransport::new().respond(200, "ok"));
    let config = ClientConfig::builder()
        .rate_limit_rps(1.0)
        .rate_limit_burst(1)
        .build()
        .unwrap();
    let pipeline = pipeline_with(config, Arc::clone(&transport));

    // Use an uncacheable request so the second call reaches the limiter.
    let request = Request::builder(Method::GET, "https://api.example.com/x")
        .no_cache()
        .build()
        .unwrap();
    pipeline.execute(request.clone()).await.unwrap();

    let outcome = pipeline.execute(request).await;
    assert!(matches!(outcome, Err(PipelineError::RateLimited { .. })));
    // Rejection is terminal: no retries consumed a transport call
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn non_idempotent_request_is_attempted_exactly_once() {
    let transport = Arc::new(MockTransport::new().fail(timeout_error()));
    let pipeline = pipeline_with(fast_config(), Arc::clone(&transport));

    let request = Request::builder(Method::POST, "https://api.example.com/orders")
        .body("{}")
        .build()
        .unwrap();
    let outcome = pipeline.execute(request).await;

    assert!(matches!(outcome, Err(PipelineError::Transport(_))));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn opted_in_post_is_retried() {
    let transport = Arc::new(
        MockTransport::new()
            .fail(timeout_error())
            .respond(201, "created"),
    );
    let pipeline = pipeline_with(fast_config(), Arc::clone(&transport));

    let request = Request::builder(Method::POST, "https://api.example.com/orders")
        .idempotent()
        .build()
        .unwrap();
    let response = pipeline.execute(request).await.unwrap();
    assert_eq!(response.status.as_u16(), 201);
    assert_eq!(response.attempt_count, 2);
}

#[tokio::test]
async fn exhausted_budget_carries_last_error() {
    let transport = Arc::new(MockTransport::new().respond(503, "unavailable"));
    let config = ClientConfig::builder()
        .max_retries(2)
        .base_delay(Duration::from_millis(1))
        .breaker_failure_threshold(100)
        .build()
        .unwrap();
    let pipeline = pipeline_with(config, Arc::clone(&transport));

    let outcome = pipeline.execute(get("https://api.example.com/x")).await;
    match outcome {
        Err(PipelineError::RetryBudgetExhausted { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert!(matches!(
                *last,
                PipelineError::HttpStatus { status: 503, .. }
            ));
        }
        other => panic!("expected RetryBudgetExhausted, got {:?}", other.err()),
    }
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn terminal_4xx_is_not_retried_and_spares_the_breaker() {
    let transport = Arc::new(MockTransport::new().respond(404, "no such user"));
    let config = ClientConfig::builder()
        .breaker_failure_threshold(2)
        .build()
        .unwrap();
    let pipeline = pipeline_with(config, Arc::clone(&transport));

    for _ in 0..5 {
        let outcome = pipeline.execute(get("https://api.example.com/users/9")).await;
        assert!(matches!(
            outcome,
            Err(PipelineError::HttpStatus { status: 404, .. })
        ));
    }
    // One transport call per logical call: 4xx is terminal immediately
    assert_eq!(transport.calls(), 5);
    // And none of them counted toward the breaker
    let target = TargetKey::custom("https://api.example.com");
    assert_eq!(
        pipeline.breakers().breaker(&target).state(),
        CircuitState::Closed
    );
}

#[tokio::test]
async fn breaker_opening_mid_retry_aborts_remaining_retries() {
    let transport = Arc::new(MockTransport::new().fail(timeout_error()));
    let config = ClientConfig::builder()
        .max_retries(5)
        .base_delay(Duration::from_millis(1))
        .breaker_failure_threshold(2)
        .breaker_open_duration(Duration::from_secs(60))
        .build()
        .unwrap();
    let pipeline = pipeline_with(config, Arc::clone(&transport));

    let outcome = pipeline.execute(get("https://api.example.com/x")).await;
    // Two transport failures opened the breaker; the third attempt was
    // rejected at the gate, which is terminal.
    assert!(matches!(outcome, Err(PipelineError::CircuitOpen { .. })));
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn breaker_recovers_through_half_open_trial() {
    let transport = Arc::new(
        MockTransport::new()
            .fail(timeout_error())
            .respond(200, "recovered"),
    );
    let config = ClientConfig::builder()
        .max_retries(0)
        .breaker_failure_threshold(1)
        .breaker_open_duration(Duration::from_millis(20))
        .breaker_half_open_trials(1)
        .build()
        .unwrap();
    let pipeline = pipeline_with(config, Arc::clone(&transport));

    let request = Request::builder(Method::GET, "https://api.example.com/x")
        .no_cache()
        .build()
        .unwrap();
    let _ = pipeline.execute(request.clone()).await;
    let target = TargetKey::custom("https://api.example.com");
    assert_eq!(
        pipeline.breakers().breaker(&target).state(),
        CircuitState::Open
    );

    tokio::time::sleep(Duration::from_millis(30)).await;

    let response = pipeline.execute(request).await.unwrap();
    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(
        pipeline.breakers().breaker(&target).state(),
        CircuitState::Closed
    );
}

#[tokio::test]
async fn overall_deadline_refuses_late_retries() {
    // Transport takes 60ms to fail; deadline is 100ms: at most one retry
    // starts, and the outcome is DeadlineExceeded.
    let transport = Arc::new(
        MockTransport::new()
            .with_delay(Duration::from_millis(60))
            .fail(TransportError::ConnectionRefused("refused".to_string())),
    );
    let config = ClientConfig::builder()
        .max_retries(5)
        .base_delay(Duration::from_millis(1))
        .breaker_failure_threshold(100)
        .build()
        .unwrap();
    let pipeline = pipeline_with(config, Arc::clone(&transport));

    let request = Request::builder(Method::GET, "https://api.example.com/slow")
        .deadline(Duration::from_millis(100))
        .build()
        .unwrap();
    let outcome = pipeline.execute(request).await;

    assert!(matches!(outcome, Err(PipelineError::DeadlineExceeded { .. })));
    assert!(transport.calls() <= 2);
}

#[tokio::test]
async fn per_attempt_timeout_is_enforced_by_the_pipeline() {
    let transport = Arc::new(
        MockTransport::new()
            .with_delay(Duration::from_millis(50))
            .respond(200, "too late"),
    );
    let config = ClientConfig::builder()
        .max_retries(0)
        .per_attempt_timeout(Duration::from_millis(10))
        .build()
        .unwrap();
    let pipeline = pipeline_with(config, Arc::clone(&transport));

    let outcome = pipeline.execute(get("https://api.example.com/slow")).await;
    assert!(matches!(
        outcome,
        Err(PipelineError::Transport(TransportError::Timeout(_)))
    ));
}

// Plugin behavior ---------------------------------------------------------

struct RecordingPlugin {
    label: &'static str,
    events: Arc<Mutex<Vec<String>>>,
    fail_before: bool,
}

impl RecordingPlugin {
    fn new(label: &'static str, events: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            label,
            events,
            fail_before: false,
        })
    }

    fn failing(label: &'static str, events: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            label,
            events,
            fail_before: true,
        })
    }
}

#[async_trait::async_trait]
impl Plugin for RecordingPlugin {
    fn name(&self) -> &str {
        self.label
    }

    async fn before_request(&self, request: Request) -> Result<Request, PipelineError> {
        self.events.lock().unwrap().push(format!("before:{}", self.label));
        if self.fail_before {
            return Err(PipelineError::Plugin {
                plugin: self.label.to_string(),
                message: "rejected".to_string(),
            });
        }
        Ok(request)
    }

    async fn after_response(&self, outcome: Outcome) -> Outcome {
        self.events.lock().unwrap().push(format!("after:{}", self.label));
        outcome
    }
}

#[tokio::test]
async fn hooks_run_in_symmetric_wrapping_order() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let transport = Arc::new(MockTransport::new().respond(200, "ok"));
    let mut pipeline = pipeline_with(fast_config(), transport);
    pipeline.register(RecordingPlugin::new("a", Arc::clone(&events)));
    pipeline.register(RecordingPlugin::new("b", Arc::clone(&events)));

    pipeline
        .execute(get("https://api.example.com/x"))
        .await
        .unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec!["before:a", "before:b", "after:b", "after:a"]
    );
}

#[tokio::test]
async fn hook_failure_short_circuits_but_earlier_plugins_observe() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let transport = Arc::new(MockTransport::new().respond(200, "ok"));
    let mut pipeline = pipeline_with(fast_config(), Arc::clone(&transport));
    pipeline.register(RecordingPlugin::new("a", Arc::clone(&events)));
    pipeline.register(RecordingPlugin::failing("b", Arc::clone(&events)));
    pipeline.register(RecordingPlugin::new("c", Arc::clone(&events)));

    let outcome = pipeline.execute(get("https://api.example.com/x")).await;

    assert!(matches!(outcome, Err(PipelineError::Plugin { .. })));
    // No transport call, no hook for c, but a still observed the abort
    assert_eq!(transport.calls(), 0);
    assert_eq!(
        *events.lock().unwrap(),
        vec!["before:a", "before:b", "after:a"]
    );
}

struct PanickingPlugin;

#[async_trait::async_trait]
impl Plugin for PanickingPlugin {
    fn name(&self) -> &str {
        "panicker"
    }

    async fn before_request(&self, _request: Request) -> Result<Request, PipelineError> {
        panic!("plugin bug");
    }
}

#[tokio::test]
async fn hook_panic_becomes_plugin_failure_and_pipeline_survives() {
    let transport = Arc::new(MockTransport::new().respond(200, "ok"));
    let mut pipeline = pipeline_with(fast_config(), Arc::clone(&transport));
    pipeline.register(Arc::new(PanickingPlugin));

    let outcome = pipeline.execute(get("https://api.example.com/x")).await;
    match outcome {
        Err(PipelineError::Plugin { plugin, .. }) => assert_eq!(plugin, "panicker"),
        other => panic!("expected plugin failure, got {:?}", other.err()),
    }
    assert_eq!(transport.calls(), 0);
}

struct ReclassifyingPlugin;

#[async_trait::async_trait]
impl Plugin for ReclassifyingPlugin {
    fn name(&self) -> &str {
        "reclassifier"
    }

    async fn after_response(&self, _outcome: Outcome) -> Outcome {
        Err(PipelineError::Configuration {
            message: "tried to flip a success".to_string(),
        })
    }
}

#[tokio::test]
async fn after_response_cannot_reclassify_the_outcome() {
    let transport = Arc::new(MockTransport::new().respond(200, "ok"));
    let mut pipeline = pipeline_with(fast_config(), transport);
    pipeline.register(Arc::new(ReclassifyingPlugin));

    let response = pipeline
        .execute(get("https://api.example.com/x"))
        .await
        .unwrap();
    assert_eq!(response.status.as_u16(), 200);
}

struct UppercasingPlugin;

#[async_trait::async_trait]
impl Plugin for UppercasingPlugin {
    fn name(&self) -> &str {
        "uppercaser"
    }

    async fn after_response(&self, outcome: Outcome) -> Outcome {
        outcome.map(|response| Response {
            body: bytes::Bytes::from(response.text().to_uppercase()),
            ..response
        })
    }
}

#[tokio::test]
async fn after_response_may_transform_the_response() {
    let transport = Arc::new(MockTransport::new().respond(200, "hello"));
    let mut pipeline = pipeline_with(fast_config(), transport);
    pipeline.register(Arc::new(UppercasingPlugin));

    let response = pipeline
        .execute(get("https://api.example.com/x"))
        .await
        .unwrap();
    assert_eq!(response.text(), "HELLO");
}

#[tokio::test]
async fn header_injector_headers_reach_the_cache_key() {
    // Injected headers participate in derivation when opted in; two logical
    // calls with the same injected header share one cache entry.
    let transport = Arc::new(MockTransport::new().respond(200, "ok"));
    let mut pipeline = pipeline_with(fast_config(), Arc::clone(&transport));
    pipeline.register(Arc::new(
        HeaderInjector::new().header("x-tenant", "acme").unwrap(),
    ));

    let request = Request::builder(Method::GET, "https://api.example.com/x")
        .cache_key_header("x-tenant")
        .build()
        .unwrap();
    pipeline.execute(request.clone()).await.unwrap();
    let second = pipeline.execute(request).await.unwrap();

    assert!(second.from_cache);
    assert_eq!(transport.calls(), 1);
}
