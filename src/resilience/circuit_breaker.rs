//! Per-target circuit breaker state machine.

use crate::config::CircuitBreakerConfig;
use crate::types::TargetKey;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Circuit breaker state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CircuitState {
    /// Calls pass through; failures increment the consecutive-failure counter
    Closed,
    /// Calls are rejected immediately; no transport call is attempted
    Open,
    /// A limited number of trial calls probe for recovery
    HalfOpen,
}

/// Hook invoked on breaker state transitions.
pub trait CircuitBreakerHook: Send + Sync {
    /// Called after the breaker for `target` moves from `old` to `new`.
    ///
    /// Runs with the breaker's internal lock held; implementations must not
    /// call back into the breaker.
    fn on_state_change(&self, target: &TargetKey, old: CircuitState, new: CircuitState);
}

// The whole (state, counters, timestamp, trial slot) tuple lives under one
// mutex so two callers can never race a Closed->Open transition or double-book
// the half-open trial slot. The lock is only held around the state read/write,
// never across the transport call.
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    changed_at: Instant,
    trial_in_flight: bool,
}

/// Circuit breaker for a single target.
pub struct CircuitBreaker {
    target: TargetKey,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    hook: Option<Arc<dyn CircuitBreakerHook>>,
}

impl CircuitBreaker {
    /// Create a breaker for the target, starting Closed.
    pub fn new(
        target: TargetKey,
        config: CircuitBreakerConfig,
        hook: Option<Arc<dyn CircuitBreakerHook>>,
    ) -> Self {
        Self {
            target,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                changed_at: Instant::now(),
                trial_in_flight: false,
            }),
            hook,
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Ask to pass a call through the breaker.
    ///
    /// While HalfOpen at most one trial is admitted; concurrent callers are
    /// rejected rather than queued. Returns the time remaining until a trial
    /// will be admitted when rejecting from Open.
    pub fn try_acquire(self: &Arc<Self>) -> Result<CallPermit, Option<Duration>> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(self.permit(false)),
            CircuitState::Open => {
                let elapsed = inner.changed_at.elapsed();
                if elapsed >= self.config.open_duration {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.trial_in_flight = true;
                    Ok(self.permit(true))
                } else {
                    Err(Some(self.config.open_duration - elapsed))
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(None)
                } else {
                    inner.trial_in_flight = true;
                    Ok(self.permit(true))
                }
            }
        }
    }

    fn permit(self: &Arc<Self>, trial: bool) -> CallPermit {
        CallPermit {
            breaker: Arc::clone(self),
            trial,
            settled: false,
        }
    }

    fn record_success(&self, trial: bool) {
        let mut inner = self.inner.lock();
        if trial {
            inner.trial_in_flight = false;
        }
        match inner.state {
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_trials {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self, trial: bool) {
        let mut inner = self.inner.lock();
        if trial {
            inner.trial_in_flight = false;
        }
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    fn release(&self, trial: bool) {
        if trial {
            self.inner.lock().trial_in_flight = false;
        }
    }

    fn transition(&self, inner: &mut BreakerInner, new_state: CircuitState) {
        let old_state = inner.state;
        if old_state == new_state {
            return;
        }
        inner.state = new_state;
        inner.changed_at = Instant::now();
        inner.half_open_successes = 0;
        if new_state == CircuitState::Closed {
            inner.consecutive_failures = 0;
        }
        tracing::warn!(
            target_key = %self.target,
            ?old_state,
            ?new_state,
            "circuit breaker state change"
        );
        if let Some(hook) = &self.hook {
            hook.on_state_change(&self.target, old_state, new_state);
        }
    }
}

/// Outcome handle for an admitted call.
///
/// Exactly one of [`record_success`](CallPermit::record_success),
/// [`record_failure`](CallPermit::record_failure) or
/// [`release`](CallPermit::release) should be called once the attempt settles.
/// Dropping the permit unsettled (caller cancellation) frees the half-open
/// trial slot without counting either way.
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    trial: bool,
    settled: bool,
}

impl CallPermit {
    /// The call reached the target and it answered healthily.
    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.record_success(self.trial);
    }

    /// The call failed in a way that marks the target unhealthy
    /// (transport failure or 5xx).
    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.record_failure(self.trial);
    }

    /// The call settled in a way that counts neither way (4xx).
    pub fn release(mut self) {
        self.settled = true;
        self.breaker.release(self.trial);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release(self.trial);
        }
    }
}

/// Lazy map of per-target breakers.
///
/// Entries are created on first call and never destroyed; target cardinality
/// is expected to be small and stable. Owned by the client facade, not a
/// module-level singleton, so independently-configured clients stay isolated.
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    hook: Option<Arc<dyn CircuitBreakerHook>>,
    breakers: RwLock<HashMap<TargetKey, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    /// Create a registry applying `config` to every target.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            hook: None,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Install a state-change hook applied to breakers created afterwards.
    pub fn with_hook(mut self, hook: Arc<dyn CircuitBreakerHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Fetch or lazily create the breaker for a target.
    pub fn breaker(&self, target: &TargetKey) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(target) {
            return Arc::clone(breaker);
        }
        let mut breakers = self.breakers.write();
        Arc::clone(breakers.entry(target.clone()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(
                target.clone(),
                self.config.clone(),
                self.hook.clone(),
            ))
        }))
    }

    /// Number of targets tracked so far.
    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    /// True when no target has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
