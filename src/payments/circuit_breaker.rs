//! Three-state circuit breaker guarding gateway calls.
//!
//! Closed counts consecutive availability failures and opens once they exceed
//! the threshold. Open rejects immediately until the cooldown elapses, then the
//! next caller finds it half-open. Half-open admits a bounded number of trial
//! calls: enough consecutive successes close it, any failure re-opens it.
//!
//! Every state change starts a new generation; results reported for permits
//! from an older generation are ignored so a slow call cannot flip a breaker
//! that has already moved on.

use crate::payments::error::{GatewayError, GatewayResult};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => f.write_str("closed"),
            CircuitState::Open => f.write_str("open"),
            CircuitState::HalfOpen => f.write_str("half_open"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures tolerated while closed; one more opens the circuit.
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub half_open_max_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(10),
            half_open_max_requests: 2,
        }
    }
}

/// How a guarded call ended, from the breaker's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
    /// Abandoned by the caller; frees the slot without counting.
    Released,
}

impl CallOutcome {
    pub fn of<T>(result: &GatewayResult<T>) -> Self {
        match result {
            Ok(_) => CallOutcome::Success,
            Err(GatewayError::Cancelled { .. }) => CallOutcome::Released,
            Err(e) if e.counts_as_failure() => CallOutcome::Failure,
            Err(_) => CallOutcome::Success,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    generation: u64,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_requests: u32,
    trial_successes: u32,
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                generation: 0,
                consecutive_failures: 0,
                opened_at: None,
                trial_requests: 0,
                trial_successes: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // The critical sections never panic, so a poisoned lock still holds
        // consistent counters.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
        }
    }

    /// Reserves a slot for one call, or fails fast with
    /// [`GatewayError::Unavailable`]. The permit reports
    /// [`CallOutcome::Released`] if dropped without being settled.
    pub fn try_acquire(&self) -> GatewayResult<Permit<'_>> {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());

        match inner.state {
            CircuitState::Closed => {}
            CircuitState::Open => return Err(GatewayError::Unavailable),
            CircuitState::HalfOpen => {
                if inner.trial_requests >= self.config.half_open_max_requests {
                    return Err(GatewayError::Unavailable);
                }
                inner.trial_requests += 1;
            }
        }

        Ok(Permit {
            breaker: self,
            generation: inner.generation,
            outcome: CallOutcome::Released,
        })
    }

    /// Runs `call` under the breaker. `call` is not polled when the circuit
    /// rejects the attempt.
    pub async fn call<T, F>(&self, call: F) -> GatewayResult<T>
    where
        F: Future<Output = GatewayResult<T>>,
    {
        let mut permit = self.try_acquire()?;
        let result = call.await;
        permit.settle(CallOutcome::of(&result));
        result
    }

    fn refresh(&self, inner: &mut Inner, now: Instant) {
        if inner.state != CircuitState::Open {
            return;
        }
        let cooled = inner
            .opened_at
            .map(|opened| now.duration_since(opened) >= self.config.cooldown)
            .unwrap_or(true);
        if cooled {
            self.set_state(inner, CircuitState::HalfOpen, now);
        }
    }

    fn on_result(&self, generation: u64, outcome: CallOutcome) {
        let mut inner = self.lock();
        let now = Instant::now();
        self.refresh(&mut inner, now);
        if generation != inner.generation {
            return;
        }

        match (inner.state, outcome) {
            (CircuitState::Closed, CallOutcome::Success) => {
                inner.consecutive_failures = 0;
            }
            (CircuitState::Closed, CallOutcome::Failure) => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures > self.config.failure_threshold {
                    self.set_state(&mut inner, CircuitState::Open, now);
                }
            }
            (CircuitState::HalfOpen, CallOutcome::Success) => {
                inner.trial_successes += 1;
                if inner.trial_successes >= self.config.half_open_max_requests {
                    self.set_state(&mut inner, CircuitState::Closed, now);
                }
            }
            (CircuitState::HalfOpen, CallOutcome::Failure) => {
                self.set_state(&mut inner, CircuitState::Open, now);
            }
            (CircuitState::HalfOpen, CallOutcome::Released) => {
                inner.trial_requests = inner.trial_requests.saturating_sub(1);
            }
            (CircuitState::Closed, CallOutcome::Released) | (CircuitState::Open, _) => {}
        }
    }

    fn set_state(&self, inner: &mut Inner, to: CircuitState, now: Instant) {
        let from = inner.state;
        if from == to {
            return;
        }

        inner.state = to;
        inner.generation += 1;
        inner.trial_requests = 0;
        inner.trial_successes = 0;
        match to {
            CircuitState::Open => inner.opened_at = Some(now),
            CircuitState::Closed => {
                inner.opened_at = None;
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {}
        }

        match to {
            CircuitState::Open => warn!(
                breaker = %self.name,
                from = %from,
                to = %to,
                consecutive_failures = inner.consecutive_failures,
                "circuit breaker opened"
            ),
            _ => info!(
                breaker = %self.name,
                from = %from,
                to = %to,
                "circuit breaker state changed"
            ),
        }
    }
}

/// A reserved call slot. Settle it with the call's outcome; dropping it
/// unsettled releases the slot.
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    outcome: CallOutcome,
}

impl Permit<'_> {
    pub fn settle(&mut self, outcome: CallOutcome) {
        self.outcome = outcome;
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.breaker.on_result(self.generation, self.outcome);
    }
}
