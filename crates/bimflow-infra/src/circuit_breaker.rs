//! Per-dependency circuit breaker.
//!
//! Outcomes of the last `window_size` calls are kept in a rolling window.
//! Once `minimum_calls` outcomes are recorded and the failure share exceeds
//! `error_threshold_percent`, the breaker opens and rejects calls without
//! running them. After `reset_timeout` one trial call is let through
//! (half-open); its outcome closes or re-opens the breaker.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use utoipa::ToSchema;

use bimflow_core::Config;

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub name: String,
    pub error_threshold_percent: f64,
    pub window_size: usize,
    pub minimum_calls: usize,
    pub call_timeout: Duration,
    pub reset_timeout: Duration,
}

impl CircuitBreakerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error_threshold_percent: 50.0,
            window_size: 10,
            minimum_calls: 5,
            call_timeout: Duration::from_secs(10),
            reset_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &Config) -> Self {
        Self {
            name: name.into(),
            error_threshold_percent: config.breaker_error_threshold_percent(),
            window_size: config.breaker_window_size(),
            minimum_calls: config.breaker_min_calls(),
            call_timeout: config.breaker_timeout(),
            reset_timeout: config.breaker_reset_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    #[error("Circuit breaker '{name}' is open")]
    Open { name: String },

    #[error("Call through breaker '{name}' timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error(transparent)]
    Operation(E),
}

/// Read-only view of a breaker for the status endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub rolling_error_rate: f64,
    pub recorded_calls: usize,
    pub total_calls: u64,
    pub last_state_change: DateTime<Utc>,
}

struct Inner {
    state: BreakerState,
    /// `true` marks a failure.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    last_state_change: DateTime<Utc>,
}

impl Inner {
    fn error_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failures = self.window.iter().filter(|failed| **failed).count();
        failures as f64 * 100.0 / self.window.len() as f64
    }

    fn transition(&mut self, to: BreakerState) {
        self.state = to;
        self.last_state_change = Utc::now();
    }
}

/// An admitted call. Dropping it unsettled (the caller was cancelled)
/// records a failure so a half-open trial can never stay in flight forever.
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl CallPermit<'_> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        self.breaker.record(success, self.trial);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.record(false, self.trial);
        }
    }
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    total_calls: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                window: VecDeque::with_capacity(config.window_size),
                opened_at: None,
                trial_in_flight: false,
                last_state_change: Utc::now(),
            }),
            config,
            total_calls: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Run `op` through the breaker.
    ///
    /// Rejected calls never invoke `op`. A call exceeding `call_timeout` is
    /// dropped and counted as a failure.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.admit()?;
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        match tokio::time::timeout(self.config.call_timeout, op()).await {
            Ok(Ok(value)) => {
                permit.settle(true);
                Ok(value)
            }
            Ok(Err(err)) => {
                permit.settle(false);
                Err(BreakerError::Operation(err))
            }
            Err(_) => {
                permit.settle(false);
                Err(BreakerError::Timeout {
                    name: self.config.name.clone(),
                    timeout: self.config.call_timeout,
                })
            }
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.config.name.clone(),
            state: inner.state,
            rolling_error_rate: inner.error_rate(),
            recorded_calls: inner.window.len(),
            total_calls: self.total_calls.load(Ordering::Relaxed),
            last_state_change: inner.last_state_change,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Critical sections never panic; recover the data if one ever did.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn admit<E>(&self) -> Result<CallPermit<'_>, BreakerError<E>> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => Ok(self.permit(false)),
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if !elapsed {
                    return Err(self.open_error());
                }
                inner.transition(BreakerState::HalfOpen);
                inner.trial_in_flight = true;
                tracing::info!(breaker = %self.config.name, "Circuit breaker half-open, admitting trial call");
                Ok(self.permit(true))
            }
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(self.open_error());
                }
                inner.trial_in_flight = true;
                Ok(self.permit(true))
            }
        }
    }

    fn permit(&self, trial: bool) -> CallPermit<'_> {
        CallPermit {
            breaker: self,
            trial,
            settled: false,
        }
    }

    fn record(&self, success: bool, trial: bool) {
        let mut inner = self.lock();
        if trial {
            inner.trial_in_flight = false;
            if success {
                inner.window.clear();
                inner.opened_at = None;
                inner.transition(BreakerState::Closed);
                tracing::info!(breaker = %self.config.name, "Circuit breaker closed");
            } else {
                inner.opened_at = Some(Instant::now());
                inner.transition(BreakerState::Open);
                tracing::warn!(breaker = %self.config.name, "Trial call failed, circuit breaker re-opened");
            }
        } else {
            // A call admitted while closed may finish after another call opened the breaker
            if inner.state != BreakerState::Closed {
                return;
            }
            if inner.window.len() == self.config.window_size {
                inner.window.pop_front();
            }
            inner.window.push_back(!success);

            let rate = inner.error_rate();
            if inner.window.len() >= self.config.minimum_calls
                && rate > self.config.error_threshold_percent
            {
                inner.opened_at = Some(Instant::now());
                inner.transition(BreakerState::Open);
                tracing::warn!(
                    breaker = %self.config.name,
                    error_rate = rate,
                    recorded_calls = inner.window.len(),
                    "Circuit breaker opened"
                );
            }
        }
    }

    fn open_error<E>(&self) -> BreakerError<E> {
        BreakerError::Open {
            name: self.config.name.clone(),
        }
    }
}
