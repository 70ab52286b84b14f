//! Circuit breaker guarding calls to one search endpoint.
//!
//! The breaker counts failures inside a trailing window and stops calling the
//! endpoint once they reach the threshold, giving it a cooldown to recover.
//!
//! # States
//!
//! - **Closed**: Normal operation, calls pass through
//! - **Open**: Threshold reached, calls fail fast without touching the transport
//! - **HalfOpen**: Cooldown elapsed, exactly one probe call is let through
//!
//! The probe decides the next state: success closes the circuit and clears the
//! failure count, failure re-opens it and restarts the cooldown. While the
//! probe is in flight every other call is rejected.
//!
//! # Example
//!
//! ```no_run
//! use search_pager::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let config = CircuitBreakerConfig {
//!     failure_threshold: 3,
//!     cooldown: Duration::from_secs(5),
//!     ..Default::default()
//! };
//!
//! let breaker = CircuitBreaker::new("products", config);
//!
//! match breaker.execute(|| async { Ok::<_, std::io::Error>(42) }).await {
//!     Ok(result) => println!("Success: {}", result),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! # }
//! ```

use metrics::{counter, gauge};
use search_pager_core::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation, requests pass through
    Closed,
    /// Too many failures, requests are rejected
    Open,
    /// Testing if the endpoint has recovered
    HalfOpen,
}

impl CircuitState {
    fn gauge_value(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failures inside `failure_window` that open the circuit
    pub failure_threshold: u32,
    /// Time to wait after the last failure before allowing a probe
    pub cooldown: Duration,
    /// Trailing window in which failures are counted
    pub failure_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            failure_window: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(SearchError::Configuration(
                "circuit breaker failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.failure_window.is_zero() {
            return Err(SearchError::Configuration(
                "circuit breaker failure_window must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Circuit breaker errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open (or a probe is already in flight), request rejected
    #[error("Circuit breaker is open for {name}")]
    Open { name: String },

    /// Execution failed with underlying error
    #[error("Execution failed: {0}")]
    ExecutionFailed(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitBreakerError::Open { .. })
    }
}

#[derive(Debug, Default)]
struct CircuitBreakerMetrics {
    failures: AtomicU64,
    successes: AtomicU64,
    opened_count: AtomicU64,
    closed_count: AtomicU64,
    rejected_count: AtomicU64,
}

/// Circuit breaker statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    /// Failures currently counted towards the threshold
    pub failure_count: u32,
    pub failures: u64,
    pub successes: u64,
    pub opened_count: u64,
    pub closed_count: u64,
    pub rejected_count: u64,
}

struct CircuitBreakerState {
    state: CircuitState,
    /// Failure timestamps inside the trailing window, oldest first
    failures: VecDeque<Instant>,
    last_failure_time: Option<Instant>,
    probe_in_flight: bool,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            last_failure_time: None,
            probe_in_flight: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

/// Frees the half-open slot if a probe is dropped before reporting back.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.breaker.lock_state();
            if state.state == CircuitState::HalfOpen {
                state.probe_in_flight = false;
                debug!("Circuit breaker {} probe abandoned", self.breaker.name);
            }
        }
    }
}

/// Circuit breaker for a single logical endpoint.
///
/// State lives behind one mutex that is never held across an await point, so
/// every transition is applied by a single writer.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<CircuitBreakerState>,
    metrics: CircuitBreakerMetrics,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!("Creating circuit breaker: {}", name);
        gauge!("search_circuit_state", "endpoint" => name.clone())
            .set(CircuitState::Closed.gauge_value());

        Self {
            name,
            config,
            state: Mutex::new(CircuitBreakerState::new()),
            metrics: CircuitBreakerMetrics::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock_state(&self) -> MutexGuard<'_, CircuitBreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state. The Open to HalfOpen transition happens on the next
    /// call after the cooldown, so an expired cooldown still reads as Open.
    pub fn state(&self) -> CircuitState {
        self.lock_state().state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let mut state = self.lock_state();
        self.prune_failures(&mut state, Instant::now());

        CircuitBreakerStats {
            state: state.state,
            failure_count: state.failures.len() as u32,
            failures: self.metrics.failures.load(Ordering::Relaxed),
            successes: self.metrics.successes.load(Ordering::Relaxed),
            opened_count: self.metrics.opened_count.load(Ordering::Relaxed),
            closed_count: self.metrics.closed_count.load(Ordering::Relaxed),
            rejected_count: self.metrics.rejected_count.load(Ordering::Relaxed),
        }
    }

    /// Call a function with circuit breaker protection. Every error counts
    /// as an endpoint failure.
    pub async fn execute<F, Fut, T, E>(&self, f: F) -> std::result::Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.execute_classified(f, |_| true).await
    }

    /// Call a function with circuit breaker protection. Errors for which
    /// `is_failure` returns false are passed through but count as a healthy
    /// response from the endpoint.
    pub async fn execute_classified<F, Fut, T, E, C>(
        &self,
        f: F,
        is_failure: C,
    ) -> std::result::Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        C: FnOnce(&E) -> bool,
    {
        let admission = self.before_call()?;
        let mut guard = ProbeGuard {
            breaker: self,
            armed: admission == Admission::Probe,
        };

        let result = f().await;
        guard.armed = false;

        match &result {
            Ok(_) => self.on_success(admission),
            Err(e) if is_failure(e) => self.on_failure(admission),
            Err(_) => self.on_success(admission),
        }

        result.map_err(CircuitBreakerError::ExecutionFailed)
    }

    fn before_call<E>(&self) -> std::result::Result<Admission, CircuitBreakerError<E>> {
        let mut state = self.lock_state();

        match state.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let cooled_down = state
                    .last_failure_time
                    .map_or(true, |last| last.elapsed() >= self.config.cooldown);

                if cooled_down {
                    info!("Circuit breaker {} transitioning to half-open", self.name);
                    self.transition(&mut state, CircuitState::HalfOpen);
                    state.probe_in_flight = true;
                    Ok(Admission::Probe)
                } else {
                    Err(self.reject())
                }
            }
            CircuitState::HalfOpen => {
                if state.probe_in_flight {
                    Err(self.reject())
                } else {
                    state.probe_in_flight = true;
                    Ok(Admission::Probe)
                }
            }
        }
    }

    fn reject<E>(&self) -> CircuitBreakerError<E> {
        self.metrics.rejected_count.fetch_add(1, Ordering::Relaxed);
        counter!("search_circuit_rejections_total", "endpoint" => self.name.clone()).increment(1);
        debug!("Circuit breaker {} rejected call", self.name);
        CircuitBreakerError::Open {
            name: self.name.clone(),
        }
    }

    fn on_success(&self, admission: Admission) {
        let mut state = self.lock_state();
        self.metrics.successes.fetch_add(1, Ordering::Relaxed);

        match (state.state, admission) {
            (CircuitState::Closed, _) => {
                state.failures.clear();
            }
            (CircuitState::HalfOpen, Admission::Probe) => {
                info!("Circuit breaker {} closing after successful probe", self.name);
                state.failures.clear();
                state.probe_in_flight = false;
                self.transition(&mut state, CircuitState::Closed);
                self.metrics.closed_count.fetch_add(1, Ordering::Relaxed);
            }
            // a call admitted before the circuit opened does not decide recovery
            _ => {}
        }
    }

    fn on_failure(&self, admission: Admission) {
        let mut state = self.lock_state();
        let now = Instant::now();
        self.metrics.failures.fetch_add(1, Ordering::Relaxed);

        match (state.state, admission) {
            (CircuitState::Closed, _) => {
                state.failures.push_back(now);
                state.last_failure_time = Some(now);
                self.prune_failures(&mut state, now);

                if state.failures.len() >= self.config.failure_threshold as usize {
                    warn!(
                        "Circuit breaker {} opening after {} failures",
                        self.name,
                        state.failures.len()
                    );
                    self.transition(&mut state, CircuitState::Open);
                    self.metrics.opened_count.fetch_add(1, Ordering::Relaxed);
                }
            }
            (CircuitState::HalfOpen, Admission::Probe) => {
                warn!(
                    "Circuit breaker {} re-opening due to failed probe",
                    self.name
                );
                state.last_failure_time = Some(now);
                state.probe_in_flight = false;
                self.transition(&mut state, CircuitState::Open);
                self.metrics.opened_count.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    fn prune_failures(&self, state: &mut CircuitBreakerState, now: Instant) {
        while let Some(&oldest) = state.failures.front() {
            if now.saturating_duration_since(oldest) > self.config.failure_window {
                state.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn transition(&self, state: &mut CircuitBreakerState, next: CircuitState) {
        state.state = next;
        gauge!("search_circuit_state", "endpoint" => self.name.clone()).set(next.gauge_value());
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut state = self.lock_state();
        info!("Manually resetting circuit breaker: {}", self.name);
        state.failures.clear();
        state.last_failure_time = None;
        state.probe_in_flight = false;
        self.transition(&mut state, CircuitState::Closed);
    }
}
