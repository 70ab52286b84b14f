//! Retry with exponential backoff and jitter.
//!
//! Only idempotent read queries go through this module, so any call may be
//! repeated safely. Errors are classified per call: retryable failures are
//! retried after a growing delay until the attempt budget is spent, fatal
//! ones are returned at once. Either way the error carries the number of
//! attempts made.
//!
//! Dropping the returned future cancels the retry loop, including a pending
//! backoff sleep.
//!
//! # Example
//!
//! ```no_run
//! use search_pager::resilience::retry::{retry, ExponentialBackoff, RetryConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = ExponentialBackoff::new(RetryConfig {
//!     max_attempts: 4,
//!     initial_delay: Duration::from_millis(100),
//!     max_delay: Duration::from_secs(5),
//!     multiplier: 2.0,
//!     jitter: 0.2,
//! });
//!
//! let result = retry(&policy, |_ctx| async {
//!     Ok::<_, std::io::Error>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use metrics::counter;
use rand::Rng;
use search_pager_core::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first call
    pub max_attempts: usize,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Random extra delay as a fraction of the computed delay
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    /// Config allowing `max_retries` retries after the first call.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_attempts = max_retries.saturating_add(1);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(SearchError::Configuration(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        if !(self.multiplier >= 1.0) {
            return Err(SearchError::Configuration(
                "retry multiplier must be at least 1.0".to_string(),
            ));
        }
        if !(self.jitter >= 0.0) {
            return Err(SearchError::Configuration(
                "retry jitter must not be negative".to_string(),
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(SearchError::Configuration(
                "retry max_delay must not be below initial_delay".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for retry policies
pub trait RetryPolicy: Send + Sync {
    /// Delay to wait after `attempts` failed attempts, or `None` when the
    /// attempt budget is spent.
    fn next_delay(&self, attempts: usize) -> Option<Duration>;

    /// Maximum number of attempts
    fn max_attempts(&self) -> usize;
}

/// Exponential backoff: `min(initial * multiplier^n * (1 + jitter), max_delay)`
/// for the n-th retry.
///
/// Jitter is capped at `multiplier - 1`, which keeps the sequence of delays
/// non-decreasing even with random jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: RetryConfig,
}

impl ExponentialBackoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn jitter_fraction(&self) -> f64 {
        self.config
            .jitter
            .min(self.config.multiplier - 1.0)
            .max(0.0)
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: usize) -> Duration {
        let base = self.config.initial_delay.as_secs_f64()
            * self.config.multiplier.powi(retry.min(i32::MAX as usize) as i32);

        let jitter = self.jitter_fraction();
        let factor = if jitter > 0.0 {
            1.0 + rand::thread_rng().gen_range(0.0..jitter)
        } else {
            1.0
        };

        let max = self.config.max_delay.as_secs_f64();
        let delay = (base * factor).min(max);
        if delay.is_finite() {
            Duration::from_secs_f64(delay)
        } else {
            self.config.max_delay
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&self, attempts: usize) -> Option<Duration> {
        if attempts == 0 || attempts >= self.config.max_attempts {
            return None;
        }
        Some(self.delay_for(attempts - 1))
    }

    fn max_attempts(&self) -> usize {
        self.config.max_attempts
    }
}

/// State of one logical call, handed to each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    /// 1-based number of the attempt being made
    pub attempt: usize,
    /// Delay before the next attempt if this one fails; zero on the last attempt
    pub next_delay: Duration,
}

impl RetryContext {
    pub fn is_last(&self, max_attempts: usize) -> bool {
        self.attempt >= max_attempts
    }
}

/// Error wrapper that includes retry attempt information
#[derive(Debug)]
pub struct RetryError<E> {
    /// The underlying error
    pub error: E,
    /// Number of attempts made
    pub attempts: usize,
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Operation failed after {} attempts: {}",
            self.attempts, self.error
        )
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Retry an operation, treating every error as retryable.
pub async fn retry<F, Fut, T, E, P>(policy: &P, f: F) -> std::result::Result<T, RetryError<E>>
where
    F: FnMut(RetryContext) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    P: RetryPolicy + ?Sized,
{
    retry_with_context(policy, "default", f, |_: &E| true).await
}

/// Retry an operation, retrying only errors for which `is_retryable`
/// returns true. `context` names the endpoint in logs and metrics.
pub async fn retry_with_context<F, Fut, T, E, P, C>(
    policy: &P,
    context: &str,
    mut f: F,
    is_retryable: C,
) -> std::result::Result<T, RetryError<E>>
where
    F: FnMut(RetryContext) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    P: RetryPolicy + ?Sized,
    C: Fn(&E) -> bool,
{
    let mut attempt = 1;

    loop {
        let delay = policy.next_delay(attempt);
        let ctx = RetryContext {
            attempt,
            next_delay: delay.unwrap_or_default(),
        };
        debug!("Attempt {}/{} for {}", attempt, policy.max_attempts(), context);

        match f(ctx).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("Operation for {} succeeded after {} attempts", context, attempt);
                }
                return Ok(result);
            }
            Err(e) => {
                if !is_retryable(&e) {
                    debug!("Error for {} is not retryable, giving up", context);
                    return Err(RetryError {
                        error: e,
                        attempts: attempt,
                    });
                }

                match delay {
                    Some(delay) => {
                        debug!("Retrying {} after {:?}", context, delay);
                        counter!("search_retries_total", "endpoint" => context.to_string())
                            .increment(1);
                        sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        warn!("Max retry attempts reached for {} ({})", context, attempt);
                        return Err(RetryError {
                            error: e,
                            attempts: attempt,
                        });
                    }
                }
            }
        }
    }
}
