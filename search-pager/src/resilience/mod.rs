//! Resilience patterns guarding calls to a search endpoint.
//!
//! - **Rate limiter**: sliding-window admission control, FIFO across callers
//! - **Circuit breaker**: fails fast while the endpoint is unhealthy
//! - **Retry**: exponential backoff with jitter for transient failures
//!
//! One instance of the limiter and the breaker exists per logical endpoint
//! and is shared by every chain that targets it. The executor applies them
//! to each transport attempt in this order:
//!
//! ```text
//! retry( rate limiter -> circuit breaker -> timeout(transport) )
//! ```
//!
//! # Example
//!
//! ```no_run
//! use search_pager::resilience::{
//!     retry_with_context, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError,
//!     ExponentialBackoff, RateLimitConfig, RateLimiter, RetryConfig,
//! };
//! use std::time::Duration;
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(RateLimitConfig::new(10, Duration::from_secs(1)));
//! let breaker = CircuitBreaker::new("products", CircuitBreakerConfig::default());
//! let policy = ExponentialBackoff::new(RetryConfig::default());
//! let (limiter, breaker) = (&limiter, &breaker);
//!
//! let result = retry_with_context(
//!     &policy,
//!     "products",
//!     |_ctx| async move {
//!         let permit = limiter.acquire().await;
//!         breaker
//!             .execute(|| async move {
//!                 permit.commit();
//!                 Ok::<_, std::io::Error>(42)
//!             })
//!             .await
//!     },
//!     |e: &CircuitBreakerError<std::io::Error>| !e.is_open(),
//! )
//! .await;
//! # }
//! ```

pub mod circuit_breaker;
pub mod rate_limit;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerStats, CircuitState,
};
pub use rate_limit::{RateLimitConfig, RateLimitInfo, RateLimiter, RatePermit};
pub use retry::{
    retry, retry_with_context, ExponentialBackoff, RetryConfig, RetryContext, RetryError,
    RetryPolicy,
};
