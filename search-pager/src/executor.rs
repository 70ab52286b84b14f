//! Single-request execution through the endpoint's shared guards.
//!
//! Every page of every chain goes through [`QueryExecutor::execute`]:
//!
//! ```text
//! cache ── hit ──────────────────────────────────────────────► page
//!   │
//!   miss ─► retry( rate limiter ─► circuit breaker ─► timeout(transport) )
//!                                                       │
//!                           monitor sample ◄── cache put ◄┘
//! ```

use search_pager_core::{
    QuerySignature, Result, SearchError, SearchRequest, Transport, TransportError,
    TransportResponse,
};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::observability::monitor::{PerformanceMonitor, PerformanceSample};
use crate::performance::cache::QueryCache;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use crate::resilience::rate_limit::RateLimiter;
use crate::resilience::retry::{retry_with_context, ExponentialBackoff, RetryError};

/// Per-call settings that belong to one chain rather than to the endpoint.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// `None` uses the cache default; zero bypasses the cache.
    pub cache_ttl: Option<Duration>,
    /// Overrides the endpoint retry budget for this call.
    pub max_retries: Option<usize>,
    pub cancel: CancellationToken,
}

impl CallOptions {
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub response: TransportResponse,
    pub from_cache: bool,
}

/// The composed execution pipeline for one logical endpoint. All guards are
/// shared by every chain and queue task that targets the endpoint.
pub struct QueryExecutor {
    endpoint: String,
    transport: Arc<dyn Transport>,
    cache: Arc<QueryCache>,
    limiter: Option<Arc<RateLimiter>>,
    breaker: Arc<CircuitBreaker>,
    retry: ExponentialBackoff,
    request_timeout: Duration,
    monitor: Arc<PerformanceMonitor>,
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("endpoint", &self.endpoint)
            .field("circuit", &self.breaker.state())
            .field("cached", &self.cache.len())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl QueryExecutor {
    pub fn new(transport: Arc<dyn Transport>, config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = config.endpoint.clone();

        Ok(Self {
            cache: Arc::new(QueryCache::named(endpoint.clone(), config.cache_config()?)),
            limiter: config
                .rate_limit_config()
                .map(|c| Arc::new(RateLimiter::named(endpoint.clone(), c))),
            breaker: Arc::new(CircuitBreaker::new(
                endpoint.clone(),
                config.circuit_breaker_config(),
            )),
            retry: ExponentialBackoff::new(config.retry_config()),
            request_timeout: config.request_timeout(),
            monitor: Arc::new(PerformanceMonitor::named(
                endpoint.clone(),
                config.monitor_config(),
            )),
            transport,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.limiter.as_ref()
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn retry_policy(&self) -> &ExponentialBackoff {
        &self.retry
    }

    /// Runs one request: cache lookup, then the guarded transport call.
    pub async fn execute(&self, request: &SearchRequest, options: &CallOptions) -> Result<Fetched> {
        request.validate()?;

        if options.cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let started = Instant::now();
        let use_cache = options.cache_ttl != Some(Duration::ZERO);
        let signature = QuerySignature::of(request);

        if use_cache {
            if let Some(response) = self.cache.get(&signature) {
                debug!(endpoint = %self.endpoint, signature = %signature.as_str(), "Serving page from cache");
                self.monitor
                    .record(PerformanceSample::new(started.elapsed(), true, true));
                return Ok(Fetched {
                    response,
                    from_cache: true,
                });
            }
        }

        let result = tokio::select! {
            biased;
            _ = options.cancel.cancelled() => {
                debug!(endpoint = %self.endpoint, "Request cancelled");
                return Err(SearchError::Cancelled);
            }
            result = self.call_transport(request, options.max_retries) => result,
        };

        self.monitor
            .record(PerformanceSample::new(started.elapsed(), result.is_ok(), false));

        let response = result?;
        if use_cache {
            let ttl = options
                .cache_ttl
                .unwrap_or(self.cache.config().default_ttl);
            self.cache.put_request(request, response.clone(), ttl);
        }

        Ok(Fetched {
            response,
            from_cache: false,
        })
    }

    async fn call_transport(
        &self,
        request: &SearchRequest,
        max_retries: Option<usize>,
    ) -> Result<TransportResponse> {
        let policy = match max_retries {
            Some(retries) => Cow::Owned(ExponentialBackoff::new(
                self.retry.config().with_max_retries(retries),
            )),
            None => Cow::Borrowed(&self.retry),
        };

        let transport = &*self.transport;
        let limiter = self.limiter.as_deref();
        let breaker = &*self.breaker;
        let timeout = self.request_timeout;

        let outcome = retry_with_context(
            &*policy,
            &self.endpoint,
            |_ctx| async move {
                let permit = match limiter {
                    Some(limiter) => Some(limiter.acquire().await),
                    None => None,
                };

                breaker
                    .execute_classified(
                        move || async move {
                            if let Some(permit) = permit {
                                permit.commit();
                            }
                            match tokio::time::timeout(timeout, transport.send(request)).await {
                                Ok(result) => result,
                                Err(_) => Err(TransportError::Timeout(timeout)),
                            }
                        },
                        TransportError::is_retryable,
                    )
                    .await
            },
            |err: &CircuitBreakerError<TransportError>| match err {
                CircuitBreakerError::Open { .. } => false,
                CircuitBreakerError::ExecutionFailed(e) => e.is_retryable(),
            },
        )
        .await;

        outcome.map_err(|RetryError { error, attempts }| match error {
            CircuitBreakerError::Open { name } => {
                warn!(endpoint = %name, "Circuit open, failing fast");
                SearchError::CircuitOpen { endpoint: name }
            }
            CircuitBreakerError::ExecutionFailed(source) => {
                warn!(endpoint = %self.endpoint, attempts, error = %source, "Search request failed");
                SearchError::Transport { attempts, source }
            }
        })
    }
}
