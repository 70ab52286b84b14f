//! Search Pager
//!
//! Resilient, paginated query execution against a remote search endpoint.
//! Pages are served from a TTL cache when possible; otherwise every request
//! passes a sliding-window rate limiter, a circuit breaker and a retry policy
//! before it reaches the [`Transport`].
//!
//! # Features
//!
//! - **Three paging strategies**: offset, range (keyset) and search-after,
//!   all behind one lazy page stream
//! - **Endpoint guards**: rate limiting, circuit breaking and retries with
//!   exponential backoff and jitter, shared by every chain
//! - **Bounded parallelism**: batch and parallel offset fetches run through a
//!   FIFO queue capped at `max_concurrent`
//! - **Resumable chains**: every page carries an opaque continuation token
//! - **Observability**: `tracing` logs, `metrics` counters and a rolling
//!   performance report with threshold alerts
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use search_pager::{PaginationStrategy, SearchClient, SearchOptions};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example(transport: Arc<dyn search_pager::Transport>) -> search_pager::Result<()> {
//! let options = SearchOptions::new(25)
//!     .with_rate_limit(20, Duration::from_secs(1))
//!     .with_circuit_breaker(5, Duration::from_secs(30))
//!     .with_max_retries(3);
//!
//! let client = SearchClient::builder()
//!     .transport(transport)
//!     .options(&options)
//!     .build()?;
//!
//! let records = client
//!     .collect_all("*", &options, PaginationStrategy::range("id"))
//!     .await?;
//! println!("fetched {} records", records.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! Endpoint settings can also come from files and the environment:
//!
//! ```rust,no_run
//! use search_pager::ClientConfig;
//!
//! # fn example() -> search_pager::Result<()> {
//! // config/default.toml, config/local.toml, then SEARCH_PAGER__* variables
//! let config = ClientConfig::load()?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod executor;
pub mod observability;
pub mod pagination;
pub mod performance;
pub mod resilience;

pub use observability::telemetry;

pub use client::{PageStream, SearchClient, SearchClientBuilder};
pub use config::ClientConfig;
pub use executor::{CallOptions, Fetched, QueryExecutor};
pub use observability::{Alert, AlertSeverity, PerformanceMonitor, PerformanceReport};
pub use pagination::{ChainQuery, ChainState, PageStrategy, PaginationEngine};
pub use performance::{CacheStatistics, ConcurrencyQueue, QueryCache};
pub use resilience::{CircuitBreaker, CircuitState, ExponentialBackoff, RateLimiter};

pub use search_pager_core::{
    PageCursor, PaginationStrategy, Record, Result, ResultPage, SearchError, SearchOptions,
    SearchRequest, SortField, Transport, TransportError, TransportResponse,
};
