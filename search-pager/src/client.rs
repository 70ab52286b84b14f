//! The Query API.
//!
//! A [`SearchClient`] owns the guards of one logical endpoint (cache, rate
//! limiter, circuit breaker, retry policy, monitor and concurrency queue) and
//! hands out lazy page streams that all go through them.
//!
//! # Example
//!
//! ```no_run
//! use futures::TryStreamExt;
//! use search_pager::{PaginationStrategy, SearchClient, SearchOptions, SortField};
//! # use std::sync::Arc;
//! # async fn example(transport: Arc<dyn search_pager::Transport>) -> search_pager::Result<()> {
//! let options = SearchOptions::new(50).with_filter("category eq 'laptops'");
//! let client = SearchClient::builder()
//!     .transport(transport)
//!     .options(&options)
//!     .build()?;
//!
//! let strategy = PaginationStrategy::search_after(vec![
//!     SortField::desc("@search.score"),
//!     SortField::asc("id"),
//! ]);
//! let mut pages = client.search("gaming", &options, strategy)?;
//! while let Some(page) = pages.try_next().await? {
//!     println!("page {} has {} records", page.page_number, page.len());
//! }
//! # Ok(())
//! # }
//! ```

use futures::future::join_all;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use search_pager_core::{
    PageCursor, PaginationStrategy, Record, Result, ResultPage, SearchError, SearchOptions,
    SearchRequest, Transport,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, RateLimitSettings};
use crate::executor::{CallOptions, QueryExecutor};
use crate::observability::monitor::PerformanceReport;
use crate::pagination::offset::offset_cursor;
use crate::pagination::{ChainQuery, ChainState, PaginationEngine};
use crate::performance::cache::CacheStatistics;
use crate::performance::queue::ConcurrencyQueue;
use crate::resilience::circuit_breaker::{CircuitBreakerStats, CircuitState};

/// Lazy sequence of pages for one chain. Ends after the last page or after
/// the first error.
pub type PageStream = BoxStream<'static, Result<ResultPage>>;

pub struct SearchClient {
    executor: Arc<QueryExecutor>,
    queue: ConcurrencyQueue,
    config: ClientConfig,
    cancel: CancellationToken,
}

impl std::fmt::Debug for SearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchClient")
            .field("executor", &self.executor)
            .field("queue", &self.queue)
            .finish()
    }
}

#[derive(Default)]
pub struct SearchClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    config: Option<ClientConfig>,
    options: Option<SearchOptions>,
    endpoint: Option<String>,
}

impl SearchClientBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Binds the endpoint-scoped settings of a Query API option object.
    pub fn options(mut self, options: &SearchOptions) -> Self {
        self.options = Some(options.clone());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Result<SearchClient> {
        let transport = self.transport.ok_or_else(|| {
            SearchError::Configuration("a transport is required to build a client".to_string())
        })?;

        let mut config = self.config.unwrap_or_default();
        if let Some(options) = &self.options {
            options.check()?;
            config = config.with_options(options);
        }
        config.endpoint = match self.endpoint {
            Some(endpoint) => endpoint,
            None if config.endpoint == ClientConfig::default().endpoint => {
                transport.endpoint().to_string()
            }
            None => config.endpoint,
        };

        SearchClient::new(transport, config)
    }
}

impl SearchClient {
    pub fn builder() -> SearchClientBuilder {
        SearchClientBuilder::default()
    }

    /// Must be called inside a Tokio runtime.
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Result<Self> {
        let executor = Arc::new(QueryExecutor::new(transport, &config)?);
        let queue = ConcurrencyQueue::new(config.endpoint.clone(), config.queue_config());

        info!(
            endpoint = %config.endpoint,
            max_concurrent = config.queue.max_concurrent,
            rate_limited = config.rate_limit.is_some(),
            "Search client ready"
        );

        Ok(Self {
            executor,
            queue,
            config,
            cancel: CancellationToken::new(),
        })
    }

    pub fn endpoint(&self) -> &str {
        self.executor.endpoint()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn executor(&self) -> &Arc<QueryExecutor> {
        &self.executor
    }

    pub fn queue(&self) -> &ConcurrencyQueue {
        &self.queue
    }

    pub fn cache_statistics(&self) -> CacheStatistics {
        self.executor.cache().statistics()
    }

    /// Drops cached pages whose request matches `predicate`, e.g. every
    /// page of a filter after the underlying data changed.
    pub fn invalidate_cached<F>(&self, predicate: F) -> usize
    where
        F: Fn(&SearchRequest) -> bool,
    {
        self.executor.cache().invalidate_requests(predicate)
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.executor.circuit_breaker().state()
    }

    pub fn circuit_stats(&self) -> CircuitBreakerStats {
        self.executor.circuit_breaker().stats()
    }

    pub fn report(&self) -> PerformanceReport {
        self.executor.monitor().report()
    }

    /// Cancels every chain and queued task started by this client. Later
    /// searches fail with `Cancelled`.
    pub fn cancel_all(&self) {
        info!(endpoint = %self.endpoint(), "Cancelling all outstanding searches");
        self.cancel.cancel();
        self.queue.shutdown();
    }

    fn engine(
        &self,
        query_text: &str,
        options: &SearchOptions,
        strategy: PaginationStrategy,
    ) -> Result<PaginationEngine> {
        self.warn_on_endpoint_drift(options);
        let query = ChainQuery::new(query_text, options)?;
        Ok(PaginationEngine::new(Arc::clone(&self.executor), strategy, query)?
            .with_cancellation(self.cancel.child_token()))
    }

    /// Starts a chain. Nothing is sent until the stream is polled, and page
    /// N+1 is requested only after page N has been delivered.
    pub fn search(
        &self,
        query_text: &str,
        options: &SearchOptions,
        strategy: PaginationStrategy,
    ) -> Result<PageStream> {
        let engine = self.engine(query_text, options, strategy)?;
        let state = engine.initial_state();
        debug!(endpoint = %self.endpoint(), strategy = %engine.strategy(), "Starting result chain");
        Ok(page_stream(engine, state))
    }

    /// Continues a chain from a token returned by
    /// [`ResultPage::continuation_token`]. Page numbers restart at 1.
    pub fn resume(
        &self,
        token: &str,
        query_text: &str,
        options: &SearchOptions,
        strategy: PaginationStrategy,
    ) -> Result<PageStream> {
        let cursor = PageCursor::decode(token)?;
        let engine = self.engine(query_text, options, strategy)?;
        let state = engine.resume_state(cursor)?;
        debug!(endpoint = %self.endpoint(), strategy = %engine.strategy(), "Resuming result chain");
        Ok(page_stream(engine, state))
    }

    /// Drains a chain into its records.
    pub async fn collect_all(
        &self,
        query_text: &str,
        options: &SearchOptions,
        strategy: PaginationStrategy,
    ) -> Result<Vec<Record>> {
        let pages: Vec<ResultPage> = self.search(query_text, options, strategy)?.try_collect().await?;
        Ok(pages.into_iter().flat_map(|page| page.records).collect())
    }

    /// Fetches `page_count` offset pages starting at the 0-based `first_page`
    /// in parallel through the queue. Results come back in page order, each
    /// page succeeding or failing on its own; empty pages past the end of the
    /// result set are dropped.
    pub async fn fetch_offset_pages(
        &self,
        query_text: &str,
        options: &SearchOptions,
        first_page: usize,
        page_count: usize,
    ) -> Result<Vec<Result<ResultPage>>> {
        let engine = self.engine(query_text, options, PaginationStrategy::Offset)?;
        let top = engine.query().page_size;
        let call = CallOptions {
            cache_ttl: engine.query().cache_ttl,
            max_retries: engine.query().max_retries,
            cancel: engine.cancellation_token().clone(),
        };

        let mut handles = Vec::with_capacity(page_count);
        for index in first_page..first_page + page_count {
            let cursor = offset_cursor(index, top);
            let request = engine.request_for(&cursor, index == first_page)?;
            let executor = Arc::clone(&self.executor);
            let call = call.clone();

            handles.push(self.queue.submit(async move {
                let fetched = executor.execute(&request, &call).await?;
                let returned = fetched.response.records.len();
                let next_cursor = (returned == top).then(|| offset_cursor(index + 1, top));

                Ok::<_, SearchError>(ResultPage {
                    records: fetched.response.records,
                    total_count: fetched.response.total_count,
                    page_number: index + 1,
                    cursor,
                    next_cursor,
                    raw_cursor: fetched.response.raw_cursor,
                    from_cache: fetched.from_cache,
                })
            }));
        }

        let mut pages: Vec<Result<ResultPage>> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.map_err(SearchError::from).and_then(|page| page))
            .collect();

        while matches!(pages.last(), Some(Ok(page)) if page.is_empty()) {
            pages.pop();
        }

        let total_count = pages
            .iter()
            .find_map(|page| page.as_ref().ok().and_then(|p| p.total_count));
        for page in pages.iter_mut().flatten() {
            page.total_count = page.total_count.or(total_count);
        }

        Ok(pages)
    }

    /// Runs independent chains concurrently through the queue, each chain
    /// strictly sequential. Results are in input order.
    pub async fn search_batch<I, S>(
        &self,
        searches: I,
        strategy: PaginationStrategy,
    ) -> Vec<Result<Vec<ResultPage>>>
    where
        I: IntoIterator<Item = (S, SearchOptions)>,
        S: AsRef<str>,
    {
        let handles: Vec<Result<_>> = searches
            .into_iter()
            .map(|(query_text, options)| {
                self.search(query_text.as_ref(), &options, strategy.clone())
                    .map(|pages| self.queue.submit(pages.try_collect::<Vec<_>>()))
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(match handle {
                Ok(handle) => handle.await.map_err(SearchError::from).and_then(|pages| pages),
                Err(err) => {
                    warn!(endpoint = %self.endpoint(), error = %err, "Rejected batch search");
                    Err(err)
                }
            });
        }
        results
    }

    fn warn_on_endpoint_drift(&self, options: &SearchOptions) {
        if let Some(rate_limit) = options.rate_limit {
            let requested = RateLimitSettings {
                max_requests: rate_limit.max,
                window_ms: rate_limit.window_ms,
            };
            if self.config.rate_limit.as_ref() != Some(&requested) {
                warn!(endpoint = %self.endpoint(), "rateLimit differs from the client's; endpoint settings are fixed at build time");
            }
        }
        if let Some(breaker) = options.circuit_breaker {
            if breaker.threshold != self.config.circuit_breaker.threshold
                || breaker.cooldown_ms != self.config.circuit_breaker.cooldown_ms
            {
                warn!(endpoint = %self.endpoint(), "circuitBreaker differs from the client's; endpoint settings are fixed at build time");
            }
        }
        if let Some(max_concurrent) = options.max_concurrent {
            if max_concurrent != self.config.queue.max_concurrent {
                warn!(endpoint = %self.endpoint(), "maxConcurrent differs from the client's; endpoint settings are fixed at build time");
            }
        }
    }
}

impl Drop for SearchClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn page_stream(engine: PaginationEngine, state: ChainState) -> PageStream {
    stream::unfold(Some((engine, state)), |slot| async move {
        let (engine, state) = slot?;

        match engine.next_page(&state).await {
            // an empty terminal page carries no records; the chain just ends
            Ok((page, _, true)) if page.is_empty() => None,
            Ok((page, next, done)) => {
                let rest = if done { None } else { Some((engine, next)) };
                Some((Ok(page), rest))
            }
            Err(err) => Some((Err(err), None)),
        }
    })
    .boxed()
}
