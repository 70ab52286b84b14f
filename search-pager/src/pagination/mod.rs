//! Paging strategies behind one engine.
//!
//! A chain is started with a [`PaginationStrategy`]; the engine turns it into
//! a [`PageStrategy`] once and from then on every page goes through the same
//! `next_page` contract regardless of how the cursor advances.
//!
//! | Strategy       | Request                          | Done when          |
//! |----------------|----------------------------------|--------------------|
//! | Offset         | `skip = n * top`                 | short page, or `skip` reaches the count |
//! | Range          | `key gt <last key>`, `key asc`   | empty page         |
//! | SearchAfter    | `searchAfter = <last sort tuple>`| short page         |

pub mod offset;
pub mod range;
pub mod search_after;

use search_pager_core::{
    PageCursor, PaginationStrategy, Result, ResultPage, SearchError, SearchOptions,
    SearchRequest, TransportResponse,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::executor::{CallOptions, QueryExecutor};

pub use offset::OffsetPaging;
pub use range::RangePaging;
pub use search_after::SearchAfterPaging;

/// The chain-scoped part of a search: everything but the cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainQuery {
    pub query_text: String,
    pub filter: Option<String>,
    pub order_by: Vec<String>,
    pub select: Vec<String>,
    pub page_size: usize,
    pub cache_ttl: Option<Duration>,
    pub max_retries: Option<usize>,
}

impl ChainQuery {
    pub fn new(query_text: impl Into<String>, options: &SearchOptions) -> Result<Self> {
        options.check()?;

        Ok(Self {
            query_text: query_text.into(),
            filter: options.filter.clone(),
            order_by: options.order_by.clone(),
            select: options.select.clone(),
            page_size: options.page_size,
            cache_ttl: options.cache_ttl(),
            max_retries: options.max_retries,
        })
    }

    /// Request with every chain-level field set; strategies add the cursor.
    pub(crate) fn base_request(&self, top: usize, include_total_count: bool) -> SearchRequest {
        let mut request = SearchRequest::new(self.query_text.clone(), top)
            .with_order_by(self.order_by.clone())
            .with_select(self.select.clone());
        request.filter = self.filter.clone();
        request.include_total_count = include_total_count;
        request
    }
}

/// Where a chain stands between two pages.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainState {
    /// Cursor of the next page to request.
    pub cursor: PageCursor,
    /// Pages delivered so far.
    pub page_number: usize,
    pub total_count: Option<u64>,
    pub records_seen: usize,
    pub done: bool,
}

/// How one strategy builds requests and derives the next cursor.
pub trait PageStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn request(
        &self,
        query: &ChainQuery,
        cursor: &PageCursor,
        include_total_count: bool,
    ) -> Result<SearchRequest>;

    /// Cursor for the page after `cursor`, or `None` when the chain is done.
    fn advance(
        &self,
        cursor: &PageCursor,
        response: &TransportResponse,
        total_count: Option<u64>,
    ) -> Result<Option<PageCursor>>;
}

pub(crate) fn cursor_mismatch(expected: &str, cursor: &PageCursor) -> SearchError {
    SearchError::InvalidCursor(format!(
        "{} cursor cannot drive a {} chain",
        cursor.strategy_name(),
        expected
    ))
}

fn build_strategy(strategy: &PaginationStrategy, query: &ChainQuery) -> Box<dyn PageStrategy> {
    match strategy {
        PaginationStrategy::Offset => Box::new(OffsetPaging),
        PaginationStrategy::Range { key_field } => {
            Box::new(RangePaging::new(key_field.clone(), &query.order_by))
        }
        PaginationStrategy::SearchAfter { sort } => {
            Box::new(SearchAfterPaging::new(sort.clone(), &query.order_by))
        }
    }
}

/// Drives one result chain. Pages are requested strictly in sequence; the
/// engine itself holds no per-chain mutable state.
pub struct PaginationEngine {
    executor: Arc<QueryExecutor>,
    strategy: PaginationStrategy,
    paging: Box<dyn PageStrategy>,
    query: ChainQuery,
    call: CallOptions,
}

impl std::fmt::Debug for PaginationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginationEngine")
            .field("endpoint", &self.executor.endpoint())
            .field("strategy", &self.strategy)
            .field("query", &self.query)
            .finish()
    }
}

impl PaginationEngine {
    pub fn new(
        executor: Arc<QueryExecutor>,
        strategy: PaginationStrategy,
        query: ChainQuery,
    ) -> Result<Self> {
        strategy.validate()?;
        let paging = build_strategy(&strategy, &query);
        let call = CallOptions {
            cache_ttl: query.cache_ttl,
            max_retries: query.max_retries,
            cancel: CancellationToken::new(),
        };

        Ok(Self {
            executor,
            strategy,
            paging,
            query,
            call,
        })
    }

    /// Ties every request of this chain to `cancel`.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.call.cancel = cancel;
        self
    }

    pub fn strategy(&self) -> &PaginationStrategy {
        &self.strategy
    }

    pub fn query(&self) -> &ChainQuery {
        &self.query
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.call.cancel
    }

    pub fn initial_state(&self) -> ChainState {
        ChainState {
            cursor: self.strategy.initial_cursor(self.query.page_size),
            page_number: 0,
            total_count: None,
            records_seen: 0,
            done: false,
        }
    }

    /// State for continuing a chain from a previously issued cursor.
    pub fn resume_state(&self, cursor: PageCursor) -> Result<ChainState> {
        if !cursor.matches(&self.strategy) {
            return Err(cursor_mismatch(self.strategy.name(), &cursor));
        }

        Ok(ChainState {
            cursor,
            page_number: 0,
            total_count: None,
            records_seen: 0,
            done: false,
        })
    }

    /// The request a cursor maps to. The total count is asked for whenever
    /// the chain does not know it yet.
    pub fn request_for(&self, cursor: &PageCursor, include_total_count: bool) -> Result<SearchRequest> {
        self.paging.request(&self.query, cursor, include_total_count)
    }

    pub async fn next_page(&self, state: &ChainState) -> Result<(ResultPage, ChainState, bool)> {
        if state.done {
            return Err(SearchError::Validation(
                "pagination chain is already complete".to_string(),
            ));
        }

        let request = self.request_for(&state.cursor, state.total_count.is_none())?;
        let fetched = self.executor.execute(&request, &self.call).await?;
        let response = fetched.response;

        let total_count = state.total_count.or(response.total_count);
        let next_cursor = self.paging.advance(&state.cursor, &response, total_count)?;
        let done = next_cursor.is_none();
        let page_number = state.page_number + 1;
        let fetched_len = response.records.len();

        debug!(
            endpoint = %self.executor.endpoint(),
            strategy = self.paging.name(),
            page = page_number,
            records = fetched_len,
            from_cache = fetched.from_cache,
            done,
            "Fetched page"
        );

        let next_state = ChainState {
            cursor: next_cursor.clone().unwrap_or_else(|| state.cursor.clone()),
            page_number,
            total_count,
            records_seen: state.records_seen + fetched_len,
            done,
        };

        let page = ResultPage {
            records: response.records,
            total_count,
            page_number,
            cursor: state.cursor.clone(),
            next_cursor,
            raw_cursor: response.raw_cursor,
            from_cache: fetched.from_cache,
        };

        Ok((page, next_state, done))
    }
}
