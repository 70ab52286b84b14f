use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Record, SearchRequest};
use crate::error::TransportError;

/// One page of raw results as returned by the remote search endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportResponse {
    pub records: Vec<Record>,
    pub total_count: Option<u64>,
    /// Continuation token handed back by the service, passed through untouched.
    pub raw_cursor: Option<String>,
}

impl TransportResponse {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            total_count: None,
            raw_cursor: None,
        }
    }

    pub fn with_total_count(mut self, total_count: u64) -> Self {
        self.total_count = Some(total_count);
        self
    }
}

/// The remote search API. Implementations perform exactly one request per
/// call; retries, throttling and caching are layered on top by the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &SearchRequest) -> Result<TransportResponse, TransportError>;

    /// Logical endpoint name used to scope circuit, rate and metric state.
    fn endpoint(&self) -> &str {
        "default"
    }
}
