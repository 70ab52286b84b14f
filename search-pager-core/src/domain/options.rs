use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use super::query::validate_filter;
use super::sort::SortField;
use crate::error::{Result, SearchError};

pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Upper bound on `max_retries` accepted from callers.
pub const MAX_RETRIES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitOptions {
    pub max: u32,
    pub window_ms: u64,
}

impl RateLimitOptions {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerOptions {
    pub threshold: u32,
    pub cooldown_ms: u64,
}

impl CircuitBreakerOptions {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Options accepted by the Query API.
///
/// `page_size`, `filter`, `order_by`, `select`, `cache_ttl_ms` and
/// `max_retries` shape one result chain. `max_concurrent`, `rate_limit` and
/// `circuit_breaker` describe the endpoint and are bound when a client is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    #[validate(range(min = 1, max = 1000))]
    pub page_size: usize,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub order_by: Vec<String>,
    #[serde(default)]
    pub select: Vec<String>,
    #[serde(default)]
    pub cache_ttl_ms: Option<u64>,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub max_concurrent: Option<usize>,
    #[serde(default)]
    #[validate(range(max = 100))]
    pub max_retries: Option<usize>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitOptions>,
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerOptions>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            filter: None,
            order_by: Vec::new(),
            select: Vec::new(),
            cache_ttl_ms: None,
            max_concurrent: None,
            max_retries: None,
            rate_limit: None,
            circuit_breaker: None,
        }
    }
}

impl SearchOptions {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_order_by<I, S>(mut self, order_by: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by = order_by.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_select<I, S>(mut self, select: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = select.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_ms = Some(ttl.as_millis() as u64);
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = Some(max_concurrent);
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_rate_limit(mut self, max: u32, window: Duration) -> Self {
        self.rate_limit = Some(RateLimitOptions {
            max,
            window_ms: window.as_millis() as u64,
        });
        self
    }

    pub fn with_circuit_breaker(mut self, threshold: u32, cooldown: Duration) -> Self {
        self.circuit_breaker = Some(CircuitBreakerOptions {
            threshold,
            cooldown_ms: cooldown.as_millis() as u64,
        });
        self
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_ms.map(Duration::from_millis)
    }

    /// Parsed order-by terms.
    pub fn sort_fields(&self) -> Result<Vec<SortField>> {
        self.order_by.iter().map(|t| SortField::parse(t)).collect()
    }

    /// Full option check: field ranges, filter syntax, order-by terms and
    /// the endpoint settings.
    pub fn check(&self) -> Result<()> {
        self.validate()?;

        if let Some(filter) = &self.filter {
            validate_filter(filter)?;
        }

        self.sort_fields()?;

        if let Some(rate_limit) = &self.rate_limit {
            if rate_limit.max == 0 || rate_limit.window_ms == 0 {
                return Err(SearchError::Validation(
                    "rate limit requires max > 0 and windowMs > 0".to_string(),
                ));
            }
        }

        if let Some(breaker) = &self.circuit_breaker {
            if breaker.threshold == 0 {
                return Err(SearchError::Validation(
                    "circuit breaker threshold must be at least 1".to_string(),
                ));
            }
        }

        Ok(())
    }
}
