//! Pages through an in-process catalog with each strategy.
//!
//! Run with:
//! ```bash
//! RUST_LOG=search_pager=debug cargo run --example paging_demo
//! ```

use async_trait::async_trait;
use futures::TryStreamExt;
use search_pager::telemetry::{describe_metrics, init_tracing, install_prometheus_recorder};
use search_pager::{
    PaginationStrategy, Record, SearchClient, SearchOptions, SearchRequest, SortField, Transport,
    TransportError, TransportResponse,
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Catalog of numbered products. Supports skip/top, `id gt N` and ordering by id.
struct Catalog {
    products: Vec<Record>,
    calls: AtomicUsize,
}

impl Catalog {
    fn new(size: u64) -> Self {
        let products = (1..=size)
            .map(|id| {
                Record::new()
                    .with_field("id", id)
                    .with_field("name", format!("product-{id}"))
                    .with_score(1.0 / id as f64)
            })
            .collect();
        Self {
            products,
            calls: AtomicUsize::new(0),
        }
    }
}

fn lower_bound(filter: Option<&str>) -> u64 {
    filter
        .and_then(|f| f.rsplit("id gt ").next())
        .and_then(|rest| rest.trim_end_matches(')').trim().parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl Transport for Catalog {
    async fn send(&self, request: &SearchRequest) -> Result<TransportResponse, TransportError> {
        // every fifth call is throttled to show the retry path
        if self.calls.fetch_add(1, Ordering::SeqCst) % 5 == 4 {
            return Err(TransportError::status(429, "slow down"));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;

        let after = request
            .search_after
            .as_ref()
            .and_then(|values| values.last())
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let floor = lower_bound(request.filter.as_deref()).max(after);

        let matching: Vec<Record> = self
            .products
            .iter()
            .filter(|r| r.get("id").and_then(Value::as_u64).is_some_and(|id| id > floor))
            .cloned()
            .collect();
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(request.skip.unwrap_or(0))
            .take(request.top)
            .collect();

        let mut response = TransportResponse::new(page);
        if request.include_total_count {
            response.total_count = Some(total);
        }
        Ok(response)
    }

    fn endpoint(&self) -> &str {
        "catalog"
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("info,search_pager=debug")?;
    let metrics = install_prometheus_recorder()?;
    describe_metrics();

    let options = SearchOptions::new(20)
        .with_max_retries(2)
        .with_rate_limit(50, Duration::from_secs(1))
        .with_max_concurrent(4);
    let client = SearchClient::builder()
        .transport(Arc::new(Catalog::new(95)))
        .options(&options)
        .build()?;

    let strategies = [
        PaginationStrategy::Offset,
        PaginationStrategy::range("id"),
        PaginationStrategy::search_after(vec![SortField::asc("id")]),
    ];
    for strategy in strategies {
        let name = strategy.name();
        let mut pages = client.search("*", &options, strategy)?;
        while let Some(page) = pages.try_next().await? {
            info!(
                strategy = name,
                page = page.page_number,
                records = page.len(),
                cached = page.from_cache,
                "received page"
            );
        }
    }

    let parallel = client.fetch_offset_pages("*", &options, 0, 5).await?;
    info!(pages = parallel.len(), "parallel offset fetch finished");

    let report = client.report();
    info!(
        samples = report.sample_count,
        p95_ms = report.p95_latency_ms,
        cache_hit_rate = report.cache_hit_rate,
        alerts = report.alerts.len(),
        "performance report"
    );
    info!(
        hits = client.cache_statistics().hits,
        state = ?client.circuit_state(),
        "endpoint state"
    );

    println!("{}", metrics.render());
    Ok(())
}
