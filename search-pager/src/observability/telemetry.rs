//! Logging and metrics bootstrap.
//!
//! Library code only emits `tracing` events and `metrics` samples. An
//! application that wants them somewhere calls one of the initialisers below
//! once at startup.
//!
//! # Example
//!
//! ```no_run
//! use search_pager::observability::telemetry::{init_tracing, install_prometheus_recorder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! init_tracing("search_pager=info")?;
//! let handle = install_prometheus_recorder()?;
//!
//! // later, from a scrape endpoint
//! let body = handle.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Buckets for `search_request_duration_seconds`.
pub const REQUEST_DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Logging already initialized: {0}")]
    Logging(String),

    #[error("Failed to install metrics recorder: {0}")]
    Metrics(String),
}

/// Log format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Machine-readable JSON lines
    Json,
    /// Human-readable multi-line output
    Pretty,
    /// Single-line output
    #[default]
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Directive used when `RUST_LOG` is unset, e.g. `"search_pager=debug"`
    pub level: String,
    /// Explicit filter that takes precedence over `RUST_LOG`
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: "info".to_string(),
            filter: None,
        }
    }
}

fn env_filter(config: &LogConfig) -> Result<EnvFilter, TelemetryError> {
    match &config.filter {
        Some(filter) => {
            EnvFilter::try_new(filter).map_err(|e| TelemetryError::Filter(e.to_string()))
        }
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.level))),
    }
}

/// Installs a global subscriber. Returns an error instead of panicking when
/// one is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), TelemetryError> {
    let filter = env_filter(config)?;

    let layer = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_filter(filter).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_filter(filter).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::Logging(e.to_string()))?;

    info!("Logging initialized with format: {:?}", config.format);
    Ok(())
}

/// Compact logs filtered by `RUST_LOG`, falling back to `default_directive`.
pub fn init_tracing(default_directive: &str) -> Result<(), TelemetryError> {
    init_logging(&LogConfig {
        level: default_directive.to_string(),
        ..Default::default()
    })
}

/// JSON logs filtered by `RUST_LOG`, falling back to `default_directive`.
pub fn init_tracing_json(default_directive: &str) -> Result<(), TelemetryError> {
    init_logging(&LogConfig {
        format: LogFormat::Json,
        level: default_directive.to_string(),
        filter: None,
    })
}

/// Prometheus builder with the request-duration buckets applied.
pub fn prometheus_builder() -> Result<PrometheusBuilder, TelemetryError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("search_request_duration_seconds".to_string()),
            REQUEST_DURATION_BUCKETS,
        )
        .map_err(|e| TelemetryError::Metrics(e.to_string()))
}

/// Installs the global Prometheus recorder. Later calls return the handle
/// from the first installation.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, TelemetryError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = prometheus_builder()?
        .install_recorder()
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
    describe_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Registers descriptions for every metric this crate emits.
pub fn describe_metrics() {
    describe_counter!("search_cache_hits_total", Unit::Count, "Query cache hits");
    describe_counter!("search_cache_misses_total", Unit::Count, "Query cache misses");
    describe_counter!(
        "search_cache_evictions_total",
        Unit::Count,
        "Entries evicted from the query cache for capacity"
    );
    describe_counter!(
        "search_rate_limit_waits_total",
        Unit::Count,
        "Calls that had to wait for a rate limit slot"
    );
    describe_gauge!(
        "search_circuit_state",
        "Circuit breaker state (0 closed, 1 open, 2 half-open)"
    );
    describe_counter!(
        "search_circuit_rejections_total",
        Unit::Count,
        "Calls rejected by an open circuit"
    );
    describe_counter!("search_retries_total", Unit::Count, "Transport retries");
    describe_gauge!(
        "search_queue_in_flight",
        Unit::Count,
        "Queue tasks currently running"
    );
    describe_histogram!(
        "search_request_duration_seconds",
        Unit::Seconds,
        "Query latency including cache hits"
    );
    describe_counter!(
        "search_requests_total",
        Unit::Count,
        "Completed queries by outcome"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performance::{CacheConfig, QueryCache};
    use search_pager_core::{QuerySignature, SearchRequest};

    #[test]
    fn test_invalid_filter_is_rejected() {
        let config = LogConfig {
            filter: Some("search_pager=[".to_string()),
            ..Default::default()
        };

        assert!(matches!(env_filter(&config), Err(TelemetryError::Filter(_))));
    }

    #[test]
    fn test_log_config_deserializes_with_defaults() {
        let config: LogConfig = serde_json::from_str(r#"{"format":"json"}"#).unwrap();

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_cache_metrics_are_exported() {
        let recorder = prometheus_builder().unwrap().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            let cache: QueryCache<u32> = QueryCache::named("products", CacheConfig::default());
            let signature = QuerySignature::of(&SearchRequest::new("laptop", 10));
            cache.get(&signature);
            cache.insert(signature.clone(), 1);
            cache.get(&signature);
        });

        let rendered = handle.render();
        assert!(rendered.contains(r#"search_cache_misses_total{endpoint="products"} 1"#));
        assert!(rendered.contains(r#"search_cache_hits_total{endpoint="products"} 1"#));
    }
}
