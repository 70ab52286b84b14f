//! Observability for query execution.
//!
//! - Rolling performance samples with threshold alerts ([`monitor`])
//! - Logging and Prometheus bootstrap ([`telemetry`])

pub mod monitor;
pub mod telemetry;

pub use monitor::{
    Alert, AlertKind, AlertSeverity, AlertThresholds, MonitorConfig, PerformanceMonitor,
    PerformanceReport, PerformanceSample,
};
pub use telemetry::{
    init_logging, init_tracing, init_tracing_json, install_prometheus_recorder, LogConfig,
    LogFormat, TelemetryError,
};
