//! Rolling performance samples and threshold alerts.
//!
//! The monitor keeps the most recent samples, bounded both by count and by
//! age. A report summarises the buffer (average and p95 latency, error rate,
//! cache hit rate) and lists every threshold the summary crosses. Reporting
//! has no side effects; delivering alerts anywhere is up to the caller.

use metrics::{counter, histogram};
use search_pager_core::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Alert severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Investigate soon
    Warning,
    /// Immediate action required
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    AverageLatency,
    P95Latency,
    ErrorRate,
    CacheHitRate,
}

/// A threshold crossed by the current buffer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub observed: f64,
    pub threshold: f64,
}

/// Alert thresholds. Latencies are in milliseconds, rates in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertThresholds {
    pub avg_latency_warning_ms: f64,
    pub avg_latency_critical_ms: f64,
    pub p95_latency_warning_ms: f64,
    pub error_rate_warning: f64,
    pub error_rate_critical: f64,
    /// Warn when the cache hit rate falls below this; `None` disables the check
    pub min_cache_hit_rate: Option<f64>,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            avg_latency_warning_ms: 500.0,
            avg_latency_critical_ms: 2_000.0,
            p95_latency_warning_ms: 1_500.0,
            error_rate_warning: 0.05,
            error_rate_critical: 0.25,
            min_cache_hit_rate: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorConfig {
    /// Maximum samples kept
    pub capacity: usize,
    /// Samples older than this are dropped
    pub max_age: Duration,
    /// Alerts are only raised once this many samples are buffered
    pub min_samples: usize,
    pub thresholds: AlertThresholds,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            max_age: Duration::from_secs(300),
            min_samples: 10,
            thresholds: AlertThresholds::default(),
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(SearchError::Configuration(
                "monitor capacity must be at least 1".to_string(),
            ));
        }
        if self.max_age.is_zero() {
            return Err(SearchError::Configuration(
                "monitor max_age must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// One completed query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceSample {
    pub recorded_at: Instant,
    pub duration: Duration,
    pub success: bool,
    pub from_cache: bool,
}

impl PerformanceSample {
    pub fn new(duration: Duration, success: bool, from_cache: bool) -> Self {
        Self {
            recorded_at: Instant::now(),
            duration,
            success,
            from_cache,
        }
    }

    fn outcome(&self) -> &'static str {
        match (self.from_cache, self.success) {
            (true, _) => "cache_hit",
            (false, true) => "success",
            (false, false) => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceReport {
    pub sample_count: usize,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub error_rate: f64,
    pub cache_hit_rate: f64,
    pub alerts: Vec<Alert>,
}

impl PerformanceReport {
    pub fn has_critical(&self) -> bool {
        self.alerts
            .iter()
            .any(|a| a.severity == AlertSeverity::Critical)
    }
}

pub struct PerformanceMonitor {
    name: String,
    config: MonitorConfig,
    samples: Mutex<VecDeque<PerformanceSample>>,
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self::named("default", config)
    }

    pub fn named(name: impl Into<String>, config: MonitorConfig) -> Self {
        Self {
            name: name.into(),
            samples: Mutex::new(VecDeque::with_capacity(config.capacity.min(4_096))),
            config,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PerformanceSample>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn evict(&self, samples: &mut VecDeque<PerformanceSample>, now: Instant) {
        while samples.len() > self.config.capacity {
            samples.pop_front();
        }
        while let Some(oldest) = samples.front() {
            if now.saturating_duration_since(oldest.recorded_at) > self.config.max_age {
                samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn record(&self, sample: PerformanceSample) {
        histogram!("search_request_duration_seconds", "endpoint" => self.name.clone())
            .record(sample.duration.as_secs_f64());
        counter!(
            "search_requests_total",
            "endpoint" => self.name.clone(),
            "outcome" => sample.outcome()
        )
        .increment(1);

        let mut samples = self.lock();
        samples.push_back(sample);
        self.evict(&mut samples, Instant::now());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn reset(&self) {
        self.lock().clear();
    }

    pub fn report(&self) -> PerformanceReport {
        let mut samples = self.lock();
        self.evict(&mut samples, Instant::now());

        let count = samples.len();
        if count == 0 {
            return PerformanceReport {
                sample_count: 0,
                avg_latency_ms: 0.0,
                p95_latency_ms: 0.0,
                error_rate: 0.0,
                cache_hit_rate: 0.0,
                alerts: Vec::new(),
            };
        }

        let mut latencies: Vec<f64> = samples
            .iter()
            .map(|s| s.duration.as_micros() as f64 / 1_000.0)
            .collect();
        let errors = samples.iter().filter(|s| !s.success).count();
        let hits = samples.iter().filter(|s| s.from_cache).count();
        drop(samples);

        let avg_latency_ms = latencies.iter().sum::<f64>() / count as f64;
        latencies.sort_by(|a, b| a.total_cmp(b));
        // nearest-rank percentile
        let rank = ((0.95 * count as f64).ceil() as usize).clamp(1, count);
        let p95_latency_ms = latencies[rank - 1];

        let mut report = PerformanceReport {
            sample_count: count,
            avg_latency_ms,
            p95_latency_ms,
            error_rate: errors as f64 / count as f64,
            cache_hit_rate: hits as f64 / count as f64,
            alerts: Vec::new(),
        };

        if count >= self.config.min_samples {
            report.alerts = self.evaluate(&report);
        }
        report
    }

    fn evaluate(&self, report: &PerformanceReport) -> Vec<Alert> {
        let t = &self.config.thresholds;
        let mut alerts = Vec::new();

        if report.avg_latency_ms >= t.avg_latency_critical_ms {
            alerts.push(Alert {
                kind: AlertKind::AverageLatency,
                severity: AlertSeverity::Critical,
                message: format!(
                    "average latency {:.1}ms is above {:.1}ms",
                    report.avg_latency_ms, t.avg_latency_critical_ms
                ),
                observed: report.avg_latency_ms,
                threshold: t.avg_latency_critical_ms,
            });
        } else if report.avg_latency_ms >= t.avg_latency_warning_ms {
            alerts.push(Alert {
                kind: AlertKind::AverageLatency,
                severity: AlertSeverity::Warning,
                message: format!(
                    "average latency {:.1}ms is above {:.1}ms",
                    report.avg_latency_ms, t.avg_latency_warning_ms
                ),
                observed: report.avg_latency_ms,
                threshold: t.avg_latency_warning_ms,
            });
        }

        if report.p95_latency_ms >= t.p95_latency_warning_ms {
            alerts.push(Alert {
                kind: AlertKind::P95Latency,
                severity: AlertSeverity::Warning,
                message: format!(
                    "p95 latency {:.1}ms is above {:.1}ms",
                    report.p95_latency_ms, t.p95_latency_warning_ms
                ),
                observed: report.p95_latency_ms,
                threshold: t.p95_latency_warning_ms,
            });
        }

        let error_threshold = if report.error_rate >= t.error_rate_critical {
            Some((AlertSeverity::Critical, t.error_rate_critical))
        } else if report.error_rate >= t.error_rate_warning {
            Some((AlertSeverity::Warning, t.error_rate_warning))
        } else {
            None
        };
        if let Some((severity, threshold)) = error_threshold {
            alerts.push(Alert {
                kind: AlertKind::ErrorRate,
                severity,
                message: format!(
                    "error rate {:.1}% is above {:.1}%",
                    report.error_rate * 100.0,
                    threshold * 100.0
                ),
                observed: report.error_rate,
                threshold,
            });
        }

        if let Some(min_hit_rate) = t.min_cache_hit_rate {
            if report.cache_hit_rate < min_hit_rate {
                alerts.push(Alert {
                    kind: AlertKind::CacheHitRate,
                    severity: AlertSeverity::Warning,
                    message: format!(
                        "cache hit rate {:.1}% is below {:.1}%",
                        report.cache_hit_rate * 100.0,
                        min_hit_rate * 100.0
                    ),
                    observed: report.cache_hit_rate,
                    threshold: min_hit_rate,
                });
            }
        }

        alerts
    }
}

impl fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("samples", &self.len())
            .finish()
    }
}
