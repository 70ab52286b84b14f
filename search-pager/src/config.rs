//! Client configuration.
//!
//! Everything here is scoped to one logical endpoint: the cache, the rate
//! limiter, the circuit breaker, the retry policy and the queue are built
//! once from a [`ClientConfig`] and shared by every chain the client runs.

use config::{Config as ConfigLoader, Environment, File};
use search_pager_core::{Result, SearchError, SearchOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::observability::monitor::{AlertThresholds, MonitorConfig};
use crate::observability::telemetry::LogConfig;
use crate::performance::cache::CacheConfig;
use crate::performance::queue::QueueConfig;
use crate::resilience::circuit_breaker::CircuitBreakerConfig;
use crate::resilience::rate_limit::RateLimitConfig;
use crate::resilience::retry::RetryConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_ms: u64,
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_ms: 300_000,
            max_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub threshold: u32,
    pub cooldown_ms: u64,
    pub failure_window_ms: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            threshold: 5,
            cooldown_ms: 30_000,
            failure_window_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first call
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 100,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub max_concurrent: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self { max_concurrent: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub capacity: usize,
    pub max_age_ms: u64,
    pub min_samples: usize,
    pub thresholds: AlertThresholds,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            max_age_ms: 300_000,
            min_samples: 10,
            thresholds: AlertThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Logical endpoint name; labels logs and metrics
    pub endpoint: String,
    /// Deadline for a single transport call
    pub request_timeout_ms: u64,
    pub cache: CacheSettings,
    /// `None` leaves the endpoint unthrottled
    pub rate_limit: Option<RateLimitSettings>,
    pub circuit_breaker: CircuitBreakerSettings,
    pub retry: RetrySettings,
    pub queue: QueueSettings,
    pub monitor: MonitorSettings,
    pub logging: LogConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "default".to_string(),
            request_timeout_ms: 10_000,
            cache: CacheSettings::default(),
            rate_limit: None,
            circuit_breaker: CircuitBreakerSettings::default(),
            retry: RetrySettings::default(),
            queue: QueueSettings::default(),
            monitor: MonitorSettings::default(),
            logging: LogConfig::default(),
        }
    }
}

fn config_error(err: config::ConfigError) -> SearchError {
    SearchError::Configuration(err.to_string())
}

/// `SEARCH_PAGER__QUEUE__MAX_CONCURRENT=8` sets `queue.max_concurrent`.
fn environment() -> Environment {
    Environment::with_prefix("SEARCH_PAGER")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

impl ClientConfig {
    /// Layers `config/default`, `config/local` and `SEARCH_PAGER__*`
    /// environment variables over the defaults. Missing files are skipped.
    pub fn load() -> Result<Self> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(environment())
            .build()
            .map_err(config_error)?;

        let loaded: Self = config.try_deserialize().map_err(config_error)?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reads a single required configuration file, then `SEARCH_PAGER__*`
    /// environment variables. The file format follows the extension.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = ConfigLoader::builder()
            .add_source(File::from(path.as_ref()).required(true))
            .add_source(environment())
            .build()
            .map_err(config_error)?;

        let loaded: Self = config.try_deserialize().map_err(config_error)?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Defaults overridden by the endpoint settings of a Query API option object.
    pub fn from_options(options: &SearchOptions) -> Self {
        Self::default().with_options(options)
    }

    /// Applies `rateLimit`, `circuitBreaker`, `maxConcurrent`, `maxRetries`
    /// and `cacheTtl` from the option object.
    pub fn with_options(mut self, options: &SearchOptions) -> Self {
        if let Some(rate_limit) = options.rate_limit {
            self.rate_limit = Some(RateLimitSettings {
                max_requests: rate_limit.max,
                window_ms: rate_limit.window_ms,
            });
        }
        if let Some(breaker) = options.circuit_breaker {
            self.circuit_breaker.threshold = breaker.threshold;
            self.circuit_breaker.cooldown_ms = breaker.cooldown_ms;
        }
        if let Some(max_concurrent) = options.max_concurrent {
            self.queue.max_concurrent = max_concurrent;
        }
        if let Some(max_retries) = options.max_retries {
            self.retry.max_attempts = max_retries.saturating_add(1);
        }
        if let Some(ttl_ms) = options.cache_ttl_ms {
            self.cache.ttl_ms = ttl_ms;
        }
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(SearchError::Configuration(
                "endpoint name must not be empty".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(SearchError::Configuration(
                "request_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if let Some(rate_limit) = self.rate_limit_config() {
            rate_limit.validate()?;
        }
        self.cache_config()?;
        self.circuit_breaker_config().validate()?;
        self.retry_config().validate()?;
        self.queue_config().validate()?;
        self.monitor_config().validate()?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_config(&self) -> Result<CacheConfig> {
        CacheConfig::builder()
            .default_ttl(Duration::from_millis(self.cache.ttl_ms))
            .max_entries(self.cache.max_entries)
            .build()
    }

    pub fn rate_limit_config(&self) -> Option<RateLimitConfig> {
        self.rate_limit.as_ref().map(|r| {
            RateLimitConfig::new(r.max_requests, Duration::from_millis(r.window_ms))
        })
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker.threshold,
            cooldown: Duration::from_millis(self.circuit_breaker.cooldown_ms),
            failure_window: Duration::from_millis(self.circuit_breaker.failure_window_ms),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            multiplier: self.retry.multiplier,
            jitter: self.retry.jitter,
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig::new(self.queue.max_concurrent)
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            capacity: self.monitor.capacity,
            max_age: Duration::from_millis(self.monitor.max_age_ms),
            min_samples: self.monitor.min_samples,
            thresholds: self.monitor.thresholds,
        }
    }
}
