//! TTL-bounded result cache keyed by [`QuerySignature`].
//!
//! Entries expire once `now - stored_at > ttl`. When an insert takes the
//! cache over capacity, expired entries are purged first and least recently
//! used entries are evicted only while that did not free enough slots. A miss
//! is never an error.
//!
//! Entries stored with [`QueryCache::put_request`] keep the request they
//! answer, so [`QueryCache::invalidate_requests`] can select them by query
//! text, filter or any other request field.
//!
//! # Examples
//!
//! ```no_run
//! use search_pager::performance::cache::{CacheConfig, QueryCache};
//! use search_pager_core::{QuerySignature, SearchRequest, TransportResponse};
//! use std::time::Duration;
//!
//! let config = CacheConfig::builder()
//!     .default_ttl(Duration::from_secs(60))
//!     .max_entries(1000)
//!     .build()
//!     .unwrap();
//!
//! let cache: QueryCache<TransportResponse> = QueryCache::new(config);
//! let signature = QuerySignature::of(&SearchRequest::new("hotel", 10));
//! cache.insert(signature.clone(), TransportResponse::default());
//! assert!(cache.get(&signature).is_some());
//! ```

use dashmap::DashMap;
use metrics::counter;
use search_pager_core::{QuerySignature, Result, SearchError, SearchRequest, TransportResponse};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Configuration for the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL applied when the caller does not supply one.
    pub default_ttl: Duration,

    /// Maximum number of entries held at once.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    default_ttl: Option<Duration>,
    max_entries: Option<usize>,
}

impl CacheConfigBuilder {
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    pub fn build(self) -> Result<CacheConfig> {
        let default = CacheConfig::default();

        let max_entries = self.max_entries.unwrap_or(default.max_entries);
        if max_entries == 0 {
            return Err(SearchError::Configuration(
                "cache max_entries must be greater than 0".to_string(),
            ));
        }

        Ok(CacheConfig {
            default_ttl: self.default_ttl.unwrap_or(default.default_ttl),
            max_entries,
        })
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
    /// Logical access tick; higher is more recent.
    last_accessed: u64,
    request: Option<Arc<SearchRequest>>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) > self.ttl
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub current_entries: usize,
    pub max_entries: usize,
    /// Hits over lookups, 0.0 when nothing has been looked up.
    pub hit_rate: f64,
}

/// Concurrent result cache shared by every chain against one endpoint.
pub struct QueryCache<V = TransportResponse> {
    name: String,
    config: CacheConfig,
    entries: DashMap<QuerySignature, CacheEntry<V>>,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<V> QueryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        Self::named("default", config)
    }

    /// Creates a cache whose metrics are labelled with `name`.
    pub fn named(name: impl Into<String>, config: CacheConfig) -> Self {
        Self {
            name: name.into(),
            config,
            entries: DashMap::new(),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    pub fn get(&self, signature: &QuerySignature) -> Option<V> {
        let now = Instant::now();

        if let Some(mut entry) = self.entries.get_mut(signature) {
            if entry.is_expired(now) {
                drop(entry);
                if self
                    .entries
                    .remove_if(signature, |_, e| e.is_expired(now))
                    .is_some()
                {
                    self.expirations.fetch_add(1, Ordering::Relaxed);
                }
                self.record_miss();
                return None;
            }

            entry.last_accessed = self.tick();
            self.hits.fetch_add(1, Ordering::Relaxed);
            counter!("search_cache_hits_total", "endpoint" => self.name.clone()).increment(1);
            Some(entry.value.clone())
        } else {
            self.record_miss();
            None
        }
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("search_cache_misses_total", "endpoint" => self.name.clone()).increment(1);
    }

    pub fn insert(&self, signature: QuerySignature, value: V) {
        self.put(signature, value, self.config.default_ttl);
    }

    pub fn put(&self, signature: QuerySignature, value: V, ttl: Duration) {
        self.store(signature, value, ttl, None);
    }

    /// Stores the answer to `request` under its signature, keeping the
    /// request for [`invalidate_requests`](Self::invalidate_requests).
    pub fn put_request(&self, request: &SearchRequest, value: V, ttl: Duration) {
        self.store(
            QuerySignature::of(request),
            value,
            ttl,
            Some(Arc::new(request.clone())),
        );
    }

    fn store(
        &self,
        signature: QuerySignature,
        value: V,
        ttl: Duration,
        request: Option<Arc<SearchRequest>>,
    ) {
        let entry = CacheEntry {
            value,
            stored_at: Instant::now(),
            ttl,
            last_accessed: self.tick(),
            request,
        };
        let added = self.entries.insert(signature.clone(), entry).is_none();

        // concurrent writers may all have inserted; each trims until the
        // count it observes is within capacity
        if added && self.entries.len() > self.config.max_entries {
            self.purge_expired();
            while self.entries.len() > self.config.max_entries {
                if !self.evict_lru(&signature) {
                    break;
                }
            }
        }
    }

    /// Evicts the least recently used entry other than `keep`. Returns false
    /// when there was nothing to evict.
    fn evict_lru(&self, keep: &QuerySignature) -> bool {
        let victim = self
            .entries
            .iter()
            .filter(|entry| entry.key() != keep)
            .min_by_key(|entry| entry.value().last_accessed)
            .map(|entry| entry.key().clone());

        let Some(key) = victim else {
            return false;
        };
        if self.entries.remove(&key).is_some() {
            debug!(cache = %self.name, signature = %key, "Evicting least recently used entry");
            self.evictions.fetch_add(1, Ordering::Relaxed);
            counter!("search_cache_evictions_total", "endpoint" => self.name.clone()).increment(1);
        }
        true
    }

    /// Drops every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<QuerySignature> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }

        self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Removes all entries whose signature matches `predicate`. Signatures
    /// are opaque hashes, so this only selects exact signatures; use
    /// [`invalidate_requests`](Self::invalidate_requests) to match on
    /// request fields.
    pub fn invalidate_matching<F>(&self, predicate: F) -> usize
    where
        F: Fn(&QuerySignature) -> bool,
    {
        self.remove_where(|key, _| predicate(key))
    }

    /// Removes the entries stored with [`put_request`](Self::put_request)
    /// whose request matches `predicate`.
    pub fn invalidate_requests<F>(&self, predicate: F) -> usize
    where
        F: Fn(&SearchRequest) -> bool,
    {
        self.remove_where(|_, entry| entry.request.as_deref().is_some_and(&predicate))
    }

    fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&QuerySignature, &CacheEntry<V>) -> bool,
    {
        let mut removed = 0;
        self.entries.retain(|key, entry| {
            let matched = predicate(key, entry);
            if matched {
                removed += 1;
            }
            !matched
        });
        removed
    }

    pub fn remove(&self, signature: &QuerySignature) -> Option<V> {
        self.entries.remove(signature).map(|(_, entry)| entry.value)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn statistics(&self) -> CacheStatistics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheStatistics {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            current_entries: self.entries.len(),
            max_entries: self.config.max_entries,
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
        }
    }

    /// Periodically purges expired entries until the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let removed = cache.purge_expired();
                if removed > 0 {
                    debug!(cache = %cache.name, removed, "Purged expired cache entries");
                }
            }
        })
    }
}
