//! Caching and bounded parallelism for query execution.
//!
//! - **Query cache**: TTL-bounded result cache keyed by [`QuerySignature`],
//!   evicting expired entries first and then the least recently used one.
//! - **Concurrency queue**: FIFO task queue that never runs more than
//!   `max_concurrent` tasks at once.
//!
//! [`QuerySignature`]: search_pager_core::QuerySignature
//!
//! # Example
//!
//! ```no_run
//! use search_pager::performance::{CacheConfig, QueryCache};
//! use search_pager_core::{QuerySignature, SearchRequest, TransportResponse};
//! use std::time::Duration;
//!
//! # fn example() -> search_pager_core::Result<()> {
//! let config = CacheConfig::builder()
//!     .default_ttl(Duration::from_secs(60))
//!     .max_entries(1_000)
//!     .build()?;
//! let cache: QueryCache = QueryCache::named("products", config);
//!
//! let signature = QuerySignature::of(&SearchRequest::new("laptop", 10));
//! cache.insert(signature.clone(), TransportResponse::default());
//! assert!(cache.get(&signature).is_some());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod queue;

pub use cache::{CacheConfig, CacheConfigBuilder, CacheStatistics, QueryCache};
pub use queue::{ConcurrencyQueue, QueueConfig, QueueError, TaskHandle};
