//! # search-pager-http
//!
//! HTTP [`Transport`](search_pager_core::Transport) for `search-pager`.
//!
//! ```rust,no_run
//! use search_pager::{PaginationStrategy, SearchClient, SearchOptions};
//! use search_pager_http::{HttpTransport, HttpTransportConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HttpTransportConfig::builder("https://my-service.search.windows.net", "products")
//!     .header("api-key", std::env::var("SEARCH_API_KEY")?)
//!     .build()?;
//! let transport = Arc::new(HttpTransport::new(config)?);
//!
//! let client = SearchClient::builder().transport(transport).build()?;
//! let records = client
//!     .collect_all("laptop", &SearchOptions::new(50), PaginationStrategy::Offset)
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod transport;

pub use config::{HttpTransportConfig, HttpTransportConfigBuilder, DEFAULT_API_VERSION};
pub use error::{HttpError, HttpResult};
pub use transport::HttpTransport;
