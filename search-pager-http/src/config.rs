//! HTTP transport configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::{HttpError, HttpResult};

pub const DEFAULT_API_VERSION: &str = "2024-07-01";

/// Configuration for [`HttpTransport`](crate::HttpTransport)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpTransportConfig {
    /// Service root, e.g. `https://my-service.search.windows.net`
    pub base_url: String,

    /// Index queried by every request
    pub index: String,

    /// Value of the `api-version` query parameter
    pub api_version: String,

    /// Whole-request timeout enforced by the HTTP client
    #[serde(with = "duration_ms")]
    pub timeout: Duration,

    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,

    pub user_agent: String,

    /// Sent with every request, e.g. the service's key header
    pub headers: Vec<(String, String)>,

    /// Logical endpoint name; defaults to the index name
    pub endpoint: Option<String>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            index: String::new(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("search-pager-http/{}", env!("CARGO_PKG_VERSION")),
            headers: Vec::new(),
            endpoint: None,
        }
    }
}

impl HttpTransportConfig {
    pub fn new(base_url: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            index: index.into(),
            ..Default::default()
        }
    }

    pub fn builder(base_url: impl Into<String>, index: impl Into<String>) -> HttpTransportConfigBuilder {
        HttpTransportConfigBuilder {
            config: Self::new(base_url, index),
        }
    }

    pub fn endpoint_name(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(&self.index)
    }

    /// `{base}/indexes/{index}/docs/search?api-version={version}`
    pub fn search_url(&self) -> HttpResult<Url> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| HttpError::Configuration(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(["indexes", self.index.as_str(), "docs", "search"]);
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }

    pub fn validate(&self) -> HttpResult<()> {
        if self.base_url.is_empty() {
            return Err(HttpError::Configuration("Base URL cannot be empty".to_string()));
        }

        let url = Url::parse(&self.base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HttpError::Configuration(format!(
                "Unsupported URL scheme: {}",
                url.scheme()
            )));
        }

        if self.index.trim().is_empty() {
            return Err(HttpError::Configuration("Index name cannot be empty".to_string()));
        }

        if self.api_version.trim().is_empty() {
            return Err(HttpError::Configuration("API version cannot be empty".to_string()));
        }

        if self.timeout.is_zero() {
            return Err(HttpError::Configuration("Timeout cannot be zero".to_string()));
        }

        Ok(())
    }
}

/// Builder for [`HttpTransportConfig`]
#[derive(Debug)]
pub struct HttpTransportConfigBuilder {
    config: HttpTransportConfig,
}

impl HttpTransportConfigBuilder {
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.config.api_version = version.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.push((name.into(), value.into()));
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = Some(endpoint.into());
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> HttpResult<HttpTransportConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_search_url() {
        let config = HttpTransportConfig::new("https://example.search.net/", "products");

        assert_eq!(
            config.search_url().unwrap().as_str(),
            "https://example.search.net/indexes/products/docs/search?api-version=2024-07-01"
        );
    }

    #[test]
    fn test_builder() {
        let config = HttpTransportConfig::builder("https://example.search.net", "products")
            .api_version("2023-11-01")
            .timeout(Duration::from_secs(5))
            .header("api-key", "secret")
            .build()
            .unwrap();

        assert_eq!(config.api_version, "2023-11-01");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.headers, vec![("api-key".to_string(), "secret".to_string())]);
        assert_eq!(config.endpoint_name(), "products");
    }

    #[test]
    fn test_invalid_config() {
        assert!(HttpTransportConfig::new("", "products").validate().is_err());
        assert!(HttpTransportConfig::new("not a url", "products").validate().is_err());
        assert!(HttpTransportConfig::new("ftp://example.net", "products").validate().is_err());
        assert!(HttpTransportConfig::new("https://example.net", " ").validate().is_err());

        let mut config = HttpTransportConfig::new("https://example.net", "products");
        config.timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(HttpError::Configuration(_))));
    }

    #[test]
    fn test_deserializes_millisecond_timeouts() {
        let config: HttpTransportConfig = serde_json::from_str(
            r#"{"base_url":"https://example.net","index":"products","timeout":2500}"#,
        )
        .unwrap();

        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }
}
