//! `POST /indexes/{index}/docs/search` over reqwest

use async_trait::async_trait;
use reqwest::{header, Client, Url};
use search_pager_core::{Record, SearchRequest, Transport, TransportError, TransportResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::HttpTransportConfig;
use crate::error::{request_error, status_error, HttpError, HttpResult};

/// JSON body of a search call.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchBody<'a> {
    pub search: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<&'a str>,
    #[serde(rename = "orderby", skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
    pub top: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    pub count: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_after: Option<&'a [Value]>,
}

impl<'a> From<&'a SearchRequest> for SearchBody<'a> {
    fn from(request: &'a SearchRequest) -> Self {
        let joined = |items: &[String]| (!items.is_empty()).then(|| items.join(","));
        Self {
            search: &request.query_text,
            filter: request.filter.as_deref(),
            order_by: joined(&request.order_by),
            select: joined(&request.select),
            top: request.top,
            skip: request.skip,
            count: request.include_total_count,
            search_after: request.search_after.as_deref(),
        }
    }
}

/// Response envelope of a search call.
#[derive(Debug, Deserialize)]
pub struct SearchEnvelope {
    #[serde(default)]
    pub value: Vec<Record>,
    #[serde(rename = "@odata.count", default)]
    pub count: Option<u64>,
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}

impl From<SearchEnvelope> for TransportResponse {
    fn from(envelope: SearchEnvelope) -> Self {
        Self {
            records: envelope.value,
            total_count: envelope.count,
            raw_cursor: envelope.next_link,
        }
    }
}

/// [`Transport`] backed by a search service's REST API.
///
/// Sends exactly one request per call. Retries, throttling and caching are
/// left to the pager.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: Url,
    endpoint: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> HttpResult<Self> {
        config.validate()?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        for (name, value) in &config.headers {
            let name = header::HeaderName::try_from(name.as_str())
                .map_err(|e| HttpError::Configuration(format!("Invalid header name {}: {}", name, e)))?;
            let mut value = header::HeaderValue::try_from(value.as_str())
                .map_err(|e| HttpError::Configuration(format!("Invalid value for header {}: {}", name, e)))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            url: config.search_url()?,
            endpoint: config.endpoint_name().to_string(),
            timeout: config.timeout,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &SearchRequest) -> Result<TransportResponse, TransportError> {
        debug!(
            endpoint = %self.endpoint,
            top = request.top,
            skip = ?request.skip,
            "POST {}",
            self.url
        );

        let response = self
            .client
            .post(self.url.clone())
            .json(&SearchBody::from(request))
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = status_error(status.as_u16(), &body);
            warn!(endpoint = %self.endpoint, status = status.as_u16(), error = %err, "Search request failed");
            return Err(err);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| request_error(e, self.timeout))?;
        let envelope: SearchEnvelope = serde_json::from_slice(&bytes)
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        Ok(envelope.into())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
