//! Error types and status mapping
//!
//! Building a transport can fail with an [`HttpError`]. Once built, every
//! failure is reported to the pager as a [`TransportError`], which decides
//! retryability from the status code.

use search_pager_core::TransportError;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

pub type HttpResult<T> = Result<T, HttpError>;

/// `{"error": {"code": "...", "message": "..."}}`
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

/// Maps a non-success response to a [`TransportError::Status`], keeping the
/// service's message when the body is the standard error envelope.
pub fn status_error(status: u16, body: &str) -> TransportError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.code {
            Some(code) => format!("{}: {}", code, envelope.error.message),
            None => envelope.error.message,
        },
        Err(_) if body.trim().is_empty() => format!("HTTP {}", status),
        Err(_) => body.trim().to_string(),
    };
    TransportError::status(status, message)
}

/// Classifies a reqwest failure. Timeouts and connection problems stay
/// retryable; a body that does not decode does not.
pub fn request_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else if err.is_decode() {
        TransportError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
        TransportError::status(status.as_u16(), err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}
