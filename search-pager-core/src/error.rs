use std::time::Duration;
use thiserror::Error;

/// Failure reported by a [`Transport`](crate::Transport) implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Search service returned {status_code}: {message}")]
    Status { status_code: u16, message: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn status(status_code: u16, message: impl Into<String>) -> Self {
        TransportError::Status {
            status_code,
            message: message.into(),
        }
    }

    /// Throttling, server-side and connectivity failures are transient.
    /// Every other status (bad request, unauthorized, not found) is fatal.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Status { status_code, .. } => {
                *status_code == 429 || (500..=599).contains(status_code)
            }
            TransportError::Timeout(_) | TransportError::Network(_) => true,
            TransportError::Decode(_) => false,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Status { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid pagination cursor: {0}")]
    InvalidCursor(String),

    #[error("Search request failed after {attempts} attempt(s): {source}")]
    Transport {
        attempts: usize,
        #[source]
        source: TransportError,
    },

    #[error("Circuit breaker is open for {endpoint}")]
    CircuitOpen { endpoint: String },

    #[error("Search request was cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    /// Number of transport attempts made before the error surfaced, if any were made.
    pub fn attempts(&self) -> Option<usize> {
        match self {
            SearchError::Transport { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            SearchError::Transport { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, SearchError::CircuitOpen { .. })
    }
}

impl From<validator::ValidationErrors> for SearchError {
    fn from(err: validator::ValidationErrors) -> Self {
        SearchError::Validation(err.to_string())
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::InvalidCursor(err.to_string())
    }
}
