//! Error types for the gateway sync crate.

use gridnode_core::sync::{classify_http_status, SyncRetryClass};
use thiserror::Error;

/// Result type alias for gateway sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur during gateway sync operations.
///
/// Each variant carries a stable [`code`](SyncError::code) for
/// programmatic handling alongside the human-readable message.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport-level failure (timeout, connection refused, TLS)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-2xx response from the gateway
    #[error("gateway error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid configuration or missing credentials; surfaced before any
    /// network call and never retried
    #[error("configuration error: {0}")]
    Config(String),

    /// Local store failure behind the LocalDataManager boundary
    #[error("local store error: {0}")]
    Storage(String),

    /// Run stopped early after consecutive whole-page failures
    #[error("connectivity lost after {pages} consecutive page failures")]
    ConnectivityLost { pages: u32 },

    /// Malformed request (bad parameters, unserializable record, etc.)
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl SyncError {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a local store error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Json(_) => "json",
            Self::Api { .. } => "api",
            Self::Config(_) => "config",
            Self::Storage(_) => "storage",
            Self::ConnectivityLost { .. } => "connectivity_lost",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> SyncRetryClass {
        match self {
            Self::Api { status, .. } => classify_http_status(*status),
            Self::Http(_) => SyncRetryClass::Retryable,
            Self::Json(_) => SyncRetryClass::Permanent,
            Self::Config(_) => SyncRetryClass::Permanent,
            Self::Storage(_) => SyncRetryClass::Permanent,
            Self::ConnectivityLost { .. } => SyncRetryClass::Retryable,
            Self::InvalidRequest(_) => SyncRetryClass::Permanent,
        }
    }
}
