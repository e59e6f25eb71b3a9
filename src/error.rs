//! Huginn error types

use std::time::Duration;

/// Huginn error types
#[derive(Debug, thiserror::Error)]
pub enum HuginnError {
    // Endpoint/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("function not found: {0}")]
    FunctionNotFound(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("empty response from endpoint")]
    EmptyResponse,

    // Configuration errors
    #[error("no endpoint configured")]
    NoEndpoint,

    #[error("configuration error: {0}")]
    Configuration(String),

    /// The queue worker went away before settling the request.
    #[error("request queue closed before the call completed")]
    QueueClosed,
}

impl HuginnError {
    /// Whether the error is worth retrying.
    ///
    /// Network failures, timeouts, rate limits and server-side statuses
    /// (408, 429, 5xx) are transient. Everything else recurs identically on
    /// the next attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            HuginnError::Http(_) | HuginnError::RateLimited { .. } | HuginnError::Timeout(_) => {
                true
            }
            HuginnError::Api { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Server-provided wait hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            HuginnError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for HuginnError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HuginnError::Http(format!("request timed out: {err}"))
        } else {
            HuginnError::Http(err.to_string())
        }
    }
}

/// Result type alias for Huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;
