//! Provider error types and retry classification

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type for provider adapter calls
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors an adapter can report for a single call
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ProviderError {
    /// Provider rejected the call for rate reasons, possibly with a hint
    #[error("Rate limit exceeded{}", .retry_after.map(|d| format!(", retry after {:?}", d)).unwrap_or_default())]
    RateLimit { retry_after: Option<Duration> },

    /// The call did not complete in time
    #[error("Request timed out after {after:?}")]
    Timeout { after: Duration },

    /// Temporary server error (5xx)
    #[error("Server error ({status_code}): {message}")]
    ServerError { status_code: u16, message: String },

    /// Request that should not be retried against the same provider (4xx)
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Credentials rejected
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Endpoint or model missing on this provider
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Connection-level failure
    #[error("Network error: {message}")]
    Network { message: String },

    /// Provider-specific failure
    #[error("Error [{code}]: {message}")]
    Custom { code: String, message: String },
}

impl ProviderError {
    /// Whether retrying the same provider can plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimit { .. } => true,
            Self::Timeout { .. } => true,
            Self::ServerError { .. } => true,
            Self::Network { .. } => true,
            Self::NotFound { .. } => false,
            Self::InvalidRequest { .. } => false,
            Self::Authentication { .. } => false,
            Self::Custom { .. } => true,
        }
    }

    /// Delay the provider asked for before the next attempt
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Whether this error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Shorthand for a custom error
    pub fn custom(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Custom {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::custom("PARSE_ERROR", err.to_string())
    }
}
