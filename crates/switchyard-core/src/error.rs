//! Error types for Switchyard Core

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid tenant: {0}")]
    InvalidTenant(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration not found")]
    ConfigNotFound,

    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by a single provider call.
///
/// Variants carry as much structure as the backend exposes; anything that
/// can't be mapped lands in `Other` and is classified by message keywords.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rate limit exceeded{}", retry_after.map(|d| format!(": retry after {}s", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// HTTP status code associated with this error, when one is known
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Api { status, .. } => Some(*status),
            ProviderError::RateLimited { .. } => Some(429),
            ProviderError::Authentication(_) => Some(401),
            ProviderError::ModelNotFound(_) => Some(404),
            ProviderError::QuotaExceeded(_) => Some(402),
            ProviderError::Timeout(_) => Some(408),
            ProviderError::Network(_) | ProviderError::Other(_) => None,
        }
    }

    /// Retry-after hint from the backend, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_display() {
        let err = ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(err.to_string(), "Rate limit exceeded: retry after 30s");

        let err = ProviderError::RateLimited { retry_after: None };
        assert_eq!(err.to_string(), "Rate limit exceeded");
    }

    #[test]
    fn test_status_code() {
        let err = ProviderError::Api {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(ProviderError::Network("reset".into()).status_code(), None);
    }

    #[test]
    fn test_retry_after_only_for_rate_limits() {
        let err = ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(5)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));
        assert_eq!(
            ProviderError::Timeout(Duration::from_secs(1)).retry_after(),
            None
        );
    }
}
