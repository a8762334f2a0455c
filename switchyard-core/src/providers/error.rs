//! Provider error types and classification

use std::time::Duration;
use thiserror::Error;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Failure of a single completion attempt against one provider
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// Rate limit exceeded, optionally with a server-supplied wait hint
    #[error("Rate limit exceeded{}", .retry_after.map(|d| format!(", retry after {:?}", d)).unwrap_or_default())]
    RateLimit { retry_after: Option<Duration> },

    #[error("Request timeout")]
    Timeout,

    /// Temporary server error (5xx)
    #[error("Server error ({status_code}): {message}")]
    ServerError { status_code: u16, message: String },

    /// Invalid request that should not be retried (4xx)
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Model '{model}' not available")]
    ModelNotAvailable { model: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Failed to parse response: {message}")]
    Parse { message: String },

    /// The client could not be built from its descriptor
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Error [{code}]: {message}")]
    Custom { code: String, message: String },
}

impl ProviderError {
    /// Whether another attempt against the same provider may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimit { .. } => true,
            Self::Timeout => true,
            Self::ServerError { .. } => true,
            Self::Network { .. } => true,
            Self::InvalidRequest { .. } => false,
            Self::Authentication { .. } => false,
            Self::ModelNotAvailable { .. } => false,
            Self::Parse { .. } => false,
            Self::Configuration { .. } => false,
            Self::Custom { .. } => false,
        }
    }

    /// Server-supplied wait hint, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }

    pub fn server(status_code: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status_code,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ProviderError::RateLimit { retry_after: None }.is_retryable());
        assert!(ProviderError::Timeout.is_retryable());
        assert!(ProviderError::server(503, "unavailable").is_retryable());
        assert!(ProviderError::network("reset").is_retryable());

        assert!(!ProviderError::Authentication {
            message: "bad key".into()
        }
        .is_retryable());
        assert!(!ProviderError::InvalidRequest {
            message: "bad".into()
        }
        .is_retryable());
        assert!(!ProviderError::configuration("no key").is_retryable());
    }

    #[test]
    fn test_rate_limit_display_and_hint() {
        let err = ProviderError::RateLimit {
            retry_after: Some(Duration::from_secs(5)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));
        assert!(err.to_string().starts_with("Rate limit exceeded, retry after"));

        let err = ProviderError::RateLimit { retry_after: None };
        assert_eq!(err.to_string(), "Rate limit exceeded");
        assert_eq!(ProviderError::Timeout.retry_after(), None);
    }
}
