//! Router error types

use crate::config::ValidationError;
use crate::providers::ProviderError;
use std::time::Duration;
use thiserror::Error;

pub type RouterResult<T> = Result<T, RouterError>;

/// Failures surfaced to router callers
#[derive(Debug, Clone, Error)]
pub enum RouterError {
    /// The router could not be built
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The request cannot be routed as given
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Candidate filtering left nothing to try
    #[error("No provider available for model '{model}'")]
    NoProviderAvailable { model: String },

    /// Every candidate exhausted its attempts; holds the last error per provider
    #[error("All providers failed: {}", format_errors(.errors))]
    AllProvidersFailed { errors: Vec<(String, ProviderError)> },

    /// The caller's deadline elapsed
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider '{0}' not found")]
    ProviderNotFound(String),

    /// A runtime config update was rejected
    #[error("Invalid provider update: {0}")]
    InvalidUpdate(#[from] ValidationError),
}

impl RouterError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Terminal error recorded for a provider, if it was attempted
    pub fn provider_error(&self, provider: &str) -> Option<&ProviderError> {
        match self {
            Self::AllProvidersFailed { errors } => errors
                .iter()
                .find(|(name, _)| name == provider)
                .map(|(_, err)| err),
            _ => None,
        }
    }
}

fn format_errors(errors: &[(String, ProviderError)]) -> String {
    errors
        .iter()
        .map(|(provider, err)| format!("{}: {}", provider, err))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_failed_lists_each_provider() {
        let err = RouterError::AllProvidersFailed {
            errors: vec![
                ("openai".to_string(), ProviderError::Timeout),
                ("anthropic".to_string(), ProviderError::server(502, "bad gateway")),
            ],
        };

        let message = err.to_string();
        assert!(message.contains("openai: Request timeout"));
        assert!(message.contains("anthropic: Server error (502): bad gateway"));
        assert_eq!(err.provider_error("openai"), Some(&ProviderError::Timeout));
        assert_eq!(err.provider_error("google"), None);
    }
}
