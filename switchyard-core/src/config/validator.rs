//! Cross-field configuration validation

use super::error::{ValidationError, ValidationErrorKind};
use super::schema::RouterConfig;
use tracing::warn;

/// Configuration validator layered over the structural checks in the schema
#[derive(Debug, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a configuration with every rule
    pub fn validate(&self, config: &RouterConfig) -> Result<(), ValidationError> {
        config.validate()?;

        self.validate_enabled_providers(config)?;
        self.validate_default_model(config)?;
        self.check_credentials(config);

        Ok(())
    }

    fn validate_enabled_providers(&self, config: &RouterConfig) -> Result<(), ValidationError> {
        let enabled_count = config.providers.iter().filter(|p| p.enabled).count();
        if enabled_count == 0 {
            return Err(ValidationError::new(
                "providers",
                ValidationErrorKind::NothingEnabled,
            ));
        }
        Ok(())
    }

    fn validate_default_model(&self, config: &RouterConfig) -> Result<(), ValidationError> {
        let Some(model) = config.routing.default_model.as_deref() else {
            return Ok(());
        };

        let offered = config
            .providers
            .iter()
            .any(|p| p.enabled && p.supports_model(model));

        if !offered {
            return Err(ValidationError::new(
                "routing.default_model",
                ValidationErrorKind::ModelNotOffered {
                    model: model.to_string(),
                },
            ));
        }
        Ok(())
    }

    /// Missing keys are not fatal here: that provider's client refuses to
    /// build and the router starts without it.
    fn check_credentials(&self, config: &RouterConfig) {
        for provider in config.providers.iter().filter(|p| p.enabled) {
            let missing = provider
                .api_key
                .as_ref()
                .map(|k| k.is_empty())
                .unwrap_or(true);
            if provider.category.requires_api_key() && missing {
                warn!(
                    provider = %provider.name,
                    category = %provider.category,
                    "Provider has no API key configured"
                );
            }
        }
    }
}
