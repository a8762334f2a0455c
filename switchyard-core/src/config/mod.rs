//! Configuration module
//!
//! Provides the typed router configuration, loading from YAML or JSON,
//! environment overlay and eager validation. Sources are applied in a fixed
//! order: serde defaults, file contents, `${VAR}` interpolation, then
//! `LLM_*` environment overrides.

mod env;
mod error;
mod schema;
mod secrets;
mod validator;

pub use env::{
    apply_env_overrides, apply_overrides_with, interpolate_env_vars, interpolate_with,
    provider_env_prefix,
};
pub use error::{ConfigError, ConfigResult, ValidationError, ValidationErrorKind};
pub use schema::{
    CircuitBreakerConfig, ConnectionConfig, DefaultConfig, LoadBalancing, ModelSpec,
    ProviderCategory, ProviderDescriptor, RetryConfig, RouterConfig, RoutingConfig,
    SCHEMA_VERSION,
};
pub use secrets::SecretString;
pub use validator::ConfigValidator;

use std::fs;
use std::path::Path;
use tracing::info;

/// Load a configuration from a YAML or JSON file, picked by extension
pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<RouterConfig> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("yaml") | Some("yml") => load_from_yaml(path),
        Some("json") => load_from_json(path),
        _ => Err(ConfigError::UnsupportedFormat {
            path: path.to_string_lossy().to_string(),
        }),
    }
}

/// Load a configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> ConfigResult<RouterConfig> {
    let path = path.as_ref();
    let content = read_interpolated(path)?;

    let config: RouterConfig =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Malformed {
            path: path.to_string_lossy().to_string(),
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
            message: e.to_string(),
        })?;

    finish(path, config)
}

/// Load a configuration from a JSON file
pub fn load_from_json<P: AsRef<Path>>(path: P) -> ConfigResult<RouterConfig> {
    let path = path.as_ref();
    let content = read_interpolated(path)?;

    let config: RouterConfig =
        serde_json::from_str(&content).map_err(|e| ConfigError::Malformed {
            path: path.to_string_lossy().to_string(),
            line: Some(e.line()),
            column: Some(e.column()),
            message: e.to_string(),
        })?;

    finish(path, config)
}

fn read_interpolated(path: &Path) -> ConfigResult<String> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;

    interpolate_env_vars(&content)
}

fn finish(path: &Path, mut config: RouterConfig) -> ConfigResult<RouterConfig> {
    apply_env_overrides(&mut config)?;
    ConfigValidator::new().validate(&config)?;

    info!(
        path = %path.display(),
        providers = config.providers.len(),
        strategy = %config.routing.strategy,
        "Loaded router configuration"
    );
    Ok(config)
}
