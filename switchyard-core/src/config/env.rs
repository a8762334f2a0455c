//! Environment variable interpolation and overlay for configuration

use super::error::ConfigError;
use super::schema::{LoadBalancing, RouterConfig};
use super::secrets::SecretString;
use regex::Regex;
use std::env;
use std::sync::OnceLock;

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is a valid regex")
    })
}

/// Interpolate `${VAR}` references in a configuration document
pub fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    interpolate_with(content, |name| env::var(name).ok())
}

/// Interpolate using an arbitrary variable lookup
pub fn interpolate_with<F>(content: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = content.to_string();

    for cap in env_var_pattern().captures_iter(content) {
        let var_name = &cap[1];
        match lookup(var_name) {
            Some(value) => {
                result = result.replace(&cap[0], &value);
            }
            None => {
                return Err(ConfigError::MissingEnvVar {
                    var: var_name.to_string(),
                });
            }
        }
    }

    Ok(result)
}

/// Environment variable prefix for a provider, e.g. "my-openai" -> "MY_OPENAI"
pub fn provider_env_prefix(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Apply overrides from the process environment
pub fn apply_env_overrides(config: &mut RouterConfig) -> Result<(), ConfigError> {
    apply_overrides_with(config, |name| env::var(name).ok())
}

/// Apply environment-style overrides from an arbitrary lookup.
///
/// Recognised variables:
/// - `LLM_DEFAULT_MODEL`, `LLM_LOAD_BALANCING`, `LLM_REQUEST_TIMEOUT_MS`
/// - per provider: `LLM_<NAME>_ENABLED`, `LLM_<NAME>_PRIORITY`,
///   `LLM_<NAME>_BASE_URL`, `<NAME>_API_KEY`
pub fn apply_overrides_with<F>(config: &mut RouterConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(model) = lookup("LLM_DEFAULT_MODEL").filter(|m| !m.trim().is_empty()) {
        config.routing.default_model = Some(model);
    }

    if let Some(raw) = lookup("LLM_LOAD_BALANCING") {
        config.routing.strategy =
            raw.parse::<LoadBalancing>()
                .map_err(|message| ConfigError::BadOverride {
                    var: "LLM_LOAD_BALANCING".to_string(),
                    message,
                })?;
    }

    if let Some(raw) = lookup("LLM_REQUEST_TIMEOUT_MS") {
        config.routing.request_timeout_ms = parse_var("LLM_REQUEST_TIMEOUT_MS", &raw)?;
    }

    for provider in &mut config.providers {
        let prefix = provider_env_prefix(&provider.name);

        let var = format!("LLM_{prefix}_ENABLED");
        if let Some(raw) = lookup(&var) {
            provider.enabled = parse_bool(&var, &raw)?;
        }

        let var = format!("LLM_{prefix}_PRIORITY");
        if let Some(raw) = lookup(&var) {
            provider.priority = parse_var(&var, &raw)?;
        }

        if let Some(url) = lookup(&format!("LLM_{prefix}_BASE_URL")) {
            provider.base_url = Some(url);
        }

        if let Some(key) = lookup(&format!("{prefix}_API_KEY")) {
            provider.api_key = Some(SecretString::new(key));
        }
    }

    Ok(())
}

fn parse_var<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::BadOverride {
            var: var.to_string(),
            message: e.to_string(),
        })
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::BadOverride {
            var: var.to_string(),
            message: format!("expected a boolean, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ModelSpec, ProviderCategory, ProviderDescriptor};
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn sample_config() -> RouterConfig {
        RouterConfig::new(vec![
            ProviderDescriptor::new("openai", ProviderCategory::OpenAI)
                .with_model(ModelSpec::new("gpt-4o", 2.5, 10.0, 16_384)),
            ProviderDescriptor::new("local-ollama", ProviderCategory::Ollama)
                .with_model(ModelSpec::new("llama3", 0.0, 0.0, 8_192)),
        ])
    }

    #[test]
    fn test_interpolate_with_lookup() {
        let lookup = lookup_from(&[("TEST_VAR", "test_value"), ("OTHER", "x")]);
        let result = interpolate_with("api_key: ${TEST_VAR} ${OTHER}", lookup).unwrap();
        assert_eq!(result, "api_key: test_value x");
    }

    #[test]
    fn test_missing_env_var() {
        let result = interpolate_with("api_key: ${MISSING_VAR}", lookup_from(&[]));

        match result {
            Err(ConfigError::MissingEnvVar { var }) => assert_eq!(var, "MISSING_VAR"),
            other => panic!("Expected EnvVarNotFound error, got {:?}", other),
        }
    }

    #[test]
    fn test_provider_env_prefix() {
        assert_eq!(provider_env_prefix("openai"), "OPENAI");
        assert_eq!(provider_env_prefix("local-ollama"), "LOCAL_OLLAMA");
    }

    #[test]
    fn test_overrides_apply_to_routing_and_providers() {
        let mut config = sample_config();
        let lookup = lookup_from(&[
            ("LLM_DEFAULT_MODEL", "llama3"),
            ("LLM_LOAD_BALANCING", "cost_priority_round_robin"),
            ("LLM_OPENAI_ENABLED", "false"),
            ("LLM_LOCAL_OLLAMA_PRIORITY", "7"),
            ("LLM_LOCAL_OLLAMA_BASE_URL", "http://gpu-box:11434/v1"),
            ("OPENAI_API_KEY", "sk-from-env"),
        ]);

        apply_overrides_with(&mut config, lookup).unwrap();

        assert_eq!(config.routing.default_model.as_deref(), Some("llama3"));
        assert_eq!(config.routing.strategy, LoadBalancing::CostPriorityRoundRobin);
        assert!(!config.providers[0].enabled);
        assert_eq!(
            config.providers[0].api_key.as_ref().map(|k| k.expose_secret()),
            Some("sk-from-env")
        );
        assert_eq!(config.providers[1].priority, 7);
        assert_eq!(
            config.providers[1].base_url.as_deref(),
            Some("http://gpu-box:11434/v1")
        );
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let mut config = sample_config();
        let result = apply_overrides_with(&mut config, lookup_from(&[("LLM_OPENAI_PRIORITY", "high")]));
        assert!(matches!(
            result,
            Err(ConfigError::BadOverride { ref var, .. }) if var == "LLM_OPENAI_PRIORITY"
        ));

        let result = apply_overrides_with(&mut config, lookup_from(&[("LLM_LOAD_BALANCING", "random")]));
        assert!(matches!(result, Err(ConfigError::BadOverride { .. })));
    }
}
