//! Configuration schema structures with serde support

use super::error::{ValidationError, ValidationErrorKind};
use super::secrets::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Supported schema version
pub const SCHEMA_VERSION: &str = "0.1";

/// Root configuration structure for the router
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    /// Schema version (required - no default)
    pub version: String,

    /// Ordered list of provider descriptors
    #[serde(default)]
    pub providers: Vec<ProviderDescriptor>,

    #[serde(default)]
    pub routing: RoutingConfig,

    /// HTTP settings shared by the built-in provider clients
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Sampling defaults applied when a request leaves them unset
    #[serde(default)]
    pub defaults: DefaultConfig,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Static configuration for one backend provider
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderDescriptor {
    /// Unique provider name
    pub name: String,

    /// Backend category, used to pick the client implementation
    #[serde(rename = "type")]
    pub category: ProviderCategory,

    /// API key (supports `${VAR}` interpolation)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<SecretString>,

    /// Base URL override; each category has a sensible default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Priority for routing (higher = preferred)
    #[serde(default = "default_priority")]
    pub priority: i32,

    #[serde(default)]
    pub models: Vec<ModelSpec>,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

/// Provider categories with a built-in client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderCategory {
    OpenAI,
    Anthropic,
    Google,
    Ollama,
    /// Client supplied by the embedding application
    Custom,
}

impl ProviderCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Ollama => "ollama",
            Self::Custom => "custom",
        }
    }

    /// Base URL used when the descriptor does not set one
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Self::OpenAI => Some("https://api.openai.com/v1"),
            Self::Anthropic => Some("https://api.anthropic.com/v1"),
            Self::Google => Some("https://generativelanguage.googleapis.com/v1beta"),
            Self::Ollama => Some("http://localhost:11434/v1"),
            Self::Custom => None,
        }
    }

    /// Whether calls to this backend need an API key
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAI | Self::Anthropic | Self::Google)
    }
}

impl fmt::Display for ProviderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model offered by a provider, with cost and size metadata
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSpec {
    /// Model identifier (e.g. "gpt-4o", "claude-3-5-sonnet")
    pub name: String,

    /// Cost per 1K input tokens (in USD)
    #[serde(default)]
    pub cost_per_1k_input: f64,

    /// Cost per 1K output tokens (in USD)
    #[serde(default)]
    pub cost_per_1k_output: f64,

    /// Maximum tokens the model accepts for a completion
    pub max_tokens: u32,
}

impl ModelSpec {
    pub fn new(
        name: impl Into<String>,
        cost_per_1k_input: f64,
        cost_per_1k_output: f64,
        max_tokens: u32,
    ) -> Self {
        Self {
            name: name.into(),
            cost_per_1k_input,
            cost_per_1k_output,
            max_tokens,
        }
    }

    /// Mean of input and output cost per 1K tokens
    pub fn blended_cost(&self) -> f64 {
        (self.cost_per_1k_input + self.cost_per_1k_output) / 2.0
    }

    /// Estimated USD cost of a call with the given token counts
    pub fn estimate_cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (prompt_tokens as f64 / 1000.0) * self.cost_per_1k_input
            + (completion_tokens as f64 / 1000.0) * self.cost_per_1k_output
    }
}

/// Circuit breaker tunables
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Consecutive half-open successes that close the breaker
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// How long the breaker stays open before a probe is allowed
    #[serde(default = "default_open_duration")]
    pub open_duration_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            open_duration_ms: default_open_duration(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn open_duration(&self) -> Duration {
        Duration::from_millis(self.open_duration_ms)
    }
}

/// Per-provider retry policy
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts against one provider, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Multiplier applied to the delay after each failed attempt
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

/// Routing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    #[serde(default)]
    pub strategy: LoadBalancing,

    /// Model used when a request does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Overall deadline for one `execute()` call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            strategy: LoadBalancing::default(),
            default_model: None,
            request_timeout_ms: default_request_timeout(),
        }
    }
}

/// Selection strategies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancing {
    /// Rotate the start position through the candidate list
    #[default]
    RoundRobin,
    /// Priority tiers, weighted rotation by inverse cost inside each tier
    CostPriorityRoundRobin,
}

impl LoadBalancing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::CostPriorityRoundRobin => "cost_priority_round_robin",
        }
    }
}

impl fmt::Display for LoadBalancing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadBalancing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round_robin" => Ok(Self::RoundRobin),
            "cost_priority_round_robin" => Ok(Self::CostPriorityRoundRobin),
            other => Err(format!(
                "expected round_robin or cost_priority_round_robin, got {other}"
            )),
        }
    }
}

/// Connection configuration for the HTTP clients
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Timeout of a single HTTP call (one attempt)
    #[serde(default = "default_attempt_timeout")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_max_idle")]
    pub max_idle_per_host: usize,

    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_attempt_timeout(),
            max_idle_per_host: default_max_idle(),
            keepalive_secs: default_keepalive(),
        }
    }
}

/// Default sampling values
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            temperature: Some(0.7),
            max_tokens: None,
        }
    }
}

// Default value functions for serde
fn default_true() -> bool { true }
fn default_priority() -> i32 { 1 }
fn default_failure_threshold() -> u32 { 5 }
fn default_success_threshold() -> u32 { 1 }
fn default_open_duration() -> u64 { 30_000 }
fn default_max_attempts() -> u32 { 3 }
fn default_initial_delay() -> u64 { 500 }
fn default_max_delay() -> u64 { 10_000 }
fn default_backoff_factor() -> f64 { 2.0 }
fn default_request_timeout() -> u64 { 120_000 }
fn default_connect_timeout() -> u64 { 10_000 }
fn default_attempt_timeout() -> u64 { 60_000 }
fn default_max_idle() -> usize { 10 }
fn default_keepalive() -> u64 { 90 }

impl RouterConfig {
    /// Build a config from descriptors with every other section defaulted
    pub fn new(providers: Vec<ProviderDescriptor>) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            providers,
            routing: RoutingConfig::default(),
            connection: ConnectionConfig::default(),
            defaults: DefaultConfig::default(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: LoadBalancing) -> Self {
        self.routing.strategy = strategy;
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.routing.default_model = Some(model.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.routing.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Structural validation of the whole document
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version != SCHEMA_VERSION {
            return Err(ValidationError::new(
                "version",
                ValidationErrorKind::UnsupportedVersion {
                    expected: SCHEMA_VERSION,
                    found: self.version.clone(),
                },
            ));
        }

        if self.providers.is_empty() {
            return Err(ValidationError::new(
                "providers",
                ValidationErrorKind::NoProviders,
            ));
        }

        let mut seen_names = HashSet::new();
        for (i, provider) in self.providers.iter().enumerate() {
            if !seen_names.insert(&provider.name) {
                return Err(ValidationError::new(
                    format!("providers[{}].name", i),
                    ValidationErrorKind::Duplicate {
                        name: provider.name.clone(),
                    },
                ));
            }

            provider.validate(&format!("providers[{}]", i))?;
        }

        if self.routing.request_timeout_ms == 0 {
            return Err(ValidationError::not_positive("routing.request_timeout_ms"));
        }

        Ok(())
    }
}

impl ProviderDescriptor {
    pub fn new(name: impl Into<String>, category: ProviderCategory) -> Self {
        Self {
            name: name.into(),
            category,
            api_key: None,
            base_url: None,
            enabled: true,
            priority: default_priority(),
            models: Vec::new(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_model(mut self, model: ModelSpec) -> Self {
        self.models.push(model);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<SecretString>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self, name: &str) -> Option<&ModelSpec> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn supports_model(&self, name: &str) -> bool {
        self.model(name).is_some()
    }

    /// Configured base URL, falling back to the category default
    pub fn resolved_base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .or_else(|| self.category.default_base_url())
    }

    /// Validate descriptor invariants
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::new(
                format!("{}.name", path),
                ValidationErrorKind::BlankName,
            ));
        }

        if let Some(base_url) = &self.base_url {
            let reason = match url::Url::parse(base_url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => None,
                Ok(url) => Some(format!("scheme must be http or https, got {}", url.scheme())),
                Err(e) => Some(e.to_string()),
            };
            if let Some(reason) = reason {
                return Err(ValidationError::new(
                    format!("{}.base_url", path),
                    ValidationErrorKind::BadBaseUrl { reason },
                ));
            }
        }

        if self.enabled && self.models.is_empty() {
            return Err(ValidationError::new(
                format!("{}.models", path),
                ValidationErrorKind::NoModels,
            ));
        }

        let mut seen_models = HashSet::new();
        for (i, model) in self.models.iter().enumerate() {
            let model_path = format!("{}.models[{}]", path, i);

            if model.name.trim().is_empty() {
                return Err(ValidationError::new(
                    format!("{}.name", model_path),
                    ValidationErrorKind::BlankName,
                ));
            }

            if !seen_models.insert(&model.name) {
                return Err(ValidationError::new(
                    format!("{}.name", model_path),
                    ValidationErrorKind::Duplicate {
                        name: model.name.clone(),
                    },
                ));
            }

            model.validate(&model_path)?;
        }

        self.circuit_breaker
            .validate(&format!("{}.circuit_breaker", path))?;
        self.retry.validate(&format!("{}.retry", path))?;

        Ok(())
    }
}

impl ModelSpec {
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.max_tokens == 0 {
            return Err(ValidationError::not_positive(format!("{}.max_tokens", path)));
        }

        for (field, cost) in [
            ("cost_per_1k_input", self.cost_per_1k_input),
            ("cost_per_1k_output", self.cost_per_1k_output),
        ] {
            if !cost.is_finite() || cost < 0.0 {
                return Err(ValidationError::new(
                    format!("{}.{}", path, field),
                    ValidationErrorKind::NegativeCost { value: cost },
                ));
            }
        }

        Ok(())
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.failure_threshold == 0 {
            return Err(ValidationError::not_positive(format!("{}.failure_threshold", path)));
        }

        if self.success_threshold == 0 {
            return Err(ValidationError::not_positive(format!("{}.success_threshold", path)));
        }

        if self.open_duration_ms == 0 {
            return Err(ValidationError::not_positive(format!("{}.open_duration_ms", path)));
        }

        Ok(())
    }
}

impl RetryConfig {
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::not_positive(format!("{}.max_attempts", path)));
        }

        if self.initial_delay_ms == 0 {
            return Err(ValidationError::not_positive(format!("{}.initial_delay_ms", path)));
        }

        if self.max_delay_ms < self.initial_delay_ms {
            return Err(ValidationError::new(
                format!("{}.max_delay_ms", path),
                ValidationErrorKind::DelayBelowInitial {
                    initial_ms: self.initial_delay_ms,
                    max_ms: self.max_delay_ms,
                },
            ));
        }

        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ValidationError::new(
                format!("{}.backoff_factor", path),
                ValidationErrorKind::ShrinkingBackoff {
                    value: self.backoff_factor,
                },
            ));
        }

        Ok(())
    }
}
