//! Errors raised while loading and checking a router configuration

use thiserror::Error;

/// Failure to produce a usable [`RouterConfig`](super::RouterConfig)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read router config '{path}': {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed router config '{path}'{}: {message}", location(.line, .column))]
    Malformed {
        path: String,
        line: Option<usize>,
        column: Option<usize>,
        message: String,
    },

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("router config references ${{{var}}} but it is not set")]
    MissingEnvVar { var: String },

    #[error("cannot apply {var} to the router config: {message}")]
    BadOverride { var: String, message: String },

    #[error("router config '{path}' must end in .yaml, .yml or .json")]
    UnsupportedFormat { path: String },
}

fn location(line: &Option<usize>, column: &Option<usize>) -> String {
    match (line, column) {
        (Some(line), Some(column)) => format!(" at {line}:{column}"),
        (Some(line), None) => format!(" at line {line}"),
        _ => String::new(),
    }
}

/// A rejected setting and where it lives, e.g.
/// `providers[1].retry.max_attempts`
#[derive(Debug, Clone, Error)]
#[error("invalid router config at '{field_path}': {kind}")]
pub struct ValidationError {
    pub field_path: String,
    pub kind: ValidationErrorKind,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationErrorKind {
    #[error("schema version '{found}' is not supported, expected '{expected}'")]
    UnsupportedVersion {
        expected: &'static str,
        found: String,
    },

    #[error("no providers configured")]
    NoProviders,

    #[error("no provider is enabled")]
    NothingEnabled,

    #[error("an enabled provider must offer at least one model")]
    NoModels,

    #[error("name must not be blank")]
    BlankName,

    #[error("'{name}' is defined more than once")]
    Duplicate { name: String },

    #[error("base URL is not usable: {reason}")]
    BadBaseUrl { reason: String },

    #[error("must be greater than zero")]
    NotPositive,

    #[error("cost must be a non-negative USD amount, got {value}")]
    NegativeCost { value: f64 },

    #[error("max delay {max_ms}ms is below the initial delay {initial_ms}ms")]
    DelayBelowInitial { initial_ms: u64, max_ms: u64 },

    #[error("backoff factor must be at least 1.0 so delays never shrink, got {value}")]
    ShrinkingBackoff { value: f64 },

    #[error("model '{model}' is not offered by any enabled provider")]
    ModelNotOffered { model: String },
}

impl ValidationError {
    pub fn new(field_path: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            field_path: field_path.into(),
            kind,
        }
    }

    pub fn not_positive(field_path: impl Into<String>) -> Self {
        Self::new(field_path, ValidationErrorKind::NotPositive)
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
