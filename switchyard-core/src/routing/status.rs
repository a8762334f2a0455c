//! Read-only snapshots and runtime config updates

use crate::config::{
    CircuitBreakerConfig, ProviderCategory, ProviderDescriptor, RetryConfig, ValidationError,
};
use crate::routing::state::BreakerState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of one provider's runtime state and static config
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub category: ProviderCategory,
    pub enabled: bool,
    pub priority: i32,
    pub models: Vec<String>,
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    pub last_state_change: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub probe_in_flight: bool,
    pub rotation_credit: f64,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
}

impl ProviderStatus {
    /// Enabled and not open
    pub fn is_selectable(&self) -> bool {
        self.enabled && self.state != BreakerState::Open
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderHealth {
    pub name: String,
    pub selectable: bool,
    pub enabled: bool,
    pub state: BreakerState,
}

/// Derived health view for status endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub providers: Vec<ProviderHealth>,
    pub healthy_count: usize,
    pub total: usize,
}

impl HealthReport {
    pub fn from_statuses(statuses: &[ProviderStatus]) -> Self {
        let providers: Vec<ProviderHealth> = statuses
            .iter()
            .map(|s| ProviderHealth {
                name: s.name.clone(),
                selectable: s.is_selectable(),
                enabled: s.enabled,
                state: s.state,
            })
            .collect();
        let healthy_count = providers.iter().filter(|p| p.selectable).count();

        Self {
            total: providers.len(),
            providers,
            healthy_count,
        }
    }

    /// At least one provider can take traffic
    pub fn is_healthy(&self) -> bool {
        self.healthy_count > 0
    }
}

/// Fields an operator may change on a live provider; absent fields are kept
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerUpdate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryUpdate>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitBreakerUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_factor: Option<f64>,
}

impl ProviderConfigUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn circuit_breaker(mut self, update: CircuitBreakerUpdate) -> Self {
        self.circuit_breaker = Some(update);
        self
    }

    pub fn retry(mut self, update: RetryUpdate) -> Self {
        self.retry = Some(update);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Merge into a copy of `descriptor` and validate the result
    pub fn apply_to(
        &self,
        descriptor: &ProviderDescriptor,
    ) -> Result<ProviderDescriptor, ValidationError> {
        let mut updated = descriptor.clone();

        if let Some(enabled) = self.enabled {
            updated.enabled = enabled;
        }
        if let Some(priority) = self.priority {
            updated.priority = priority;
        }
        if let Some(breaker) = &self.circuit_breaker {
            let target = &mut updated.circuit_breaker;
            target.failure_threshold = breaker.failure_threshold.unwrap_or(target.failure_threshold);
            target.success_threshold = breaker.success_threshold.unwrap_or(target.success_threshold);
            target.open_duration_ms = breaker.open_duration_ms.unwrap_or(target.open_duration_ms);
        }
        if let Some(retry) = &self.retry {
            let target = &mut updated.retry;
            target.max_attempts = retry.max_attempts.unwrap_or(target.max_attempts);
            target.initial_delay_ms = retry.initial_delay_ms.unwrap_or(target.initial_delay_ms);
            target.max_delay_ms = retry.max_delay_ms.unwrap_or(target.max_delay_ms);
            target.backoff_factor = retry.backoff_factor.unwrap_or(target.backoff_factor);
        }

        updated.validate(&format!("providers.{}", descriptor.name))?;
        Ok(updated)
    }
}
