//! Per-provider runtime state and the circuit breaker state machine
//!
//! Each provider owns one [`ProviderEntry`]. The descriptor sits behind an
//! `RwLock` so runtime updates never block readers for long; counters and the
//! breaker sit behind a `Mutex` so every transition is serialized per
//! provider. Locks are always taken descriptor first, state second, and never
//! held across an `.await`.

use crate::config::{CircuitBreakerConfig, ProviderDescriptor};
use crate::providers::ProviderClient;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Serving normally
    Closed,
    /// Skipped until the open period elapses
    Open,
    /// A single trial decides whether to close again
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Mutable counters for one provider
#[derive(Debug, Clone)]
pub(crate) struct RuntimeState {
    pub breaker: BreakerState,
    pub consecutive_failures: u32,
    /// Only meaningful while half-open
    pub consecutive_successes: u32,
    pub last_state_change: Instant,
    pub last_state_change_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub total_successes: u64,
    pub total_failures: u64,
    pub probe_in_flight: bool,
    /// Bumped on every transition so stale probe guards cannot release a newer claim
    pub generation: u64,
}

impl RuntimeState {
    fn new(now: Instant) -> Self {
        Self {
            breaker: BreakerState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_state_change: now,
            last_state_change_at: Utc::now(),
            last_used_at: None,
            total_successes: 0,
            total_failures: 0,
            probe_in_flight: false,
            generation: 0,
        }
    }

    fn transition(&mut self, to: BreakerState, now: Instant) {
        self.breaker = to;
        self.last_state_change = now;
        self.last_state_change_at = Utc::now();
        self.consecutive_successes = 0;
        self.probe_in_flight = false;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Whether the provider may be tried now, claiming the half-open probe
    /// when that is what admits it. Moves Open to HalfOpen once the open
    /// period has elapsed.
    pub fn admit(&mut self, breaker: &CircuitBreakerConfig, now: Instant) -> Admission {
        match self.breaker {
            BreakerState::Closed => Admission::Admitted,
            BreakerState::Open => {
                if now.duration_since(self.last_state_change) >= breaker.open_duration() {
                    self.transition(BreakerState::HalfOpen, now);
                    self.probe_in_flight = true;
                    Admission::Probe {
                        generation: self.generation,
                    }
                } else {
                    Admission::Rejected
                }
            }
            BreakerState::HalfOpen => {
                if self.probe_in_flight {
                    Admission::Rejected
                } else {
                    self.probe_in_flight = true;
                    Admission::Probe {
                        generation: self.generation,
                    }
                }
            }
        }
    }

    /// Record a successful attempt; returns the new state if it changed
    pub fn record_success(
        &mut self,
        breaker: &CircuitBreakerConfig,
        now: Instant,
    ) -> Option<BreakerState> {
        self.total_successes += 1;
        self.consecutive_failures = 0;
        self.last_used_at = Some(Utc::now());

        if self.breaker == BreakerState::HalfOpen {
            self.consecutive_successes += 1;
            if self.consecutive_successes >= breaker.success_threshold {
                self.transition(BreakerState::Closed, now);
                return Some(BreakerState::Closed);
            }
        }
        None
    }

    /// Record a failed attempt; returns the new state if it changed
    pub fn record_failure(
        &mut self,
        breaker: &CircuitBreakerConfig,
        now: Instant,
    ) -> Option<BreakerState> {
        self.total_failures += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_used_at = Some(Utc::now());

        match self.breaker {
            BreakerState::HalfOpen => {
                self.transition(BreakerState::Open, now);
                Some(BreakerState::Open)
            }
            BreakerState::Closed if self.consecutive_failures >= breaker.failure_threshold => {
                self.transition(BreakerState::Open, now);
                Some(BreakerState::Open)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Admitted,
    Probe { generation: u64 },
    Rejected,
}

/// A provider as the router holds it
pub(crate) struct ProviderEntry {
    pub name: String,
    pub descriptor: RwLock<ProviderDescriptor>,
    pub state: Mutex<RuntimeState>,
    pub client: Arc<dyn ProviderClient>,
}

impl ProviderEntry {
    pub fn new(descriptor: ProviderDescriptor, client: Arc<dyn ProviderClient>) -> Self {
        Self {
            name: descriptor.name.clone(),
            descriptor: RwLock::new(descriptor),
            state: Mutex::new(RuntimeState::new(Instant::now())),
            client,
        }
    }

    fn breaker_config(&self) -> CircuitBreakerConfig {
        self.descriptor.read().circuit_breaker.clone()
    }

    /// Try to admit this provider as a candidate. `None` means skip it.
    pub fn admit(self: &Arc<Self>) -> Option<Option<ProbeGuard>> {
        let breaker = self.breaker_config();
        let mut state = self.state.lock();
        let before = state.breaker;

        match state.admit(&breaker, Instant::now()) {
            Admission::Admitted => Some(None),
            Admission::Probe { generation } => {
                if before != BreakerState::HalfOpen {
                    info!(provider = %self.name, "Circuit half-open, probing provider");
                }
                Some(Some(ProbeGuard {
                    entry: Arc::clone(self),
                    generation,
                }))
            }
            Admission::Rejected => None,
        }
    }

    pub fn record_success(&self) {
        let breaker = self.breaker_config();
        let transition = self.state.lock().record_success(&breaker, Instant::now());

        if let Some(state) = transition {
            info!(provider = %self.name, %state, "Circuit closed after successful probe");
        }
    }

    pub fn record_failure(&self) {
        let breaker = self.breaker_config();
        let (transition, failures) = {
            let mut state = self.state.lock();
            let transition = state.record_failure(&breaker, Instant::now());
            (transition, state.consecutive_failures)
        };

        if let Some(state) = transition {
            warn!(
                provider = %self.name,
                %state,
                consecutive_failures = failures,
                open_duration_ms = breaker.open_duration_ms,
                "Circuit opened"
            );
        }
    }

    /// Whether a request admitted earlier may still send an attempt. An open
    /// breaker stops it; a half-open breaker only lets the probe holder through.
    pub fn may_attempt(&self, probe: Option<&ProbeGuard>) -> bool {
        let state = self.state.lock();
        match state.breaker {
            BreakerState::Closed => true,
            BreakerState::Open => false,
            BreakerState::HalfOpen => probe.is_some_and(|p| p.generation == state.generation),
        }
    }
}

/// Holds the half-open probe claim for one provider; releases it on drop
pub(crate) struct ProbeGuard {
    entry: Arc<ProviderEntry>,
    generation: u64,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        let mut state = self.entry.state.lock();
        if state.generation == self.generation {
            state.probe_in_flight = false;
        }
    }
}

impl fmt::Debug for ProbeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeGuard")
            .field("provider", &self.entry.name)
            .field("generation", &self.generation)
            .finish()
    }
}
