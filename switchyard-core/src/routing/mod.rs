//! Provider selection, fallback and circuit breaking
//!
//! [`Router`] is the entry point. It owns one runtime state per provider,
//! orders candidates with a [`LoadBalancing`](crate::config::LoadBalancing)
//! strategy and drives the retry and fallback loop.

pub mod error;
pub mod retry;
pub mod router;
pub mod state;
pub mod status;
pub mod strategy;

pub use error::{RouterError, RouterResult};
pub use retry::{backoff_delay, next_delay};
pub use router::Router;
pub use state::BreakerState;
pub use status::{
    CircuitBreakerUpdate, HealthReport, ProviderConfigUpdate, ProviderHealth, ProviderStatus,
    RetryUpdate,
};
pub use strategy::{order_candidates, Candidate, RotationCursor, MAX_WEIGHT_RATIO};
