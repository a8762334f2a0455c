//! Backoff calculation for the per-candidate retry loop

use crate::config::RetryConfig;
use crate::providers::ProviderError;
use std::time::Duration;

/// Delay before the attempt following failed attempt `attempt` (1-based):
/// `min(max_delay, initial * factor^(attempt-1))`
pub fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let delay_ms = retry.initial_delay_ms as f64 * retry.backoff_factor.powi(exponent);
    let capped = delay_ms.min(retry.max_delay_ms as f64);

    Duration::from_millis(capped as u64)
}

/// Backoff raised to the error's retry-after hint, never beyond `max_delay_ms`
pub fn next_delay(retry: &RetryConfig, attempt: u32, error: &ProviderError) -> Duration {
    let backoff = backoff_delay(retry, attempt);
    let max = Duration::from_millis(retry.max_delay_ms);

    match error.retry_after() {
        Some(hint) => backoff.max(hint).min(max),
        None => backoff,
    }
}
