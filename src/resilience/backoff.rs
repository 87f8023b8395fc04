//! Exponential backoff arithmetic.
//!
//! No jitter: delays are exact so retry and reconnect schedules are
//! reproducible.

use std::time::Duration;

/// `base * 2^step`, capped at `max`. Saturates instead of overflowing.
pub fn exponential_delay(step: u32, base: Duration, max: Duration) -> Duration {
    let base_ms = base.as_millis() as u64;
    let factor = 2u64.checked_pow(step).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(factor);
    Duration::from_millis(delay_ms).min(max)
}

/// Delay before the next request retry given the budget still available.
///
/// With a budget of 3 this yields 1s, 2s, 4s for `retries_remaining` of
/// 3, 2, 1.
pub fn retry_delay(max_retries: u32, retries_remaining: u32, base: Duration) -> Duration {
    let step = max_retries.saturating_sub(retries_remaining);
    exponential_delay(step, base, Duration::MAX)
}

/// Delay before reconnect attempt `attempt` (0-based), capped at `max`.
pub fn reconnect_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    exponential_delay(attempt, base, max)
}
