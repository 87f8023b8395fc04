//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failed attempt is retried
//! - Compute the backoff before the next attempt
//!
//! # Design Decisions
//! - Only server errors (5xx) and network errors are retried
//! - The budget is per top-level invocation, not shared across calls
//! - Exponential backoff without jitter: 1s, 2s, 4s for the default budget

use std::time::Duration;

use crate::api::error::ApiError;
use crate::config::RetryConfig;
use crate::resilience::backoff::retry_delay;

/// Outcome of consulting the policy after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again.
    Retry(Duration),
    /// Stop and surface the error (after any fallback).
    Fail,
}

/// Bounded exponential-backoff retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, Duration::from_millis(config.base_delay_ms))
    }

    /// Budget every new invocation starts with.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decide what to do after `error`, with `retries_remaining` still in
    /// the budget.
    pub fn decide(&self, error: &ApiError, retries_remaining: u32) -> RetryDecision {
        if retries_remaining == 0 || !error.is_retryable() {
            return RetryDecision::Fail;
        }
        RetryDecision::Retry(retry_delay(self.max_retries, retries_remaining, self.base_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
