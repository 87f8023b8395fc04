//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold
//! Open → Half-Open: after reset timeout since the last failure
//! Half-Open → Closed: probe request succeeds (failure_count = 0)
//! Half-Open → Open: probe request fails (window restarts)
//! ```
//!
//! # Design Decisions
//! - One breaker per key ("operation:subject"), created lazily as Closed
//! - Breakers are independent: one user's failures never open another's
//! - Single probe in Half-Open (prevents hammering recovering backend)
//! - Per-key locking via `DashMap`; concurrent callers on the same key may
//!   interleave and the last write wins

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitStatus::Closed => "closed",
            CircuitStatus::Open => "open",
            CircuitStatus::HalfOpen => "half_open",
        }
    }
}

/// Health record for one key.
#[derive(Debug, Clone)]
pub struct BreakerState {
    pub failure_count: u32,
    pub last_failure: Option<Instant>,
    pub status: CircuitStatus,
    /// Start of the outstanding half-open probe, if any.
    probe_started: Option<Instant>,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            failure_count: 0,
            last_failure: None,
            status: CircuitStatus::Closed,
            probe_started: None,
        }
    }
}

/// Whether a real call may go out right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Permitted,
    Rejected { retry_after: Duration },
}

/// Per-key circuit breakers.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, BreakerState>,
    threshold: u32,
    reset_timeout: Duration,
}

impl CircuitBreakerRegistry {
    pub fn new(threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            breakers: DashMap::new(),
            threshold,
            reset_timeout,
        }
    }

    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(
            config.failure_threshold,
            Duration::from_secs(config.reset_timeout_secs),
        )
    }

    /// Ask to perform a real call for `key`.
    ///
    /// An Open breaker whose reset window has elapsed moves to Half-Open
    /// and admits exactly one probe.
    pub fn acquire(&self, key: &str) -> Admission {
        let now = Instant::now();
        let mut entry = self
            .breakers
            .entry(key.to_string())
            .or_insert_with(BreakerState::closed);
        let state = entry.value_mut();

        match state.status {
            CircuitStatus::Closed => Admission::Permitted,
            CircuitStatus::Open => {
                let elapsed = state
                    .last_failure
                    .map(|t| now.saturating_duration_since(t))
                    .unwrap_or(self.reset_timeout);
                if elapsed < self.reset_timeout {
                    return Admission::Rejected {
                        retry_after: self.reset_timeout - elapsed,
                    };
                }
                state.status = CircuitStatus::HalfOpen;
                state.probe_started = Some(now);
                tracing::info!(breaker = %key, "Circuit breaker switching to half-open");
                metrics::record_circuit_transition(operation_of(key), CircuitStatus::HalfOpen);
                Admission::Permitted
            }
            CircuitStatus::HalfOpen => match state.probe_started {
                Some(started) if now.saturating_duration_since(started) < self.reset_timeout => {
                    Admission::Rejected {
                        retry_after: self.reset_timeout - now.saturating_duration_since(started),
                    }
                }
                // No probe outstanding, or the last one was abandoned.
                _ => {
                    state.probe_started = Some(now);
                    Admission::Permitted
                }
            },
        }
    }

    /// Record a successful real call: the breaker closes fully.
    pub fn record_success(&self, key: &str) {
        if let Some(mut state) = self.breakers.get_mut(key) {
            if state.status != CircuitStatus::Closed {
                tracing::info!(breaker = %key, "Circuit breaker reset to closed");
                metrics::record_circuit_transition(operation_of(key), CircuitStatus::Closed);
            }
            *state = BreakerState::closed();
        }
    }

    /// Record a failed real call.
    pub fn record_failure(&self, key: &str) {
        let now = Instant::now();
        let mut entry = self
            .breakers
            .entry(key.to_string())
            .or_insert_with(BreakerState::closed);
        let state = entry.value_mut();

        let previous = state.status;
        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure = Some(now);

        if previous == CircuitStatus::HalfOpen || state.failure_count >= self.threshold {
            state.status = CircuitStatus::Open;
            state.probe_started = None;
        }

        if state.status == CircuitStatus::Open && previous != CircuitStatus::Open {
            tracing::warn!(
                breaker = %key,
                failures = state.failure_count,
                "Circuit breaker opened"
            );
            metrics::record_circuit_transition(operation_of(key), CircuitStatus::Open);
        }
    }

    /// Forget an outstanding half-open probe without judging backend
    /// health (the call failed for a reason unrelated to the backend).
    pub fn release(&self, key: &str) {
        if let Some(mut state) = self.breakers.get_mut(key) {
            state.probe_started = None;
        }
    }

    /// Effective status: an Open breaker past its window reports Half-Open.
    pub fn status(&self, key: &str) -> CircuitStatus {
        let Some(state) = self.breakers.get(key) else {
            return CircuitStatus::Closed;
        };
        match state.status {
            CircuitStatus::Open if self.remaining_window(&state).is_zero() => CircuitStatus::HalfOpen,
            other => other,
        }
    }

    /// Time until an Open breaker admits a probe; zero otherwise.
    pub fn time_until_retry(&self, key: &str) -> Duration {
        match self.breakers.get(key) {
            Some(state) if state.status == CircuitStatus::Open => self.remaining_window(&state),
            _ => Duration::ZERO,
        }
    }

    /// Copy of the record for `key`, if one was ever created.
    pub fn snapshot(&self, key: &str) -> Option<BreakerState> {
        self.breakers.get(key).map(|r| r.value().clone())
    }

    /// Number of keys ever seen.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    fn remaining_window(&self, state: &BreakerState) -> Duration {
        let elapsed = state
            .last_failure
            .map(|t| Instant::now().saturating_duration_since(t))
            .unwrap_or(self.reset_timeout);
        self.reset_timeout.saturating_sub(elapsed)
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::from_config(&CircuitBreakerConfig::default())
    }
}

/// Metric label for a breaker key; subjects (usernames) are dropped.
fn operation_of(key: &str) -> &str {
    key.split(':').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "messages:alice";

    fn open_breaker(registry: &CircuitBreakerRegistry, key: &str) {
        for _ in 0..5 {
            assert_eq!(registry.acquire(key), Admission::Permitted);
            registry.record_failure(key);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold() {
        let registry = CircuitBreakerRegistry::default();
        for _ in 0..4 {
            registry.record_failure(KEY);
        }
        assert_eq!(registry.status(KEY), CircuitStatus::Closed);

        registry.record_failure(KEY);
        assert_eq!(registry.status(KEY), CircuitStatus::Open);
        assert_eq!(registry.snapshot(KEY).unwrap().failure_count, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_open_for_reset_window() {
        let registry = CircuitBreakerRegistry::default();
        open_breaker(&registry, KEY);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(registry.status(KEY), CircuitStatus::Open);
        assert_eq!(
            registry.acquire(KEY),
            Admission::Rejected {
                retry_after: Duration::from_secs(1)
            }
        );
        assert_eq!(registry.time_until_retry(KEY), Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(registry.status(KEY), CircuitStatus::HalfOpen);
        assert_eq!(registry.time_until_retry(KEY), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes() {
        let registry = CircuitBreakerRegistry::default();
        open_breaker(&registry, KEY);
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(registry.acquire(KEY), Admission::Permitted);
        registry.record_success(KEY);

        let state = registry.snapshot(KEY).unwrap();
        assert_eq!(state.status, CircuitStatus::Closed);
        assert_eq!(state.failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_with_fresh_window() {
        let registry = CircuitBreakerRegistry::default();
        open_breaker(&registry, KEY);
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(registry.acquire(KEY), Admission::Permitted);
        registry.record_failure(KEY);

        assert_eq!(registry.status(KEY), CircuitStatus::Open);
        assert_eq!(registry.time_until_retry(KEY), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_probe() {
        let registry = CircuitBreakerRegistry::default();
        open_breaker(&registry, KEY);
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(registry.acquire(KEY), Admission::Permitted);
        assert!(matches!(registry.acquire(KEY), Admission::Rejected { .. }));

        // An abandoned probe does not wedge the breaker.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(registry.acquire(KEY), Admission::Permitted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_frees_probe_slot() {
        let registry = CircuitBreakerRegistry::default();
        open_breaker(&registry, KEY);
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(registry.acquire(KEY), Admission::Permitted);
        registry.release(KEY);
        assert_eq!(registry.status(KEY), CircuitStatus::HalfOpen);
        assert_eq!(registry.acquire(KEY), Admission::Permitted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breakers_are_independent() {
        let registry = CircuitBreakerRegistry::default();
        open_breaker(&registry, "messages:alice");

        assert_eq!(registry.status("messages:alice"), CircuitStatus::Open);
        assert_eq!(registry.status("messages:bob"), CircuitStatus::Closed);
        assert_eq!(registry.acquire("messages:bob"), Admission::Permitted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count_while_closed() {
        let registry = CircuitBreakerRegistry::default();
        for _ in 0..4 {
            registry.record_failure(KEY);
        }
        registry.record_success(KEY);
        registry.record_failure(KEY);
        assert_eq!(registry.snapshot(KEY).unwrap().failure_count, 1);
        assert_eq!(registry.status(KEY), CircuitStatus::Closed);
    }

    #[test]
    fn test_operation_label() {
        assert_eq!(operation_of("unread_count:alice"), "unread_count");
        assert_eq!(operation_of("plain"), "plain");
    }
}
