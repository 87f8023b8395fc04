//! Connection state machine.
//!
//! # States
//! ```text
//! Disconnected → Connecting → Connected
//! Connected → Disconnected → Reconnecting → Connecting (on drop)
//! Reconnecting → Exhausted (attempt_count >= max_attempts)
//! any → Connecting (manual reconnect, attempt_count = 0)
//! ```

use std::time::Duration;

use crate::config::ConnectionConfig;
use crate::resilience::backoff::reconnect_delay;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Automatic reconnection gave up; only a manual reconnect resumes.
    Exhausted,
}

impl ConnectionStatus {
    /// Stable numeric code, used for the status gauge.
    pub fn code(&self) -> u8 {
        match self {
            ConnectionStatus::Disconnected => 0,
            ConnectionStatus::Connecting => 1,
            ConnectionStatus::Connected => 2,
            ConnectionStatus::Reconnecting => 3,
            ConnectionStatus::Exhausted => 4,
        }
    }
}

/// Snapshot published by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub attempt_count: u32,
    /// Set between a drop (or manual reconnect) and the next outcome.
    pub recovering: bool,
    pub last_error: Option<String>,
}

impl ConnectionState {
    pub fn health(&self) -> ConnectionHealth {
        ConnectionHealth {
            connected: self.status == ConnectionStatus::Connected,
            reconnecting: match self.status {
                ConnectionStatus::Reconnecting => true,
                ConnectionStatus::Connecting => self.recovering,
                _ => false,
            },
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            attempt_count: 0,
            recovering: false,
            last_error: None,
        }
    }
}

/// What the UI needs to render connection health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHealth {
    pub connected: bool,
    pub reconnecting: bool,
}

/// Bounded exponential reconnect schedule.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay before reconnect attempt `attempt`, or `None` once exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        Some(reconnect_delay(attempt, self.base_delay, self.max_delay))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ConnectionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_and_cap() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u128> = (0..10)
            .map(|a| policy.delay_for(a).unwrap().as_millis())
            .collect();
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000, 30000, 30000]
        );
        assert_eq!(policy.delay_for(10), None);
    }

    #[test]
    fn test_health_mapping() {
        let mut state = ConnectionState::default();
        assert_eq!(
            state.health(),
            ConnectionHealth {
                connected: false,
                reconnecting: false
            }
        );

        state.status = ConnectionStatus::Connecting;
        assert!(!state.health().reconnecting);
        state.recovering = true;
        assert!(state.health().reconnecting);

        state.status = ConnectionStatus::Connected;
        assert!(state.health().connected);

        state.status = ConnectionStatus::Exhausted;
        assert_eq!(
            state.health(),
            ConnectionHealth {
                connected: false,
                reconnecting: false
            }
        );
    }
}
