//! Error taxonomy for backend calls.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by backend operations.
///
/// Classification is structural: the retry and breaker decisions key off
/// the variant and the status captured where the response was read.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// 4xx response. Never retried, never answered from cache.
    #[error("{message}")]
    Client { status: u16, message: String },

    /// 5xx response. Retryable and counted by the circuit breaker.
    #[error("Server error ({status}): {message}. This might be a temporary issue, please try again later.")]
    Server { status: u16, message: String },

    /// No response at all (connect failure, reset, timeout).
    #[error("Network error: {0}")]
    Network(String),

    /// A success response whose body could not be decoded.
    #[error("Malformed response: {0}")]
    Decode(String),

    /// The client itself is misconfigured; nothing was sent.
    #[error("Invalid API configuration: {0}")]
    InvalidConfig(String),

    /// Raised locally when the breaker short-circuits a call and no
    /// fallback applies.
    #[error("The server is currently unavailable. Please try again later. (Circuit breaker open for {operation}, retry in {}s)", .retry_after.as_secs())]
    CircuitOpen {
        operation: &'static str,
        retry_after: Duration,
    },
}

impl ApiError {
    /// Build the error for a non-success HTTP status, synthesizing a
    /// message when the body carried none.
    pub fn from_status(status: u16, message: Option<String>) -> Self {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("API error: {}", status));
        if status >= 500 {
            ApiError::Server { status, message }
        } else {
            ApiError::Client { status, message }
        }
    }

    /// Transient backend failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Server { .. } | ApiError::Network(_))
    }

    /// Whether this failure says anything about backend health.
    pub fn counts_against_breaker(&self) -> bool {
        self.is_retryable()
    }

    /// Marker for UI layers offering a "show cached data" affordance.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ApiError::CircuitOpen { .. })
    }

    /// HTTP status, when the backend answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Client { status, .. } | ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for backend operations.
pub type ApiResult<T> = Result<T, ApiError>;
