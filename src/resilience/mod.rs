//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Resilient operation:
//!     → circuit_breaker.rs (admit or short-circuit)
//!     → timeouts.rs (every backend call has a deadline)
//!     → On failure: retries.rs (retryable? how long to wait)
//!     → cache.rs (last good result, fallback when degraded)
//!
//! Reconnect scheduling:
//!     → backoff.rs (exponential, capped, no jitter)
//! ```
//!
//! # Design Decisions
//! - Pure state machines and arithmetic; no I/O in this module
//! - Time comes from `tokio::time`, so tests run on a paused clock
//! - Retries only for 5xx and network errors

pub mod backoff;
pub mod cache;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use cache::{Cached, ResponseCache};
pub use circuit_breaker::{Admission, CircuitBreakerRegistry, CircuitStatus};
pub use retries::{RetryDecision, RetryPolicy};
