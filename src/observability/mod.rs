//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! client / resilience / connection emit:
//!     → tracing events (retries, breaker transitions, reconnects)
//!     → metrics.rs counters and the connection status gauge
//!
//! The `inbox` binary installs:
//!     → logging.rs subscriber (stderr, RUST_LOG or configured level)
//!     → Prometheus exporter when `observability.metrics_enabled`
//! ```
//!
//! # Design Decisions
//! - stdout stays free for command output
//! - Usernames appear in log fields, never in metric labels

pub mod logging;
pub mod metrics;
