//! Resilient client library for a messaging backend.
//!
//! Two independent halves:
//! - `client`: request-level resilience (retry, per-key circuit breaker,
//!   response cache fallback) over the REST API in `api`
//! - `connection`: a single persistent push connection with bounded
//!   exponential reconnect

pub mod api;
pub mod client;
pub mod config;
pub mod connection;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use api::{ApiError, ApiResult, HttpTransport, MessagingApi};
pub use client::{Resilient, ResilienceClient};
pub use config::ClientConfig;
pub use connection::{ConnectionHealth, ConnectionManager, WsConnector};
pub use lifecycle::Shutdown;
