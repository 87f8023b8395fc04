//! Persistent notification connection.
//!
//! # Data Flow
//! ```text
//! Session ──► ConnectionManager::start ──► driver task
//!                                              │
//!     Connector::connect ◄─────────────────────┤
//!            │                                 │
//!            ▼                                 │
//!     PushChannel::recv ──► decode ──► Inbox (watch) + PushEvent (broadcast)
//!            │
//!       drop / error ──► Reconnecting ──► backoff sleep ──► Connecting
//!                              └─► Exhausted (manual reconnect only)
//! ```
//!
//! # Design Decisions
//! - Independent of request-level resilience: no cache, no circuit breaker
//! - Connection errors are never returned to callers, only published as state
//! - Every wait is a `select!` against the command channel, so reconnect
//!   and shutdown cancel pending timers

pub mod events;
pub mod manager;
pub mod state;
pub mod transport;

pub use events::{decode_push_event, Inbox, PushDecodeError, PushEvent};
pub use manager::ConnectionManager;
pub use state::{ConnectionHealth, ConnectionState, ConnectionStatus, ReconnectPolicy};
pub use transport::{ConnectionError, Connector, PushChannel, WsConnector};
