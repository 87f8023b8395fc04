//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → subscribers wake → connection manager closes its socket → exit
//! ```
//!
//! # Design Decisions
//! - Long-running commands select on a shutdown receiver, never on raw signals
//! - A session ends by dropping or shutting down its `ConnectionManager`

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{spawn_signal_handler, wait_for_shutdown_signal};
