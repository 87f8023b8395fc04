//! Backend collaborator.
//!
//! # Data Flow
//! ```text
//! ResilienceClient
//!     → MessagingApi (trait seam, mocked in tests)
//!     → HttpTransport (reqwest, bounded by request timeout)
//!     → backend REST endpoints
//!
//! Non-success response:
//!     → status captured at the origin
//!     → ApiError::{Client, Server}
//! ```
//!
//! # Design Decisions
//! - Classification by status code, never by message text
//! - `null` collections are normalized to empty here, not at call sites
//! - Tokens are opaque; nothing here decodes or verifies them

pub mod error;
pub mod transport;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use transport::{HttpTransport, MessagingApi};
pub use types::{
    AuthToken, Credentials, MarkReadResponse, Message, Session, UnreadCount, User,
};
