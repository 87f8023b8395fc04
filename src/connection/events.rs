//! Inbound push events.
//!
//! Envelopes are `{"type": ..., "data": ...}` with exactly two kinds:
//! a new message and an unread-count snapshot. Anything else is malformed
//! and dropped by the caller without touching connection state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::types::{Message, UnreadCount};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    NewMessage(Message),
    UnreadCount(UnreadCount),
}

impl PushEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PushEvent::NewMessage(_) => "new_message",
            PushEvent::UnreadCount(_) => "unread_count",
        }
    }
}

#[derive(Debug, Error)]
#[error("malformed push event: {0}")]
pub struct PushDecodeError(#[from] serde_json::Error);

pub fn decode_push_event(payload: &str) -> Result<PushEvent, PushDecodeError> {
    Ok(serde_json::from_str(payload)?)
}

/// Notifications accumulated from the push channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inbox {
    pub messages: Vec<Message>,
    pub unread_count: u64,
}

impl Inbox {
    pub fn apply(&mut self, event: &PushEvent) {
        match event {
            PushEvent::NewMessage(message) => {
                self.messages.push(message.clone());
                self.unread_count = self.unread_count.saturating_add(1);
            }
            PushEvent::UnreadCount(snapshot) => {
                self.unread_count = snapshot.count;
            }
        }
    }
}
