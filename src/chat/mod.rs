//! Real-time chat core for Huddle.
//!
//! This module provides membership-gated message distribution:
//! - Connection registry mapping live connections to joined chats
//! - Authorization gate backed by the durable membership store
//! - Append-only, per-chat ordered message log
//! - Session protocol (join, leave, send, disconnect) with live fan-out

mod directory;
mod gate;
mod log;
mod registry;
mod service;
mod session;
mod types;

pub use directory::UserDirectory;
pub use gate::{Gate, MembershipStore};
pub use log::{MessageLog, SqliteMessageLog, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
pub use registry::{outbox, ConnectionRegistry, FanoutReport, Inbox, Outbox, Recipient};
pub use service::{ChatService, Delivery, UNKNOWN_AUTHOR};
pub use session::{ChatSession, SessionState};
pub use types::{
    normalize_text, ChatEvent, ChatId, ConnectionId, IgnoreReason, Identity, Message, Outcome,
    UserId, MAX_MESSAGE_LENGTH,
};
