//! Identifiers and value types shared by the chat core.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Default maximum message length in characters.
pub const MAX_MESSAGE_LENGTH: usize = 1000;

/// Stored user identifier.
pub type UserId = i64;

/// Identifier of a chat room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChatId(Uuid);

impl ChatId {
    /// Generate a fresh random chat ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a client-supplied chat ID.
    ///
    /// Returns `None` for anything that is not a UUID.
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ChatId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ChatId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Identifier of one live transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a new connection ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Authenticated identity bound to a connection for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable user ID.
    pub user_id: UserId,
    /// Display name at authentication time.
    pub display_name: String,
}

impl Identity {
    /// Create an identity.
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
        }
    }
}

/// A persisted chat message. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Log-assigned, monotonically increasing ID.
    pub id: i64,
    /// Chat the message belongs to.
    pub chat_id: ChatId,
    /// Author's user ID.
    pub author_id: UserId,
    /// Normalized message text.
    pub text: String,
    /// Server-assigned send time.
    pub sent_at: DateTime<Utc>,
}

/// Live push delivered to every connection joined to a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    /// The persisted message.
    pub message: Message,
    /// Author display name resolved at send time.
    pub author_name: String,
}

/// Normalize raw client text into storable message text.
///
/// Leading and trailing whitespace is trimmed. Empty results are rejected
/// and anything longer than `max_chars` characters is truncated.
pub fn normalize_text(raw: &str, max_chars: usize) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => Some(trimmed[..cut].to_string()),
        None => Some(trimmed.to_string()),
    }
}

/// Why a request was silently ignored.
///
/// None of these reach the client; they exist so callers and tests can tell
/// which branch was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The chat identifier could not be parsed.
    MalformedChatId,
    /// The connection is not (or no longer) authenticated.
    Unauthenticated,
    /// The user holds no membership for the chat.
    NotMember,
    /// The message was empty after trimming.
    EmptyMessage,
}

impl IgnoreReason {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::MalformedChatId => "malformed_chat_id",
            IgnoreReason::Unauthenticated => "unauthenticated",
            IgnoreReason::NotMember => "not_member",
            IgnoreReason::EmptyMessage => "empty_message",
        }
    }
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a protocol operation that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T = ()> {
    /// The operation took effect.
    Applied(T),
    /// The operation was dropped without effect.
    Ignored(IgnoreReason),
}

impl<T> Outcome<T> {
    /// Whether the operation took effect.
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    /// The ignore reason, if any.
    pub fn ignored(&self) -> Option<IgnoreReason> {
        match self {
            Outcome::Applied(_) => None,
            Outcome::Ignored(reason) => Some(*reason),
        }
    }

    /// The applied value, if any.
    pub fn applied(self) -> Option<T> {
        match self {
            Outcome::Applied(value) => Some(value),
            Outcome::Ignored(_) => None,
        }
    }
}
