//! Chat session protocol.
//!
//! [`ChatService`] runs join, leave, send and disconnect for every live
//! connection in the process. Authorization failures never surface to the
//! client: they come back as [`Outcome::Ignored`] so the transport can stay
//! silent while tests can still see which branch was taken. Only store
//! failures are returned as errors.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info};

use super::directory::UserDirectory;
use super::gate::{Gate, MembershipStore};
use super::log::{MessageLog, SqliteMessageLog};
use super::registry::{ConnectionRegistry, FanoutReport, Outbox};
use super::types::{
    normalize_text, ChatEvent, ChatId, ConnectionId, IgnoreReason, Identity, Message, Outcome,
    UserId, MAX_MESSAGE_LENGTH,
};
use crate::config::ChatConfig;
use crate::db::Database;
use crate::Result;

/// Name shown in history for authors the directory no longer knows.
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// Result of an accepted send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// The persisted message.
    pub message: Message,
    /// Display name pushed with the message.
    pub author_name: String,
    /// Per-connection push results.
    pub report: FanoutReport,
}

/// Shared chat protocol engine, one per process.
pub struct ChatService {
    registry: Arc<ConnectionRegistry>,
    gate: Gate,
    log: Arc<dyn MessageLog>,
    directory: Arc<dyn UserDirectory>,
    max_message_length: usize,
}

impl ChatService {
    /// Create a service from its collaborators.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        gate: Gate,
        log: Arc<dyn MessageLog>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            registry,
            gate,
            log,
            directory,
            max_message_length: MAX_MESSAGE_LENGTH,
        }
    }

    /// Wire a service entirely against one database.
    pub fn with_database(db: &Database, config: &ChatConfig) -> Self {
        let membership: Arc<dyn MembershipStore> = Arc::new(db.clone());
        Self::new(
            Arc::new(ConnectionRegistry::new()),
            Gate::new(membership),
            Arc::new(SqliteMessageLog::new(db.clone())),
            Arc::new(db.clone()),
        )
        .with_max_message_length(config.max_message_length)
    }

    /// Override the message length cap.
    pub fn with_max_message_length(mut self, max: usize) -> Self {
        self.max_message_length = max.clamp(1, MAX_MESSAGE_LENGTH);
        self
    }

    /// The live connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Register an authenticated connection.
    pub async fn connect(
        &self,
        conn: ConnectionId,
        identity: Identity,
        outbox: Outbox,
    ) -> Result<()> {
        let user = identity.user_id;
        self.registry.register(conn, identity, outbox).await?;
        info!(conn = %conn, user, "Connection registered");
        Ok(())
    }

    /// Join a chat's live group after a fresh membership check.
    pub async fn join(&self, conn: ConnectionId, chat: &str) -> Result<Outcome> {
        let Some(chat) = ChatId::parse(chat) else {
            return Ok(ignored(conn, None, IgnoreReason::MalformedChatId));
        };
        let Some(identity) = self.registry.identity_of(conn).await else {
            return Ok(ignored(conn, Some(chat), IgnoreReason::Unauthenticated));
        };
        if !self.gate.is_member(identity.user_id, chat).await? {
            return Ok(ignored(conn, Some(chat), IgnoreReason::NotMember));
        }

        if self.registry.join(conn, chat).await {
            debug!(conn = %conn, chat = %chat, user = identity.user_id, "Joined chat");
        }
        Ok(Outcome::Applied(()))
    }

    /// Leave a chat's live group. No membership check.
    pub async fn leave(&self, conn: ConnectionId, chat: &str) -> Result<Outcome> {
        let Some(chat) = ChatId::parse(chat) else {
            return Ok(ignored(conn, None, IgnoreReason::MalformedChatId));
        };
        if self.registry.identity_of(conn).await.is_none() {
            return Ok(ignored(conn, Some(chat), IgnoreReason::Unauthenticated));
        }

        if self.registry.leave(conn, chat).await {
            debug!(conn = %conn, chat = %chat, "Left chat");
        }
        Ok(Outcome::Applied(()))
    }

    /// Persist a message and push it to the chat's live group.
    ///
    /// The gate answers first; the log re-checks membership in the same
    /// write, so a membership revoked in between still stores nothing. The
    /// group snapshot is taken after the append commits. Push failures are
    /// counted in the report and never undo the append.
    pub async fn send(
        &self,
        conn: ConnectionId,
        chat: &str,
        text: &str,
    ) -> Result<Outcome<Delivery>> {
        let Some(identity) = self.registry.identity_of(conn).await else {
            return Ok(ignored(conn, ChatId::parse(chat), IgnoreReason::Unauthenticated));
        };
        let Some(text) = normalize_text(text, self.max_message_length) else {
            return Ok(ignored(conn, ChatId::parse(chat), IgnoreReason::EmptyMessage));
        };
        let Some(chat) = ChatId::parse(chat) else {
            return Ok(ignored(conn, None, IgnoreReason::MalformedChatId));
        };
        if !self.gate.is_member(identity.user_id, chat).await? {
            return Ok(ignored(conn, Some(chat), IgnoreReason::NotMember));
        }

        let message = match self.log.append(chat, identity.user_id, &text).await {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(ignored(conn, Some(chat), IgnoreReason::NotMember)),
            Err(e) => {
                error!(
                    conn = %conn,
                    chat = %chat,
                    user = identity.user_id,
                    error = %e,
                    "Append failed"
                );
                return Err(e);
            }
        };
        let recipients = self.registry.members_of(chat).await;

        let author_name = self.author_name(&identity).await;
        let event = Arc::new(ChatEvent {
            message: message.clone(),
            author_name: author_name.clone(),
        });
        let report = FanoutReport::deliver(&recipients, event);

        debug!(
            conn = %conn,
            chat = %chat,
            user = identity.user_id,
            message_id = message.id,
            delivered = report.delivered,
            dropped = report.dropped,
            "Message sent"
        );

        Ok(Outcome::Applied(Delivery {
            message,
            author_name,
            report,
        }))
    }

    /// Remove a connection from every group. Safe to call more than once.
    pub async fn disconnect(&self, conn: ConnectionId) -> Option<Vec<ChatId>> {
        let chats = self.registry.unregister(conn).await?;
        info!(conn = %conn, chats = chats.len(), "Connection unregistered");
        Some(chats)
    }

    /// Membership-gated read of a chat's most recent messages, oldest first.
    ///
    /// Author names are resolved at read time.
    pub async fn history(
        &self,
        user: UserId,
        chat: &str,
        limit: usize,
    ) -> Result<Outcome<Vec<ChatEvent>>> {
        let Some(chat) = ChatId::parse(chat) else {
            debug!(user, reason = %IgnoreReason::MalformedChatId, "History ignored");
            return Ok(Outcome::Ignored(IgnoreReason::MalformedChatId));
        };
        if !self.gate.is_member(user, chat).await? {
            debug!(user, chat = %chat, reason = %IgnoreReason::NotMember, "History ignored");
            return Ok(Outcome::Ignored(IgnoreReason::NotMember));
        }

        let messages = self.log.recent(chat, limit).await?;
        let mut names: HashMap<UserId, String> = HashMap::new();
        let mut events = Vec::with_capacity(messages.len());
        for message in messages {
            let author_name = match names.get(&message.author_id) {
                Some(name) => name.clone(),
                None => {
                    let name = self
                        .directory
                        .display_name(message.author_id)
                        .await?
                        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());
                    names.insert(message.author_id, name.clone());
                    name
                }
            };
            events.push(ChatEvent {
                message,
                author_name,
            });
        }
        Ok(Outcome::Applied(events))
    }

    /// Display name for a push, read live. Falls back to the connection's name.
    async fn author_name(&self, identity: &Identity) -> String {
        match self.directory.display_name(identity.user_id).await {
            Ok(Some(name)) => name,
            Ok(None) => identity.display_name.clone(),
            Err(e) => {
                error!(user = identity.user_id, error = %e, "Display name lookup failed");
                identity.display_name.clone()
            }
        }
    }
}

fn ignored<T>(conn: ConnectionId, chat: Option<ChatId>, reason: IgnoreReason) -> Outcome<T> {
    match chat {
        Some(chat) => debug!(conn = %conn, chat = %chat, reason = %reason, "Request ignored"),
        None => debug!(conn = %conn, reason = %reason, "Request ignored"),
    }
    Outcome::Ignored(reason)
}
