//! Live connection registry.
//!
//! Keeps the bidirectional index between live connections and the chats
//! they have joined. Both directions live behind a single lock so every
//! mutation updates them in one critical section.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use super::types::{ChatEvent, ChatId, ConnectionId, Identity};
use crate::{HuddleError, Result};

/// Sending half of a connection's push queue.
pub type Outbox = mpsc::Sender<Arc<ChatEvent>>;

/// Receiving half of a connection's push queue, drained by the transport.
pub type Inbox = mpsc::Receiver<Arc<ChatEvent>>;

/// Create a bounded push queue for one connection.
pub fn outbox(capacity: usize) -> (Outbox, Inbox) {
    mpsc::channel(capacity.max(1))
}

/// One fan-out target taken from a group snapshot.
#[derive(Debug, Clone)]
pub struct Recipient {
    /// Target connection.
    pub connection: ConnectionId,
    outbox: Outbox,
}

impl Recipient {
    /// Queue an event without waiting.
    ///
    /// Returns false if the queue is full or the connection is gone.
    pub fn push(&self, event: Arc<ChatEvent>) -> bool {
        match self.outbox.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(conn = %self.connection, "Outbox full, dropping push");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(conn = %self.connection, "Outbox closed, dropping push");
                false
            }
        }
    }
}

/// Outcome of pushing one message to a group snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Connections in the snapshot.
    pub attempted: usize,
    /// Pushes queued successfully.
    pub delivered: usize,
    /// Pushes dropped for full or closed queues.
    pub dropped: usize,
}

impl FanoutReport {
    /// Push `event` to every recipient. A failed push never affects the others.
    pub fn deliver(recipients: &[Recipient], event: Arc<ChatEvent>) -> Self {
        let mut report = Self {
            attempted: recipients.len(),
            ..Self::default()
        };
        for recipient in recipients {
            if recipient.push(Arc::clone(&event)) {
                report.delivered += 1;
            } else {
                report.dropped += 1;
            }
        }
        report
    }
}

struct Entry {
    identity: Identity,
    joined: HashSet<ChatId>,
    outbox: Outbox,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Entry>,
    groups: HashMap<ChatId, HashSet<ConnectionId>>,
}

impl Inner {
    fn detach(&mut self, connection: ConnectionId, chat: ChatId) {
        if let Some(group) = self.groups.get_mut(&chat) {
            group.remove(&connection);
            if group.is_empty() {
                self.groups.remove(&chat);
            }
        }
    }
}

/// Process-wide registry of live connections and their joined chats.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a new connection to its identity with an empty joined set.
    ///
    /// Registering the same connection twice is rejected.
    pub async fn register(
        &self,
        connection: ConnectionId,
        identity: Identity,
        outbox: Outbox,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.connections.contains_key(&connection) {
            return Err(HuddleError::AlreadyRegistered(connection.to_string()));
        }
        inner.connections.insert(
            connection,
            Entry {
                identity,
                joined: HashSet::new(),
                outbox,
            },
        );
        Ok(())
    }

    /// Add `connection` to the chat's group.
    ///
    /// Returns false when it was already joined or is not registered.
    pub async fn join(&self, connection: ConnectionId, chat: ChatId) -> bool {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.connections.get_mut(&connection) else {
            return false;
        };
        if !entry.joined.insert(chat) {
            return false;
        }
        inner.groups.entry(chat).or_default().insert(connection);
        true
    }

    /// Remove `connection` from the chat's group.
    ///
    /// Returns false when it was not joined.
    pub async fn leave(&self, connection: ConnectionId, chat: ChatId) -> bool {
        let mut inner = self.inner.write().await;
        let removed = match inner.connections.get_mut(&connection) {
            Some(entry) => entry.joined.remove(&chat),
            None => false,
        };
        if removed {
            inner.detach(connection, chat);
        }
        removed
    }

    /// Drop a connection and every group association it had.
    ///
    /// Returns the chats it was removed from, or `None` if it was unknown.
    pub async fn unregister(&self, connection: ConnectionId) -> Option<Vec<ChatId>> {
        let mut inner = self.inner.write().await;
        let entry = inner.connections.remove(&connection)?;
        let chats: Vec<ChatId> = entry.joined.into_iter().collect();
        for chat in &chats {
            inner.detach(connection, *chat);
        }
        Some(chats)
    }

    /// Snapshot of the chat's live group for fan-out.
    pub async fn members_of(&self, chat: ChatId) -> Vec<Recipient> {
        let inner = self.inner.read().await;
        let Some(group) = inner.groups.get(&chat) else {
            return Vec::new();
        };
        group
            .iter()
            .filter_map(|connection| {
                inner.connections.get(connection).map(|entry| Recipient {
                    connection: *connection,
                    outbox: entry.outbox.clone(),
                })
            })
            .collect()
    }

    /// Identity bound to a connection.
    pub async fn identity_of(&self, connection: ConnectionId) -> Option<Identity> {
        let inner = self.inner.read().await;
        inner
            .connections
            .get(&connection)
            .map(|entry| entry.identity.clone())
    }

    /// Chats a connection has joined.
    pub async fn joined_chats(&self, connection: ConnectionId) -> Vec<ChatId> {
        let inner = self.inner.read().await;
        inner
            .connections
            .get(&connection)
            .map(|entry| entry.joined.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of live connections joined to a chat.
    pub async fn group_size(&self, chat: ChatId) -> usize {
        let inner = self.inner.read().await;
        inner.groups.get(&chat).map_or(0, HashSet::len)
    }

    /// Whether a connection is in a chat's group.
    pub async fn is_joined(&self, connection: ConnectionId, chat: ChatId) -> bool {
        let inner = self.inner.read().await;
        inner
            .groups
            .get(&chat)
            .is_some_and(|group| group.contains(&connection))
    }

    /// Number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// Number of chats with at least one joined connection.
    pub async fn active_group_count(&self) -> usize {
        self.inner.read().await.groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::types::Message;
    use chrono::Utc;

    fn identity(user_id: i64) -> Identity {
        Identity::new(user_id, format!("user{user_id}"))
    }

    fn event(chat: ChatId) -> Arc<ChatEvent> {
        Arc::new(ChatEvent {
            message: Message {
                id: 1,
                chat_id: chat,
                author_id: 1,
                text: "hello".to_string(),
                sent_at: Utc::now(),
            },
            author_name: "user1".to_string(),
        })
    }

    async fn registered(registry: &ConnectionRegistry, user_id: i64) -> (ConnectionId, Inbox) {
        let conn = ConnectionId::new();
        let (tx, rx) = outbox(8);
        registry.register(conn, identity(user_id), tx).await.unwrap();
        (conn, rx)
    }

    #[tokio::test]
    async fn test_register_and_identity() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = registered(&registry, 1).await;

        assert_eq!(registry.connection_count().await, 1);
        assert_eq!(registry.identity_of(conn).await, Some(identity(1)));
        assert!(registry.joined_chats(conn).await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_register_rejected() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = registered(&registry, 1).await;
        let (tx, _rx2) = outbox(8);

        let result = registry.register(conn, identity(2), tx).await;
        assert!(matches!(result, Err(HuddleError::AlreadyRegistered(_))));
        // The original binding survives.
        assert_eq!(registry.identity_of(conn).await, Some(identity(1)));
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = registered(&registry, 1).await;
        let chat = ChatId::new();

        assert!(registry.join(conn, chat).await);
        assert!(!registry.join(conn, chat).await);
        assert_eq!(registry.group_size(chat).await, 1);
        assert_eq!(registry.joined_chats(conn).await, vec![chat]);
    }

    #[tokio::test]
    async fn test_join_unknown_connection_is_noop() {
        let registry = ConnectionRegistry::new();
        let chat = ChatId::new();
        assert!(!registry.join(ConnectionId::new(), chat).await);
        assert_eq!(registry.group_size(chat).await, 0);
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = registered(&registry, 1).await;
        let chat = ChatId::new();

        assert!(!registry.leave(conn, chat).await);
        registry.join(conn, chat).await;
        assert!(registry.leave(conn, chat).await);
        assert!(!registry.leave(conn, chat).await);
        assert_eq!(registry.group_size(chat).await, 0);
        assert_eq!(registry.active_group_count().await, 0);
        assert!(!registry.is_joined(conn, chat).await);
    }

    #[tokio::test]
    async fn test_unregister_removes_from_every_group() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = registered(&registry, 1).await;
        let (other, _rx2) = registered(&registry, 2).await;
        let room1 = ChatId::new();
        let room2 = ChatId::new();

        registry.join(conn, room1).await;
        registry.join(conn, room2).await;
        registry.join(other, room1).await;

        let mut left = registry.unregister(conn).await.unwrap();
        left.sort();
        let mut expected = vec![room1, room2];
        expected.sort();
        assert_eq!(left, expected);

        assert_eq!(registry.group_size(room1).await, 1);
        assert_eq!(registry.group_size(room2).await, 0);
        assert!(registry.identity_of(conn).await.is_none());
        assert!(registry
            .members_of(room1)
            .await
            .iter()
            .all(|r| r.connection != conn));

        assert!(registry.unregister(conn).await.is_none());
    }

    #[tokio::test]
    async fn test_members_of_snapshot() {
        let registry = ConnectionRegistry::new();
        let (a, _ra) = registered(&registry, 1).await;
        let (b, _rb) = registered(&registry, 2).await;
        let (c, _rc) = registered(&registry, 3).await;
        let chat = ChatId::new();

        registry.join(a, chat).await;
        registry.join(b, chat).await;

        let mut members: Vec<_> = registry
            .members_of(chat)
            .await
            .into_iter()
            .map(|r| r.connection)
            .collect();
        members.sort_by_key(|id| id.to_string());
        let mut expected = vec![a, b];
        expected.sort_by_key(|id| id.to_string());
        assert_eq!(members, expected);
        assert!(!registry.is_joined(c, chat).await);
        assert!(registry.members_of(ChatId::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_fanout_delivers_to_every_member() {
        let registry = ConnectionRegistry::new();
        let (a, mut ra) = registered(&registry, 1).await;
        let (b, mut rb) = registered(&registry, 2).await;
        let chat = ChatId::new();
        registry.join(a, chat).await;
        registry.join(b, chat).await;

        let recipients = registry.members_of(chat).await;
        let report = FanoutReport::deliver(&recipients, event(chat));

        assert_eq!(
            report,
            FanoutReport {
                attempted: 2,
                delivered: 2,
                dropped: 0
            }
        );
        assert_eq!(ra.recv().await.unwrap().message.text, "hello");
        assert_eq!(rb.recv().await.unwrap().message.text, "hello");
    }

    #[tokio::test]
    async fn test_fanout_drops_for_full_or_closed_outbox_only() {
        let registry = ConnectionRegistry::new();
        let chat = ChatId::new();

        let stalled = ConnectionId::new();
        let (stalled_tx, _stalled_rx) = outbox(1);
        registry
            .register(stalled, identity(1), stalled_tx)
            .await
            .unwrap();

        let gone = ConnectionId::new();
        let (gone_tx, gone_rx) = outbox(4);
        registry.register(gone, identity(2), gone_tx).await.unwrap();
        drop(gone_rx);

        let (healthy, mut healthy_rx) = registered(&registry, 3).await;

        for conn in [stalled, gone, healthy] {
            registry.join(conn, chat).await;
        }

        let recipients = registry.members_of(chat).await;
        // Fill the stalled queue.
        let first = FanoutReport::deliver(&recipients, event(chat));
        assert_eq!(first.attempted, 3);
        assert_eq!(first.delivered, 2);
        assert_eq!(first.dropped, 1);

        let second = FanoutReport::deliver(&recipients, event(chat));
        assert_eq!(second.delivered, 1);
        assert_eq!(second.dropped, 2);

        assert!(healthy_rx.recv().await.is_some());
        assert!(healthy_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_join_leave_keeps_index_consistent() {
        let registry = Arc::new(ConnectionRegistry::new());
        let chat = ChatId::new();
        let mut conns = Vec::new();
        let mut inboxes = Vec::new();
        for user in 0..32 {
            let (conn, rx) = registered(&registry, user).await;
            conns.push(conn);
            inboxes.push(rx);
        }

        let mut handles = Vec::new();
        for (i, conn) in conns.iter().copied().enumerate() {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                for _ in 0..20 {
                    registry.join(conn, chat).await;
                    if i % 2 == 0 {
                        registry.leave(conn, chat).await;
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.group_size(chat).await, 16);
        for (i, conn) in conns.iter().enumerate() {
            let joined = registry.is_joined(*conn, chat).await;
            assert_eq!(joined, i % 2 == 1);
            assert_eq!(registry.joined_chats(*conn).await.contains(&chat), joined);
        }
    }
}
