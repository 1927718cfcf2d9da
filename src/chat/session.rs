//! Per-connection protocol state.

use std::sync::Arc;

use super::registry::Outbox;
use super::service::{ChatService, Delivery};
use super::types::{ChatEvent, ConnectionId, IgnoreReason, Identity, Outcome};
use crate::{HuddleError, Result};

/// Lifecycle of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Transport is open but no identity has been accepted yet.
    Unauthenticated,
    /// Registered with the service under this identity.
    Authenticated(Identity),
    /// Terminal.
    Disconnected,
}

/// One live connection's view of the chat protocol.
pub struct ChatSession {
    id: ConnectionId,
    service: Arc<ChatService>,
    state: SessionState,
}

impl ChatSession {
    /// Create an unauthenticated session with a fresh connection ID.
    pub fn new(service: Arc<ChatService>) -> Self {
        Self {
            id: ConnectionId::new(),
            service,
            state: SessionState::Unauthenticated,
        }
    }

    /// Connection ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Identity, while authenticated.
    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            SessionState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    /// Bind an identity accepted by the identity collaborator and register
    /// the connection.
    pub async fn authenticate(&mut self, identity: Identity, outbox: Outbox) -> Result<()> {
        match self.state {
            SessionState::Unauthenticated => {}
            SessionState::Authenticated(_) => {
                return Err(HuddleError::AlreadyRegistered(self.id.to_string()));
            }
            SessionState::Disconnected => {
                return Err(HuddleError::Auth("session is closed".to_string()));
            }
        }

        self.service
            .connect(self.id, identity.clone(), outbox)
            .await?;
        self.state = SessionState::Authenticated(identity);
        Ok(())
    }

    /// Join a chat.
    pub async fn join(&self, chat: &str) -> Result<Outcome> {
        if self.identity().is_none() {
            return Ok(Outcome::Ignored(IgnoreReason::Unauthenticated));
        }
        self.service.join(self.id, chat).await
    }

    /// Leave a chat.
    pub async fn leave(&self, chat: &str) -> Result<Outcome> {
        if self.identity().is_none() {
            return Ok(Outcome::Ignored(IgnoreReason::Unauthenticated));
        }
        self.service.leave(self.id, chat).await
    }

    /// Send a message to a chat.
    pub async fn send(&self, chat: &str, text: &str) -> Result<Outcome<Delivery>> {
        if self.identity().is_none() {
            return Ok(Outcome::Ignored(IgnoreReason::Unauthenticated));
        }
        self.service.send(self.id, chat, text).await
    }

    /// Read a chat's recent history as this session's user.
    pub async fn history(&self, chat: &str, limit: usize) -> Result<Outcome<Vec<ChatEvent>>> {
        let Some(identity) = self.identity() else {
            return Ok(Outcome::Ignored(IgnoreReason::Unauthenticated));
        };
        self.service.history(identity.user_id, chat, limit).await
    }

    /// Leave every chat and enter the terminal state. Idempotent.
    pub async fn disconnect(&mut self) {
        let previous = std::mem::replace(&mut self.state, SessionState::Disconnected);
        if matches!(previous, SessionState::Authenticated(_)) {
            self.service.disconnect(self.id).await;
        }
    }
}

/// A session dropped while still authenticated (early return, panic in the
/// owning task) unregisters in the background so no registry entry outlives
/// its transport.
impl Drop for ChatSession {
    fn drop(&mut self) {
        if !matches!(self.state, SessionState::Authenticated(_)) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(conn = %self.id, "Session dropped outside a runtime; not unregistered");
            return;
        };
        let service = Arc::clone(&self.service);
        let conn = self.id;
        handle.spawn(async move {
            service.disconnect(conn).await;
        });
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}
