//! Membership authorization gate.
//!
//! Every mutating protocol operation asks the gate before touching the
//! registry or the log. The gate holds no state of its own; each call is a
//! fresh read of the membership store.

use std::sync::Arc;

use async_trait::async_trait;

use super::types::{ChatId, UserId};
use crate::db::{ChatRepository, Database};
use crate::Result;

/// Durable record of which user belongs to which chat.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Whether `user` currently holds a membership for `chat`.
    async fn is_member(&self, user: UserId, chat: ChatId) -> Result<bool>;
}

#[async_trait]
impl MembershipStore for Database {
    async fn is_member(&self, user: UserId, chat: ChatId) -> Result<bool> {
        ChatRepository::new(self.pool()).is_member(chat, user).await
    }
}

/// Authorization gate in front of the membership store.
#[derive(Clone)]
pub struct Gate {
    store: Arc<dyn MembershipStore>,
}

impl Gate {
    /// Create a gate over the given store.
    pub fn new(store: Arc<dyn MembershipStore>) -> Self {
        Self { store }
    }

    /// Check membership.
    ///
    /// A store failure is returned as `Err` and never counts as membership.
    pub async fn is_member(&self, user: UserId, chat: ChatId) -> Result<bool> {
        match self.store.is_member(user, chat).await {
            Ok(member) => Ok(member),
            Err(e) => {
                tracing::error!(user, chat = %chat, error = %e, "Membership check failed");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate").finish_non_exhaustive()
    }
}
