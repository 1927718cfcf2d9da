//! Display-name lookup for pushed messages.

use async_trait::async_trait;

use super::types::UserId;
use crate::db::{Database, UserRepository};
use crate::Result;

/// Read-only view of the identity collaborator's user records.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Current display name of a user, if the user exists.
    async fn display_name(&self, user: UserId) -> Result<Option<String>>;
}

#[async_trait]
impl UserDirectory for Database {
    async fn display_name(&self, user: UserId) -> Result<Option<String>> {
        let user = UserRepository::new(self.pool()).get_by_id(user).await?;
        Ok(user.map(|u| u.display_name))
    }
}
