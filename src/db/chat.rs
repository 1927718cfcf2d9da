//! Chat and membership storage.
//!
//! Chats and memberships are written by the chat-creation flow; the
//! real-time core only ever reads them through [`ChatRepository::is_member`].

use super::DbPool;
use crate::chat::ChatId;
use crate::{HuddleError, Result};

/// Title used when a chat is created without one.
pub const DEFAULT_CHAT_TITLE: &str = "New chat";

/// Maximum chat title length in characters.
pub const MAX_TITLE_LENGTH: usize = 120;

/// A conversation room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    /// Globally unique chat ID.
    pub id: ChatId,
    /// Display title.
    pub title: String,
    /// Creation timestamp.
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct ChatRow {
    id: String,
    title: String,
    created_at: String,
}

impl TryFrom<ChatRow> for Chat {
    type Error = HuddleError;

    fn try_from(row: ChatRow) -> Result<Self> {
        let id = ChatId::parse(&row.id)
            .ok_or_else(|| HuddleError::Database(format!("corrupt chat id: {}", row.id)))?;
        Ok(Self {
            id,
            title: row.title,
            created_at: row.created_at,
        })
    }
}

/// Data for creating a chat together with its initial members.
#[derive(Debug, Clone)]
pub struct NewChat {
    /// Requested title; blank titles fall back to [`DEFAULT_CHAT_TITLE`].
    pub title: String,
    /// Creating user, always a member.
    pub creator_id: i64,
    /// Additional members. Duplicates and the creator are ignored.
    pub member_ids: Vec<i64>,
}

impl NewChat {
    /// Create a chat request with only the creator as member.
    pub fn new(title: impl Into<String>, creator_id: i64) -> Self {
        Self {
            title: title.into(),
            creator_id,
            member_ids: Vec::new(),
        }
    }

    /// Add members.
    pub fn with_members(mut self, members: impl IntoIterator<Item = i64>) -> Self {
        self.member_ids.extend(members);
        self
    }

    /// Normalized title: trimmed, defaulted and capped.
    pub fn normalized_title(&self) -> String {
        let title = self.title.trim();
        if title.is_empty() {
            DEFAULT_CHAT_TITLE.to_string()
        } else {
            title.chars().take(MAX_TITLE_LENGTH).collect()
        }
    }
}

/// Repository for chats and memberships.
pub struct ChatRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ChatRepository<'a> {
    /// Create a new ChatRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a chat and its memberships in one transaction.
    pub async fn create(&self, new_chat: &NewChat) -> Result<Chat> {
        let id = ChatId::new();
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO chats (id, title) VALUES (?, ?)")
            .bind(id.to_string())
            .bind(new_chat.normalized_title())
            .execute(&mut *tx)
            .await?;

        let members =
            std::iter::once(new_chat.creator_id).chain(new_chat.member_ids.iter().copied());
        for user_id in members {
            sqlx::query("INSERT OR IGNORE INTO chat_members (chat_id, user_id) VALUES (?, ?)")
                .bind(id.to_string())
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| HuddleError::NotFound("chat".to_string()))
    }

    /// Get a chat by ID.
    pub async fn get_by_id(&self, id: ChatId) -> Result<Option<Chat>> {
        let row = sqlx::query_as::<_, ChatRow>(
            "SELECT id, title, created_at FROM chats WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await?;

        row.map(Chat::try_from).transpose()
    }

    /// Add a member. Returns false if the pair already existed.
    pub async fn add_member(&self, chat_id: ChatId, user_id: i64) -> Result<bool> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO chat_members (chat_id, user_id) VALUES (?, ?)")
                .bind(chat_id.to_string())
                .bind(user_id)
                .execute(self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove a member. Returns false if the pair did not exist.
    pub async fn remove_member(&self, chat_id: ChatId, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chat_members WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id.to_string())
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether the user currently holds a membership for the chat.
    pub async fn is_member(&self, chat_id: ChatId, user_id: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM chat_members WHERE chat_id = ? AND user_id = ?)",
        )
        .bind(chat_id.to_string())
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(exists)
    }

    /// IDs of all members, ascending.
    pub async fn member_ids(&self, chat_id: ChatId) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT user_id FROM chat_members WHERE chat_id = ? ORDER BY user_id",
        )
        .bind(chat_id.to_string())
        .fetch_all(self.pool)
        .await?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewUser, UserRepository};
    use crate::Database;

    async fn setup() -> (Database, i64, i64) {
        let db = Database::open_in_memory().await.unwrap();
        let users = UserRepository::new(db.pool());
        let alice = users.create(&NewUser::new("alice")).await.unwrap().id;
        let bob = users.create(&NewUser::new("bob")).await.unwrap().id;
        (db, alice, bob)
    }

    #[test]
    fn test_normalized_title() {
        assert_eq!(NewChat::new("  Team  ", 1).normalized_title(), "Team");
        assert_eq!(NewChat::new("   ", 1).normalized_title(), DEFAULT_CHAT_TITLE);
        let long = "t".repeat(200);
        assert_eq!(
            NewChat::new(long, 1).normalized_title().chars().count(),
            MAX_TITLE_LENGTH
        );
    }

    #[tokio::test]
    async fn test_create_with_members() {
        let (db, alice, bob) = setup().await;
        let repo = ChatRepository::new(db.pool());

        let chat = repo
            .create(&NewChat::new("room1", alice).with_members([bob, bob, alice]))
            .await
            .unwrap();

        assert_eq!(chat.title, "room1");
        assert_eq!(repo.member_ids(chat.id).await.unwrap(), vec![alice, bob]);
        assert!(repo.is_member(chat.id, alice).await.unwrap());
        assert!(repo.is_member(chat.id, bob).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_with_unknown_member_rolls_back() {
        let (db, alice, _) = setup().await;
        let repo = ChatRepository::new(db.pool());

        let result = repo
            .create(&NewChat::new("broken", alice).with_members([404]))
            .await;
        assert!(result.is_err());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chats")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_get_by_id() {
        let (db, alice, _) = setup().await;
        let repo = ChatRepository::new(db.pool());
        let chat = repo.create(&NewChat::new("", alice)).await.unwrap();

        let found = repo.get_by_id(chat.id).await.unwrap().unwrap();
        assert_eq!(found, chat);
        assert_eq!(found.title, DEFAULT_CHAT_TITLE);
        assert!(repo.get_by_id(ChatId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_and_remove_member() {
        let (db, alice, bob) = setup().await;
        let repo = ChatRepository::new(db.pool());
        let chat = repo.create(&NewChat::new("room", alice)).await.unwrap();

        assert!(!repo.is_member(chat.id, bob).await.unwrap());
        assert!(repo.add_member(chat.id, bob).await.unwrap());
        assert!(!repo.add_member(chat.id, bob).await.unwrap());
        assert!(repo.is_member(chat.id, bob).await.unwrap());

        assert!(repo.remove_member(chat.id, bob).await.unwrap());
        assert!(!repo.remove_member(chat.id, bob).await.unwrap());
        assert!(!repo.is_member(chat.id, bob).await.unwrap());
    }

    #[tokio::test]
    async fn test_is_member_unknown_chat() {
        let (db, alice, _) = setup().await;
        let repo = ChatRepository::new(db.pool());
        assert!(!repo.is_member(ChatId::new(), alice).await.unwrap());
    }
}
