//! Durable per-chat message log.
//!
//! The log is append-only. Reads come back oldest first, ordered by send
//! time with ties broken by id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::{ChatId, Message, UserId};
use crate::db::{Database, DbPool};
use crate::{HuddleError, Result};

/// Default number of messages returned by a history read.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Largest history page a single read may request.
pub const MAX_HISTORY_LIMIT: usize = 200;

/// Append-only ordered message storage.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Persist a message with a server-assigned id and send time.
    ///
    /// The author's membership is checked in the same step as the write;
    /// `None` means the author held no membership and nothing was stored.
    async fn append(&self, chat: ChatId, author: UserId, text: &str) -> Result<Option<Message>>;

    /// The most recent `limit` messages of a chat, oldest first. A zero
    /// limit reads nothing.
    async fn recent(&self, chat: ChatId, limit: usize) -> Result<Vec<Message>>;
}

/// Database row type for Message.
#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    chat_id: String,
    user_id: i64,
    text: String,
    sent_at: i64,
}

impl TryFrom<MessageRow> for Message {
    type Error = HuddleError;

    fn try_from(row: MessageRow) -> Result<Self> {
        let chat_id = ChatId::parse(&row.chat_id)
            .ok_or_else(|| HuddleError::Database(format!("corrupt chat id: {}", row.chat_id)))?;
        Ok(Self {
            id: row.id,
            chat_id,
            author_id: row.user_id,
            text: row.text,
            sent_at: from_micros(row.sent_at)?,
        })
    }
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| HuddleError::Database(format!("sent_at out of range: {micros}")))
}

/// Last send time assigned in one chat, loaded lazily.
type ChatClock = Arc<tokio::sync::Mutex<Option<i64>>>;

/// SQLite-backed message log.
///
/// Appends to the same chat are serialized through a per-chat lock that
/// also carries the chat's last assigned send time, so timestamps never go
/// backwards inside a chat. Different chats never share a lock. A chat's
/// lock is dropped once no append holds it; the next append reloads the
/// floor from the table.
pub struct SqliteMessageLog {
    db: Database,
    clocks: Mutex<HashMap<ChatId, ChatClock>>,
}

impl SqliteMessageLog {
    /// Create a log over the given database.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            clocks: Mutex::new(HashMap::new()),
        }
    }

    fn pool(&self) -> &DbPool {
        self.db.pool()
    }

    fn clock(&self, chat: ChatId) -> ChatClock {
        let mut clocks = self
            .clocks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(clocks.entry(chat).or_default())
    }

    /// Forget a chat's clock when the map and `clock` are its only holders.
    fn release(&self, chat: ChatId, clock: ChatClock) {
        let mut clocks = self
            .clocks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let idle = clocks
            .get(&chat)
            .is_some_and(|held| Arc::ptr_eq(held, &clock) && Arc::strong_count(&clock) == 2);
        if idle {
            clocks.remove(&chat);
        }
        // Let go of our handle while the map is still locked.
        drop(clock);
    }

    /// Number of chats with a live append clock.
    pub fn tracked_chats(&self) -> usize {
        self.clocks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    async fn append_locked(
        &self,
        clock: &ChatClock,
        chat: ChatId,
        author: UserId,
        text: &str,
    ) -> Result<Option<Message>> {
        let mut last = clock.lock().await;

        let floor = match *last {
            Some(micros) => Some(micros),
            None => self.latest_sent_at(chat).await?,
        };
        let now = Utc::now().timestamp_micros();
        let sent_at = floor.map_or(now, |floor| now.max(floor));

        let chat_key = chat.to_string();
        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO messages (chat_id, user_id, text, sent_at)
            SELECT ?, ?, ?, ?
            WHERE EXISTS (
                SELECT 1 FROM chat_members WHERE chat_id = ? AND user_id = ?
            )
            RETURNING id
            "#,
        )
        .bind(&chat_key)
        .bind(author)
        .bind(text)
        .bind(sent_at)
        .bind(&chat_key)
        .bind(author)
        .fetch_optional(self.pool())
        .await?;

        let Some(id) = id else {
            return Ok(None);
        };
        *last = Some(sent_at);

        Ok(Some(Message {
            id,
            chat_id: chat,
            author_id: author,
            text: text.to_string(),
            sent_at: from_micros(sent_at)?,
        }))
    }

    async fn latest_sent_at(&self, chat: ChatId) -> Result<Option<i64>> {
        let latest: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sent_at) FROM messages WHERE chat_id = ?")
                .bind(chat.to_string())
                .fetch_one(self.pool())
                .await?;
        Ok(latest)
    }

    /// Number of messages stored for a chat.
    pub async fn count(&self, chat: ChatId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE chat_id = ?")
            .bind(chat.to_string())
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl MessageLog for SqliteMessageLog {
    async fn append(&self, chat: ChatId, author: UserId, text: &str) -> Result<Option<Message>> {
        let clock = self.clock(chat);
        let result = self.append_locked(&clock, chat, author, text).await;
        self.release(chat, clock);
        result
    }

    async fn recent(&self, chat: ChatId, limit: usize) -> Result<Vec<Message>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = limit.min(MAX_HISTORY_LIMIT) as i64;
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, chat_id, user_id, text, sent_at
            FROM messages
            WHERE chat_id = ?
            ORDER BY sent_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(chat.to_string())
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        // Newest first from the query; callers want oldest first.
        rows.into_iter()
            .rev()
            .map(Message::try_from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ChatRepository, NewChat, NewUser, UserRepository};

    async fn setup() -> (SqliteMessageLog, ChatId, i64, Database) {
        let db = Database::open_in_memory().await.unwrap();
        let user = UserRepository::new(db.pool())
            .create(&NewUser::new("alice"))
            .await
            .unwrap()
            .id;
        let chat = ChatRepository::new(db.pool())
            .create(&NewChat::new("room1", user))
            .await
            .unwrap()
            .id;
        (SqliteMessageLog::new(db.clone()), chat, user, db)
    }

    #[tokio::test]
    async fn test_append_and_recent() {
        let (log, chat, user, _db) = setup().await;

        let first = log.append(chat, user, "hello").await.unwrap().unwrap();
        let second = log.append(chat, user, "world").await.unwrap().unwrap();

        assert!(second.id > first.id);
        assert!(second.sent_at >= first.sent_at);
        assert_eq!(first.chat_id, chat);
        assert_eq!(first.author_id, user);

        let recent = log.recent(chat, 10).await.unwrap();
        assert_eq!(recent, vec![first, second]);
        assert_eq!(log.count(chat).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_recent_returns_latest_page_oldest_first() {
        let (log, chat, user, _db) = setup().await;
        for i in 0..10 {
            log.append(chat, user, &format!("msg {i}")).await.unwrap();
        }

        let recent = log.recent(chat, 3).await.unwrap();
        let texts: Vec<_> = recent.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["msg 7", "msg 8", "msg 9"]);
    }

    #[tokio::test]
    async fn test_recent_limit_bounds() {
        let (log, chat, user, _db) = setup().await;
        log.append(chat, user, "a").await.unwrap();
        log.append(chat, user, "b").await.unwrap();

        assert!(log.recent(chat, 0).await.unwrap().is_empty());
        assert_eq!(log.recent(chat, 1).await.unwrap().len(), 1);
        assert_eq!(log.recent(chat, usize::MAX).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_append_rejects_non_member_author() {
        let (log, chat, _user, db) = setup().await;
        let carol = UserRepository::new(db.pool())
            .create(&NewUser::new("carol"))
            .await
            .unwrap()
            .id;

        assert!(log.append(chat, carol, "intruder").await.unwrap().is_none());
        assert_eq!(log.count(chat).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_append_after_membership_removed() {
        let (log, chat, user, db) = setup().await;
        log.append(chat, user, "before").await.unwrap().unwrap();

        ChatRepository::new(db.pool())
            .remove_member(chat, user)
            .await
            .unwrap();

        assert!(log.append(chat, user, "after").await.unwrap().is_none());
        let texts: Vec<_> = log
            .recent(chat, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["before"]);
    }

    #[tokio::test]
    async fn test_idle_chat_clocks_are_released() {
        let (log, chat, user, _db) = setup().await;
        let first = log.append(chat, user, "one").await.unwrap().unwrap();
        assert_eq!(log.tracked_chats(), 0);

        // The floor comes back from the table once the clock is gone.
        let second = log.append(chat, user, "two").await.unwrap().unwrap();
        assert!(second.sent_at >= first.sent_at);
        assert_eq!(log.tracked_chats(), 0);
    }

    #[tokio::test]
    async fn test_recent_unknown_chat_is_empty() {
        let (log, _chat, _user, _db) = setup().await;
        assert!(log.recent(ChatId::new(), 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_time_never_goes_backwards() {
        let (log, chat, user, db) = setup().await;
        let future = Utc::now().timestamp_micros() + 60_000_000;
        sqlx::query("INSERT INTO messages (chat_id, user_id, text, sent_at) VALUES (?, ?, ?, ?)")
            .bind(chat.to_string())
            .bind(user)
            .bind("from the future")
            .bind(future)
            .execute(db.pool())
            .await
            .unwrap();

        let appended = log.append(chat, user, "now").await.unwrap().unwrap();
        assert_eq!(appended.sent_at.timestamp_micros(), future);

        let recent = log.recent(chat, 10).await.unwrap();
        assert_eq!(recent.last().unwrap().text, "now");
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_totally_ordered() {
        let (log, chat, user, _db) = setup().await;
        let log = Arc::new(log);

        let mut handles = Vec::new();
        for i in 0..20 {
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                log.append(chat, user, &format!("m{i}")).await.unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }
        assert_eq!(log.tracked_chats(), 0);

        let recent = log.recent(chat, 100).await.unwrap();
        assert_eq!(recent.len(), 20);
        for pair in recent.windows(2) {
            assert!(pair[0].sent_at <= pair[1].sent_at);
            assert!(pair[0].id < pair[1].id);
        }
    }

    #[tokio::test]
    async fn test_chats_are_independent() {
        let (log, chat, user, db) = setup().await;
        let other = ChatRepository::new(db.pool())
            .create(&NewChat::new("room2", user))
            .await
            .unwrap()
            .id;

        log.append(chat, user, "in room1").await.unwrap();
        log.append(other, user, "in room2").await.unwrap();

        let room1 = log.recent(chat, 10).await.unwrap();
        assert_eq!(room1.len(), 1);
        assert_eq!(room1[0].text, "in room1");
        assert_eq!(log.count(other).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_append_fails_when_store_is_down() {
        let (log, chat, user, db) = setup().await;
        db.close().await;
        let err = log.append(chat, user, "lost").await.unwrap_err();
        assert!(err.is_store_failure());
    }
}
