//! Database schema and migrations for Huddle.
//!
//! Migrations are applied sequentially when the database is first opened
//! or upgraded; the schema_version table records which ones ran.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: users as seen by the chat core (identity is issued elsewhere)
    r#"
CREATE TABLE users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    username      TEXT NOT NULL UNIQUE COLLATE NOCASE,
    display_name  TEXT NOT NULL,
    created_at    TEXT NOT NULL DEFAULT (datetime('now'))
);
"#,
    // v2: chats and their durable membership
    r#"
CREATE TABLE chats (
    id          TEXT PRIMARY KEY,                 -- lowercase hyphenated UUID
    title       TEXT NOT NULL CHECK (length(title) <= 120),
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE chat_members (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id  TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
    user_id  INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    UNIQUE (chat_id, user_id)
);

CREATE INDEX idx_chat_members_user ON chat_members(user_id);
"#,
    // v3: append-only message log
    r#"
CREATE TABLE messages (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id  TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
    user_id  INTEGER NOT NULL REFERENCES users(id),
    text     TEXT NOT NULL CHECK (length(text) BETWEEN 1 AND 1000),
    sent_at  INTEGER NOT NULL                     -- microseconds since the UNIX epoch
);

CREATE INDEX idx_messages_chat_order ON messages(chat_id, sent_at, id);
"#,
];
