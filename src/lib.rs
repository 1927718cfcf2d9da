//! Huddle - real-time group chat server
//!
//! Authenticated users join chats they are members of and receive every
//! message posted there live, while the message log keeps a durable, totally
//! ordered history per chat.

pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod web;

pub use chat::{
    ChatEvent, ChatId, ChatService, ChatSession, ConnectionId, ConnectionRegistry, Delivery,
    FanoutReport, Gate, IgnoreReason, Identity, Message, MessageLog, Outcome, SqliteMessageLog,
};
pub use config::Config;
pub use db::{ChatRepository, Database, NewChat, NewUser, User, UserRepository};
pub use error::{HuddleError, Result};
pub use web::WebServer;
