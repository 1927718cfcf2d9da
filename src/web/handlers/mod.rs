//! HTTP handlers and shared application state.

pub mod chat;

use std::sync::Arc;
use std::time::Duration;

use crate::chat::ChatService;
use crate::config::Config;

use super::middleware::JwtIdentity;

pub use chat::get_chat_messages;

/// Per-connection WebSocket limits.
#[derive(Debug, Clone, Copy)]
pub struct WsSettings {
    /// Interval between server pings.
    pub heartbeat_interval: Duration,
    /// Close a connection after this long without an inbound frame.
    pub idle_timeout: Duration,
    /// Upper bound for one outbound write.
    pub push_timeout: Duration,
    /// Pending pushes buffered per connection.
    pub outbox_capacity: usize,
}

impl WsSettings {
    /// Settings from the server configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            heartbeat_interval: config.server.heartbeat_interval(),
            idle_timeout: config.server.idle_timeout(),
            push_timeout: config.server.push_timeout(),
            outbox_capacity: config.server.outbox_capacity,
        }
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Chat protocol engine.
    pub service: Arc<ChatService>,
    /// Identity collaborator.
    pub jwt: Arc<JwtIdentity>,
    /// WebSocket limits.
    pub ws: WsSettings,
    /// Default history page size.
    pub history_limit: usize,
}

impl AppState {
    /// Create a new application state.
    pub fn new(service: Arc<ChatService>, config: &Config) -> Self {
        Self {
            service,
            jwt: Arc::new(JwtIdentity::new(&config.auth.jwt_secret)),
            ws: WsSettings::from_config(config),
            history_limit: config.chat.history_limit,
        }
    }
}
