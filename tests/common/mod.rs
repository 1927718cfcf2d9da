//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use huddle::chat::ChatId;
use huddle::db::{ChatRepository, NewChat, NewUser, UserRepository};
use huddle::web::AppState;
use huddle::{ChatService, Config, Database, WebServer};

pub const TEST_SECRET: &str = "test-secret-key-for-testing-only";

/// Create a test configuration bound to an ephemeral local port.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.auth.jwt_secret = TEST_SECRET.to_string();
    config
}

/// Create a test user and return the user ID.
pub async fn create_user(db: &Database, username: &str, display_name: &str) -> i64 {
    UserRepository::new(db.pool())
        .create(&NewUser::new(username).with_display_name(display_name))
        .await
        .unwrap()
        .id
}

/// Create a chat owned by `creator` with the given extra members.
pub async fn create_chat(db: &Database, creator: i64, members: &[i64]) -> ChatId {
    ChatRepository::new(db.pool())
        .create(&NewChat::new("Test chat", creator).with_members(members.iter().copied()))
        .await
        .unwrap()
        .id
}

/// A running server with direct access to its state and database.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    pub router: axum::Router,
    pub db: Database,
}

impl TestServer {
    /// Start a server on an in-memory database.
    pub async fn start() -> Self {
        Self::start_with(test_config()).await
    }

    /// Start a server with a custom configuration.
    pub async fn start_with(config: Config) -> Self {
        let db = Database::open_in_memory().await.unwrap();
        let service = Arc::new(ChatService::with_database(&db, &config.chat));
        let server = WebServer::new(&config, service).unwrap();
        let state = Arc::clone(server.state());
        let router = server.router();
        let addr = server.run_with_addr().await.unwrap();
        Self {
            addr,
            state,
            router,
            db,
        }
    }

    /// Issue a token for `user`.
    pub fn token(&self, user: i64, username: &str) -> String {
        self.state
            .jwt
            .issue(user, username, Duration::from_secs(600))
            .unwrap()
    }

    /// WebSocket URL carrying `token`.
    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/ws?token={}", self.addr, token)
    }

    /// Wait until the registry holds exactly `expected` connections.
    pub async fn wait_for_connections(&self, expected: usize) -> bool {
        for _ in 0..250 {
            if self.state.service.registry().connection_count().await == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}
