//! Configuration module for Huddle.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::chat::MAX_MESSAGE_LENGTH;
use crate::{HuddleError, Result};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Interval between server-initiated WebSocket pings.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// A connection with no inbound frame for this long is closed.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Upper bound for a single outbound write to one connection.
    #[serde(default = "default_push_timeout")]
    pub push_timeout_ms: u64,
    /// Number of pending pushes buffered per connection before new ones are dropped.
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
    /// CORS allowed origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_heartbeat_interval() -> u64 {
    20
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_push_timeout() -> u64 {
    5000
}

fn default_outbox_capacity() -> usize {
    64
}

impl ServerConfig {
    /// Heartbeat interval as a duration.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Idle timeout as a duration.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Push timeout as a duration.
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            idle_timeout_secs: default_idle_timeout(),
            push_timeout_ms: default_push_timeout(),
            outbox_capacity: default_outbox_capacity(),
            cors_origins: Vec::new(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/huddle.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Chat behaviour configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Maximum message length in characters; longer input is truncated.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    /// Default number of messages returned by a history read.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_max_message_length() -> usize {
    1000
}

fn default_history_limit() -> usize {
    50
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_length: default_max_message_length(),
            history_limit: default_history_limit(),
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to verify connection tokens.
    #[serde(default)]
    pub jwt_secret: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/huddle.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Chat configuration.
    #[serde(default)]
    pub chat: ChatConfig,
    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(HuddleError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| HuddleError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `HUDDLE_JWT_SECRET`: Override the JWT secret key
    pub fn apply_env_overrides(&mut self) {
        if let Ok(jwt_secret) = std::env::var("HUDDLE_JWT_SECRET") {
            if !jwt_secret.is_empty() {
                self.auth.jwt_secret = jwt_secret;
            }
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - the JWT secret is not set
    /// - a capacity, limit or timing is zero
    /// - the message length exceeds what the log can store
    /// - the idle timeout does not exceed the heartbeat interval
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            return Err(HuddleError::Config(
                "jwt_secret is not set. \
                 Set it in config.toml or via HUDDLE_JWT_SECRET environment variable."
                    .to_string(),
            ));
        }
        if self.server.outbox_capacity == 0 {
            return Err(HuddleError::Config(
                "server.outbox_capacity must be greater than zero".to_string(),
            ));
        }
        if self.server.heartbeat_interval_secs == 0 || self.server.push_timeout_ms == 0 {
            return Err(HuddleError::Config(
                "server.heartbeat_interval_secs and server.push_timeout_ms \
                 must be greater than zero"
                    .to_string(),
            ));
        }
        if self.chat.max_message_length == 0 || self.chat.history_limit == 0 {
            return Err(HuddleError::Config(
                "chat.max_message_length and chat.history_limit must be greater than zero"
                    .to_string(),
            ));
        }
        if self.chat.max_message_length > MAX_MESSAGE_LENGTH {
            return Err(HuddleError::Config(format!(
                "chat.max_message_length cannot exceed {MAX_MESSAGE_LENGTH}"
            )));
        }
        if self.server.idle_timeout_secs <= self.server.heartbeat_interval_secs {
            return Err(HuddleError::Config(
                "server.idle_timeout_secs must be larger than server.heartbeat_interval_secs"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
