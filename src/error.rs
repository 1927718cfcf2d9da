//! Error types for Huddle.

use thiserror::Error;

/// Common error type for Huddle.
#[derive(Error, Debug)]
pub enum HuddleError {
    /// Database error.
    ///
    /// Raised when the durable store rejects or cannot serve a query.
    /// Database errors from sqlx are automatically converted.
    #[error("database error: {0}")]
    Database(String),

    /// Database connection error.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A connection id was registered twice.
    #[error("connection {0} is already registered")]
    AlreadyRegistered(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),
}

impl HuddleError {
    /// Whether this error means the durable store could not be reached or used.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            HuddleError::Database(_) | HuddleError::DatabaseConnection(_)
        )
    }
}

// Conversion from sqlx errors
impl From<sqlx::Error> for HuddleError {
    fn from(e: sqlx::Error) -> Self {
        HuddleError::Database(e.to_string())
    }
}

/// Result type alias for Huddle operations.
pub type Result<T> = std::result::Result<T, HuddleError>;
