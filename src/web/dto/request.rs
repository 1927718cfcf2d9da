//! Request DTOs.

use serde::Deserialize;

/// Query parameters for a history read.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Number of messages to return; the configured default when absent.
    pub limit: Option<usize>,
}

/// Query parameters for the WebSocket upgrade.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Bearer token issued by the identity service.
    pub token: Option<String>,
}
