//! WebSocket message types for chat communication.

use serde::{Deserialize, Serialize};

use crate::chat::ChatEvent;
use crate::web::dto::MessageResponse;

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a chat's live group.
    Join {
        /// Chat ID.
        chat_id: String,
    },
    /// Leave a chat's live group.
    Leave {
        /// Chat ID.
        chat_id: String,
    },
    /// Send a message.
    Send {
        /// Chat ID.
        chat_id: String,
        /// Message text.
        text: String,
    },
    /// Heartbeat ping.
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A message was posted to a joined chat.
    MessageReceived(MessageResponse),
    /// Heartbeat pong response.
    Pong,
    /// Error message.
    Error {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
    },
}

/// Error code for frames that could not be parsed.
pub const INVALID_MESSAGE: &str = "invalid_message";

/// Error code for operations that failed because the store is down.
pub const UNAVAILABLE: &str = "unavailable";

impl ServerMessage {
    /// Create an error message.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Live push for a chat event.
    pub fn message_received(event: &ChatEvent) -> Self {
        Self::MessageReceived(MessageResponse::from(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatId, Message};
    use chrono::Utc;

    #[test]
    fn test_client_message_join() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join","chat_id":"abc"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join {
                chat_id: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_client_message_send() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"send","chat_id":"abc","text":"hi"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Send {
                chat_id: "abc".to_string(),
                text: "hi".to_string()
            }
        );
    }

    #[test]
    fn test_client_message_ping() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping);
    }

    #[test]
    fn test_client_message_rejects_unknown_or_incomplete() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"shout"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"send","chat_id":"a"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>("not json").is_err());
    }

    #[test]
    fn test_server_message_received_is_flat() {
        let chat = ChatId::new();
        let event = ChatEvent {
            message: Message {
                id: 1,
                chat_id: chat,
                author_id: 2,
                text: "hello".to_string(),
                sent_at: Utc::now(),
            },
            author_name: "Bob".to_string(),
        };

        let json = serde_json::to_value(ServerMessage::message_received(&event)).unwrap();
        assert_eq!(json["type"], "message_received");
        assert_eq!(json["id"], 1);
        assert_eq!(json["chat_id"], chat.to_string());
        assert_eq!(json["author_id"], 2);
        assert_eq!(json["author_name"], "Bob");
        assert_eq!(json["text"], "hello");
        assert!(json["sent_at"].is_string());
    }

    #[test]
    fn test_server_message_pong_and_error() {
        assert_eq!(
            serde_json::to_string(&ServerMessage::Pong).unwrap(),
            r#"{"type":"pong"}"#
        );
        let json = serde_json::to_value(ServerMessage::error(INVALID_MESSAGE, "bad")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "invalid_message");
        assert_eq!(json["message"], "bad");
    }
}
