//! Response DTOs.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::chat::{ChatEvent, ChatId};

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new API response.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// A chat message as seen by clients, both in history and in live pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageResponse {
    /// Message ID.
    pub id: i64,
    /// Chat ID.
    pub chat_id: ChatId,
    /// Author's user ID.
    pub author_id: i64,
    /// Author display name.
    pub author_name: String,
    /// Message text.
    pub text: String,
    /// RFC 3339 send time with microsecond precision.
    #[serde(serialize_with = "serialize_micros")]
    pub sent_at: DateTime<Utc>,
}

fn serialize_micros<S: Serializer>(
    ts: &DateTime<Utc>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

impl From<&ChatEvent> for MessageResponse {
    fn from(event: &ChatEvent) -> Self {
        Self {
            id: event.message.id,
            chat_id: event.message.chat_id,
            author_id: event.message.author_id,
            author_name: event.author_name.clone(),
            text: event.message.text.clone(),
            sent_at: event.message.sent_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Message;

    #[test]
    fn test_message_response_json() {
        let chat = ChatId::parse("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11").unwrap();
        let event = ChatEvent {
            message: Message {
                id: 7,
                chat_id: chat,
                author_id: 3,
                text: "hello".to_string(),
                sent_at: DateTime::from_timestamp_micros(1_700_000_000_123_456).unwrap(),
            },
            author_name: "Alice".to_string(),
        };

        let json = serde_json::to_value(ApiResponse::new(vec![MessageResponse::from(&event)]))
            .unwrap();
        let item = &json["data"][0];
        assert_eq!(item["id"], 7);
        assert_eq!(item["chat_id"], "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11");
        assert_eq!(item["author_id"], 3);
        assert_eq!(item["author_name"], "Alice");
        assert_eq!(item["text"], "hello");
        assert_eq!(item["sent_at"], "2023-11-14T22:13:20.123456Z");
    }
}
