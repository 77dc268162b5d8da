//! Wire frames exchanged with chat clients.
//!
//! Inbound frames are JSON objects discriminated by a `type` field. Decoding
//! is channel-aware: a `message` frame on a room channel carries a
//! `username`, the same frame on a direct channel carries a `receiver`.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::message::ChatMessage;
use crate::datetime::format_display;
use crate::{RelayError, Result};

/// Kind of channel a session was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Named room.
    Room,
    /// One-to-one conversation.
    Direct,
}

/// Loosely-typed inbound payload before channel-aware validation.
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: Option<String>,
    username: Option<String>,
    receiver: Option<String>,
    message_id: Option<i64>,
}

/// A validated frame from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Post to the session's room.
    RoomMessage {
        /// Message body.
        message: String,
        /// Display name chosen by the sender.
        username: String,
    },
    /// Send a direct message.
    DirectMessage {
        /// Message body.
        message: String,
        /// Receiver's username.
        receiver: String,
    },
    /// Delete a message by ID.
    Delete {
        /// ID of the message to delete.
        message_id: i64,
    },
}

fn required(field: Option<String>, name: &str) -> Result<String> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(RelayError::Validation(format!("missing field '{name}'"))),
    }
}

impl InboundFrame {
    /// Decode a text frame received on a channel of the given kind.
    pub fn decode(kind: ChannelKind, text: &str) -> Result<Self> {
        let raw: RawFrame = serde_json::from_str(text)?;

        let frame_type = raw
            .kind
            .ok_or_else(|| RelayError::Decode("missing field 'type'".to_string()))?;

        match frame_type.as_str() {
            "message" => {
                let message = required(raw.message, "message")?;
                match kind {
                    ChannelKind::Room => Ok(InboundFrame::RoomMessage {
                        message,
                        username: required(raw.username, "username")?,
                    }),
                    ChannelKind::Direct => Ok(InboundFrame::DirectMessage {
                        message,
                        receiver: required(raw.receiver, "receiver")?,
                    }),
                }
            }
            "delete" => {
                let message_id = raw.message_id.ok_or_else(|| {
                    RelayError::Validation("missing field 'message_id'".to_string())
                })?;
                Ok(InboundFrame::Delete { message_id })
            }
            other => Err(RelayError::UnhandledFrame(other.to_string())),
        }
    }
}

/// One message as shown to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageEntry {
    /// Sender's display name.
    pub username: String,
    /// Message body.
    pub message: String,
    /// Formatted timestamp.
    pub timestamp: String,
    /// Message ID.
    pub message_id: i64,
}

impl MessageEntry {
    /// Entry stamped with the message's creation time.
    pub fn from_message(message: &ChatMessage, tz: &Tz) -> Self {
        Self {
            username: message.sender_name.clone(),
            message: message.body.clone(),
            timestamp: format_display(&message.created_at, tz),
            message_id: message.id,
        }
    }
}

/// A frame sent to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ServerFrame {
    /// Full history snapshot.
    Snapshot {
        /// Messages, oldest first.
        messages: Vec<MessageEntry>,
    },
    /// A single live message.
    Message(MessageEntry),
}

impl ServerFrame {
    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| RelayError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::MessageScope;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_decode_room_message() {
        let frame = InboundFrame::decode(
            ChannelKind::Room,
            r#"{"type":"message","message":"hi","username":"alice"}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            InboundFrame::RoomMessage {
                message: "hi".to_string(),
                username: "alice".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_direct_message() {
        let frame = InboundFrame::decode(
            ChannelKind::Direct,
            r#"{"type":"message","message":"hey","receiver":"carol"}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            InboundFrame::DirectMessage {
                message: "hey".to_string(),
                receiver: "carol".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_delete() {
        let frame =
            InboundFrame::decode(ChannelKind::Room, r#"{"type":"delete","message_id":5}"#)
                .unwrap();
        assert_eq!(frame, InboundFrame::Delete { message_id: 5 });
    }

    #[test]
    fn test_decode_missing_fields() {
        let cases = [
            (ChannelKind::Room, r#"{"type":"message","message":"hi"}"#),
            (ChannelKind::Room, r#"{"type":"message","message":"","username":"a"}"#),
            (ChannelKind::Direct, r#"{"type":"message","message":"hi","username":"a"}"#),
            (ChannelKind::Direct, r#"{"type":"delete"}"#),
        ];
        for (kind, text) in cases {
            assert!(
                matches!(InboundFrame::decode(kind, text), Err(RelayError::Validation(_))),
                "expected validation error for {text}"
            );
        }
    }

    #[test]
    fn test_decode_unknown_type() {
        let result = InboundFrame::decode(ChannelKind::Room, r#"{"type":"typing"}"#);
        assert!(matches!(result, Err(RelayError::UnhandledFrame(t)) if t == "typing"));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            InboundFrame::decode(ChannelKind::Room, "not json"),
            Err(RelayError::Decode(_))
        ));
        assert!(matches!(
            InboundFrame::decode(ChannelKind::Room, r#"{"message":"hi"}"#),
            Err(RelayError::Decode(_))
        ));
    }

    #[test]
    fn test_server_frame_json() {
        let message = ChatMessage {
            id: 7,
            scope: MessageScope::room("Test"),
            sender_id: None,
            sender_name: "alice".to_string(),
            receiver_id: None,
            body: "hi".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 0).unwrap(),
        };
        let entry = MessageEntry::from_message(&message, &Tz::UTC);
        assert_eq!(entry.timestamp, "Mar 05, 2024 14:07");

        let live: serde_json::Value =
            serde_json::from_str(&ServerFrame::Message(entry.clone()).to_json().unwrap())
                .unwrap();
        assert_eq!(
            live,
            serde_json::json!({
                "username": "alice",
                "message": "hi",
                "timestamp": "Mar 05, 2024 14:07",
                "message_id": 7
            })
        );

        let snapshot: serde_json::Value = serde_json::from_str(
            &ServerFrame::Snapshot {
                messages: vec![entry],
            }
            .to_json()
            .unwrap(),
        )
        .unwrap();
        assert_eq!(snapshot["messages"][0]["message_id"], 7);
    }
}
