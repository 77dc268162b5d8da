//! Durable chat message model.

use std::fmt;

use chrono::{DateTime, Utc};

/// The two participants of a direct-message conversation.
///
/// The pair is symmetric: `DirectPair::new(a, b) == DirectPair::new(b, a)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectPair {
    low: i64,
    high: i64,
}

impl DirectPair {
    /// Create a pair from two user IDs in any order.
    pub fn new(a: i64, b: i64) -> Self {
        Self {
            low: a.min(b),
            high: a.max(b),
        }
    }

    /// Both participants, lowest ID first.
    pub fn members(&self) -> (i64, i64) {
        (self.low, self.high)
    }

    /// Whether the user takes part in this conversation.
    pub fn contains(&self, user_id: i64) -> bool {
        self.low == user_id || self.high == user_id
    }

    /// The participant that is not `user_id`.
    pub fn other(&self, user_id: i64) -> Option<i64> {
        if user_id == self.low {
            Some(self.high)
        } else if user_id == self.high {
            Some(self.low)
        } else {
            None
        }
    }
}

/// The conversation a message belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageScope {
    /// A named room (canonical name).
    Room(String),
    /// A direct-message conversation.
    Direct(DirectPair),
}

impl MessageScope {
    /// Scope of a room.
    pub fn room(name: impl Into<String>) -> Self {
        Self::Room(name.into())
    }

    /// Scope of a direct conversation between two users.
    pub fn direct(a: i64, b: i64) -> Self {
        Self::Direct(DirectPair::new(a, b))
    }

    /// Storage discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            MessageScope::Room(_) => "room",
            MessageScope::Direct(_) => "direct",
        }
    }
}

impl fmt::Display for MessageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageScope::Room(name) => write!(f, "room:{name}"),
            MessageScope::Direct(pair) => {
                let (a, b) = pair.members();
                write!(f, "direct:{a}:{b}")
            }
        }
    }
}

/// A stored chat message.
///
/// `id` and `created_at` are assigned by the history store on append and
/// never come from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Message ID.
    pub id: i64,
    /// Conversation the message belongs to.
    pub scope: MessageScope,
    /// Sender's user ID (None for anonymous room senders).
    pub sender_id: Option<i64>,
    /// Sender's display name at the time of sending.
    pub sender_name: String,
    /// Receiver's user ID (direct messages only).
    pub receiver_id: Option<i64>,
    /// Message body.
    pub body: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A message about to be appended to the history store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChatMessage {
    /// Conversation the message belongs to.
    pub scope: MessageScope,
    /// Sender's user ID.
    pub sender_id: Option<i64>,
    /// Sender's display name.
    pub sender_name: String,
    /// Receiver's user ID (direct messages only).
    pub receiver_id: Option<i64>,
    /// Message body.
    pub body: String,
}

impl NewChatMessage {
    /// A message posted to a room.
    pub fn room(
        room: impl Into<String>,
        sender_id: Option<i64>,
        sender_name: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            scope: MessageScope::Room(room.into()),
            sender_id,
            sender_name: sender_name.into(),
            receiver_id: None,
            body: body.into(),
        }
    }

    /// A direct message from one user to another.
    pub fn direct(
        sender_id: i64,
        sender_name: impl Into<String>,
        receiver_id: i64,
        body: impl Into<String>,
    ) -> Self {
        Self {
            scope: MessageScope::direct(sender_id, receiver_id),
            sender_id: Some(sender_id),
            sender_name: sender_name.into(),
            receiver_id: Some(receiver_id),
            body: body.into(),
        }
    }
}
