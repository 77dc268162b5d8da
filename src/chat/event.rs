//! Events fanned out to sessions through the group registry.

use super::message::{ChatMessage, MessageScope};

/// An event broadcast to every session of a group.
///
/// Events are shared between recipients as `Arc<GroupEvent>`; each session
/// renders its own outbound frame from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupEvent {
    /// A newly stored message.
    ChatMessage {
        /// Conversation the message belongs to.
        scope: MessageScope,
        /// Message ID.
        message_id: i64,
        /// Sender's display name.
        username: String,
        /// Message body.
        body: String,
    },
    /// A re-synced history snapshot.
    ///
    /// Each recipient renders only the part its own history access allows.
    Snapshot {
        /// Conversation the snapshot belongs to.
        scope: MessageScope,
        /// Messages, oldest first.
        messages: Vec<ChatMessage>,
    },
}

impl GroupEvent {
    /// Live event for a stored message.
    pub fn chat_message(message: &ChatMessage) -> Self {
        GroupEvent::ChatMessage {
            scope: message.scope.clone(),
            message_id: message.id,
            username: message.sender_name.clone(),
            body: message.body.clone(),
        }
    }

    /// Conversation this event belongs to.
    pub fn scope(&self) -> &MessageScope {
        match self {
            GroupEvent::ChatMessage { scope, .. } => scope,
            GroupEvent::Snapshot { scope, .. } => scope,
        }
    }

    /// Event name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            GroupEvent::ChatMessage { .. } => "chat_message",
            GroupEvent::Snapshot { .. } => "messages",
        }
    }
}
