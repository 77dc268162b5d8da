//! Client sessions for chatrelay.
//!
//! A session is one client connection. It owns the receiving half of its
//! outbound queue (held by the transport task) and hands the sending half to
//! the group registry as a [`SessionHandle`].

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::directory::UserIdentity;
use super::event::GroupEvent;
use super::message::MessageScope;
use super::policy::HistoryAccess;
use super::protocol::{ChannelKind, MessageEntry, ServerFrame};
use super::registry::RoutingKey;
use crate::datetime::format_display;

/// Unique session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The sending side of a session's outbound queue, as stored in groups.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Session ID.
    pub id: SessionId,
    /// Outbound event queue.
    pub sender: mpsc::Sender<Arc<GroupEvent>>,
}

impl SessionHandle {
    /// Create a handle.
    pub fn new(id: SessionId, sender: mpsc::Sender<Arc<GroupEvent>>) -> Self {
        Self { id, sender }
    }
}

/// What a session was opened for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    /// A room, by canonical name.
    Room {
        /// Canonical room name.
        name: String,
    },
    /// A direct conversation with another user.
    Direct {
        /// The other participant.
        peer: UserIdentity,
    },
}

impl Channel {
    /// Kind of channel, used to pick the inbound frame shape.
    pub fn kind(&self) -> ChannelKind {
        match self {
            Channel::Room { .. } => ChannelKind::Room,
            Channel::Direct { .. } => ChannelKind::Direct,
        }
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not yet subscribed.
    Connecting,
    /// Subscribed and receiving events.
    Joined,
    /// Disconnected; no longer in any group.
    Closed,
}

/// One client connection.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    identity: Option<UserIdentity>,
    channel: Channel,
    state: SessionState,
    access: HistoryAccess,
    joined: Vec<RoutingKey>,
    sender: mpsc::Sender<Arc<GroupEvent>>,
}

impl Session {
    /// Create a session and the receiving half of its outbound queue.
    ///
    /// `identity` is None for anonymous clients.
    pub fn new(
        identity: Option<UserIdentity>,
        channel: Channel,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Arc<GroupEvent>>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let session = Self {
            id: SessionId::new(),
            identity,
            channel,
            state: SessionState::Connecting,
            access: HistoryAccess::Denied,
            joined: Vec::new(),
            sender,
        };
        (session, receiver)
    }

    /// Session ID.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Owning user, or None if anonymous.
    pub fn identity(&self) -> Option<&UserIdentity> {
        self.identity.as_ref()
    }

    /// Channel the session was opened for.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// History access granted when the session connected.
    pub fn access(&self) -> HistoryAccess {
        self.access
    }

    pub(crate) fn set_access(&mut self, access: HistoryAccess) {
        self.access = access;
    }

    /// Handle to register with the group registry.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(self.id, self.sender.clone())
    }

    /// Routing keys joined so far.
    pub fn joined_keys(&self) -> &[RoutingKey] {
        &self.joined
    }

    pub(crate) fn record_join(&mut self, key: RoutingKey) {
        if !self.joined.contains(&key) {
            self.joined.push(key);
        }
    }

    pub(crate) fn take_keys(&mut self) -> Vec<RoutingKey> {
        std::mem::take(&mut self.joined)
    }

    /// Message scope of this session's channel.
    ///
    /// None for a direct channel without an owning identity.
    pub fn scope(&self) -> Option<MessageScope> {
        match &self.channel {
            Channel::Room { name } => Some(MessageScope::Room(name.clone())),
            Channel::Direct { peer } => self
                .identity
                .as_ref()
                .map(|me| MessageScope::direct(me.id, peer.id)),
        }
    }

    /// Whether an event belongs to this session's conversation.
    ///
    /// A user inbox is shared by every direct conversation the user has
    /// open, so events are filtered by scope before rendering.
    pub fn accepts(&self, event: &GroupEvent) -> bool {
        self.scope().as_ref() == Some(event.scope())
    }

    /// Render an event as an outbound frame.
    ///
    /// Live messages are stamped with `now`, the delivery time. Snapshot
    /// entries carry their creation time and are cut down to this session's
    /// own history access.
    pub fn render(&self, event: &GroupEvent, now: DateTime<Utc>, tz: &Tz) -> ServerFrame {
        match event {
            GroupEvent::ChatMessage {
                message_id,
                username,
                body,
                ..
            } => ServerFrame::Message(MessageEntry {
                username: username.clone(),
                message: body.clone(),
                timestamp: format_display(&now, tz),
                message_id: *message_id,
            }),
            GroupEvent::Snapshot { messages, .. } => {
                let window = self.access.window(now);
                ServerFrame::Snapshot {
                    messages: messages
                        .iter()
                        .filter(|message| window.admits(&message.created_at))
                        .map(|message| MessageEntry::from_message(message, tz))
                        .collect(),
                }
            }
        }
    }
}
