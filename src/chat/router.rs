//! Chat router for chatrelay.
//!
//! The router turns session lifecycle events and inbound frames into store
//! calls and registry fan-out. It holds no per-session state of its own; the
//! transport task owns each [`Session`] and passes it in.

use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use tokio::sync::mpsc;

use super::directory::{IdentityProvider, RoomDirectory, UserIdentity};
use super::event::GroupEvent;
use super::log::HistoryStore;
use super::message::{ChatMessage, MessageScope, NewChatMessage};
use super::policy::{HistoryAccess, HistoryPolicy};
use super::protocol::{InboundFrame, MessageEntry, ServerFrame};
use super::registry::{GroupRegistry, RoutingKey};
use super::session::{Channel, Session, SessionState};
use crate::db::Tier;
use crate::{RelayError, Result};

/// Default capacity of a session's outbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Routes chat traffic between sessions, the history store and the registry.
pub struct ChatRouter {
    registry: Arc<GroupRegistry>,
    store: Arc<dyn HistoryStore>,
    identities: Arc<dyn IdentityProvider>,
    rooms: Arc<dyn RoomDirectory>,
    policy: HistoryPolicy,
    timezone: Tz,
    queue_capacity: usize,
}

impl ChatRouter {
    /// Create a router with the default history policy, UTC display time and
    /// default queue capacity.
    pub fn new(
        registry: Arc<GroupRegistry>,
        store: Arc<dyn HistoryStore>,
        identities: Arc<dyn IdentityProvider>,
        rooms: Arc<dyn RoomDirectory>,
    ) -> Self {
        Self {
            registry,
            store,
            identities,
            rooms,
            policy: HistoryPolicy::default(),
            timezone: Tz::UTC,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Set the history policy.
    pub fn with_policy(mut self, policy: HistoryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the display timezone for outbound timestamps.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Set the outbound queue capacity for new sessions.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// The shared group registry.
    pub fn registry(&self) -> &Arc<GroupRegistry> {
        &self.registry
    }

    /// Display timezone.
    pub fn timezone(&self) -> &Tz {
        &self.timezone
    }

    /// Resolve the requester of a connection.
    ///
    /// An absent, empty or unknown username is treated as anonymous.
    pub async fn identify(&self, username: Option<&str>) -> Result<Option<UserIdentity>> {
        match username.map(str::trim) {
            Some(name) if !name.is_empty() => self.identities.resolve_user(name).await,
            _ => Ok(None),
        }
    }

    /// Resolve a room name to its canonical form.
    pub async fn resolve_room(&self, name: &str) -> Result<String> {
        self.rooms
            .resolve_room(name)
            .await?
            .ok_or_else(|| RelayError::NotFound(format!("room {name}")))
    }

    /// Resolve the peer of a direct channel.
    ///
    /// Direct channels require an authenticated requester.
    pub async fn resolve_peer(
        &self,
        requester: Option<&UserIdentity>,
        username: &str,
    ) -> Result<UserIdentity> {
        if requester.is_none() {
            return Err(RelayError::Permission(
                "direct messages require an authenticated user".to_string(),
            ));
        }
        self.identities
            .resolve_user(username)
            .await?
            .ok_or_else(|| RelayError::NotFound(format!("user {username}")))
    }

    /// Create a session for a resolved channel.
    pub fn open_session(
        &self,
        identity: Option<UserIdentity>,
        channel: Channel,
    ) -> (Session, mpsc::Receiver<Arc<GroupEvent>>) {
        Session::new(identity, channel, self.queue_capacity)
    }

    /// Subscribe a session to a room.
    pub async fn join_room(&self, session: &mut Session, room: &str) {
        let key = RoutingKey::Room(room.to_string());
        self.registry.join(&key, session.handle()).await;
        session.record_join(key);
    }

    /// Subscribe a session to a user's inbox.
    pub async fn join_inbox(&self, session: &mut Session, user_id: i64) {
        let key = RoutingKey::UserInbox(user_id);
        self.registry.join(&key, session.handle()).await;
        session.record_join(key);
    }

    /// Attach a session and build its initial history snapshot.
    ///
    /// On failure the session ends up closed and in no group.
    pub async fn connect(&self, session: &mut Session) -> Result<ServerFrame> {
        if session.state() != SessionState::Connecting {
            return Err(RelayError::Validation(format!(
                "session {} is not connecting",
                session.id()
            )));
        }

        let scope = match session.scope() {
            Some(scope) => scope,
            None => {
                session.set_state(SessionState::Closed);
                return Err(RelayError::Permission(
                    "direct messages require an authenticated user".to_string(),
                ));
            }
        };

        match session.channel().clone() {
            Channel::Room { name } => self.join_room(session, &name).await,
            Channel::Direct { .. } => {
                if let Some(me) = session.identity().map(|me| me.id) {
                    self.join_inbox(session, me).await;
                }
            }
        }

        let fetched = async {
            let access = self.access(session.identity(), &scope).await?;
            let messages = self.fetch(access, &scope).await?;
            Ok::<_, RelayError>((access, messages))
        }
        .await;
        let (access, messages) = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                self.close(session).await;
                return Err(e);
            }
        };
        let messages: Vec<MessageEntry> = messages
            .iter()
            .map(|message| MessageEntry::from_message(message, &self.timezone))
            .collect();

        session.set_access(access);
        session.set_state(SessionState::Joined);
        tracing::info!(
            session = %session.id(),
            scope = %scope,
            user = session.identity().map(|u| u.username.as_str()).unwrap_or("anonymous"),
            history = messages.len(),
            "session connected"
        );

        Ok(ServerFrame::Snapshot { messages })
    }

    /// Detach a session from every group it joined. Safe to call repeatedly.
    pub async fn close(&self, session: &mut Session) {
        for key in session.take_keys() {
            self.registry.leave(&key, session.id()).await;
        }
        if session.state() != SessionState::Closed {
            session.set_state(SessionState::Closed);
            tracing::info!(session = %session.id(), "session closed");
        }
    }

    /// Decode and dispatch a text frame from a session.
    pub async fn handle_text(&self, session: &Session, text: &str) -> Result<()> {
        let frame = InboundFrame::decode(session.channel().kind(), text)?;
        self.dispatch(session, frame).await
    }

    /// Dispatch a decoded frame.
    pub async fn dispatch(&self, session: &Session, frame: InboundFrame) -> Result<()> {
        match frame {
            InboundFrame::RoomMessage { message, username } => {
                self.submit_room_message(session, &username, &message).await?;
            }
            InboundFrame::DirectMessage { message, receiver } => {
                self.submit_direct_message(session, &receiver, &message)
                    .await?;
            }
            InboundFrame::Delete { message_id } => {
                self.submit_delete(session, message_id).await?;
            }
        }
        Ok(())
    }

    fn ensure_joined(session: &Session) -> Result<()> {
        if session.state() == SessionState::Joined {
            Ok(())
        } else {
            Err(RelayError::Validation(format!(
                "session {} is not joined",
                session.id()
            )))
        }
    }

    /// Store a room message and broadcast it to the room.
    pub async fn submit_room_message(
        &self,
        session: &Session,
        username: &str,
        body: &str,
    ) -> Result<ChatMessage> {
        Self::ensure_joined(session)?;
        let Channel::Room { name } = session.channel() else {
            return Err(RelayError::Validation(
                "room message on a direct channel".to_string(),
            ));
        };

        let sender_id = session.identity().map(|u| u.id);
        let message = self
            .store
            .append(NewChatMessage::room(name.as_str(), sender_id, username, body))
            .await?;

        let key = RoutingKey::Room(name.clone());
        let delivered = self
            .registry
            .broadcast(&key, Arc::new(GroupEvent::chat_message(&message)))
            .await;
        tracing::debug!(
            session = %session.id(),
            key = %key,
            message_id = message.id,
            delivered,
            "room message stored"
        );

        Ok(message)
    }

    /// Store a direct message and broadcast it to both participants' inboxes.
    pub async fn submit_direct_message(
        &self,
        session: &Session,
        receiver: &str,
        body: &str,
    ) -> Result<ChatMessage> {
        Self::ensure_joined(session)?;
        if !matches!(session.channel(), Channel::Direct { .. }) {
            return Err(RelayError::Validation(
                "direct message on a room channel".to_string(),
            ));
        }
        let me = session.identity().ok_or_else(|| {
            RelayError::Permission("direct messages require an authenticated user".to_string())
        })?;
        let peer = self
            .identities
            .resolve_user(receiver)
            .await?
            .ok_or_else(|| RelayError::NotFound(format!("user {receiver}")))?;

        let message = self
            .store
            .append(NewChatMessage::direct(
                me.id,
                me.username.as_str(),
                peer.id,
                body,
            ))
            .await?;

        let event = Arc::new(GroupEvent::chat_message(&message));
        let mut delivered = 0;
        for key in Self::scope_keys(&message.scope) {
            delivered += self.registry.broadcast(&key, Arc::clone(&event)).await;
        }
        tracing::debug!(
            session = %session.id(),
            scope = %message.scope,
            message_id = message.id,
            delivered,
            "direct message stored"
        );

        Ok(message)
    }

    /// Delete a message and broadcast a fresh snapshot of its conversation.
    ///
    /// The snapshot is fetched once with the deleter's access. Each recipient
    /// renders it narrowed to its own access, so nobody sees more than their
    /// own history policy allows.
    ///
    /// Deleting an ID that no longer exists still re-syncs the conversation.
    /// Returns whether a message was removed.
    pub async fn submit_delete(&self, session: &Session, message_id: i64) -> Result<bool> {
        Self::ensure_joined(session)?;
        let me = session.identity().ok_or_else(|| {
            RelayError::Permission("anonymous users cannot delete messages".to_string())
        })?;
        let scope = session.scope().ok_or_else(|| {
            RelayError::Permission("session has no conversation".to_string())
        })?;

        if let Channel::Room { name } = session.channel() {
            if !self.rooms.is_member(name, me.id).await? {
                return Err(RelayError::Permission(format!(
                    "{} is not a member of {name}",
                    me.username
                )));
            }
        }

        if let Some(existing) = self.store.get_by_id(message_id).await? {
            if existing.scope != scope {
                return Err(RelayError::Permission(format!(
                    "message {message_id} does not belong to {scope}"
                )));
            }
        }

        let removed = self.store.delete_by_id(message_id).await?;

        let access = self.access(Some(me), &scope).await?;
        let messages = self.fetch(access, &scope).await?;
        let event = Arc::new(GroupEvent::Snapshot {
            scope: scope.clone(),
            messages,
        });
        for key in Self::scope_keys(&scope) {
            self.registry.broadcast(&key, Arc::clone(&event)).await;
        }
        tracing::info!(
            session = %session.id(),
            scope = %scope,
            message_id,
            removed,
            "message deleted"
        );

        Ok(removed)
    }

    /// History of a scope visible to a requester (None is anonymous).
    pub async fn history(
        &self,
        requester: Option<&UserIdentity>,
        scope: &MessageScope,
    ) -> Result<Vec<ChatMessage>> {
        let access = self.access(requester, scope).await?;
        self.fetch(access, scope).await
    }

    /// History access of a requester to a scope.
    ///
    /// Room history is only open to members of the room; anonymous
    /// requesters get none anywhere.
    pub async fn access(
        &self,
        requester: Option<&UserIdentity>,
        scope: &MessageScope,
    ) -> Result<HistoryAccess> {
        let Some(user) = requester else {
            return Ok(HistoryAccess::Denied);
        };
        if let MessageScope::Room(name) = scope {
            if !self.rooms.is_member(name, user.id).await? {
                return Ok(HistoryAccess::Denied);
            }
        }
        let tier: Tier = self.identities.user_tier(user.id).await?;
        Ok(self.policy.access(Some(tier)))
    }

    async fn fetch(&self, access: HistoryAccess, scope: &MessageScope) -> Result<Vec<ChatMessage>> {
        let window = access.window(Utc::now());
        if window.is_empty() {
            return Ok(Vec::new());
        }
        self.store.query_scope(scope, window.cutoff()).await
    }

    /// Routing keys that carry events of a scope.
    fn scope_keys(scope: &MessageScope) -> Vec<RoutingKey> {
        match scope {
            MessageScope::Room(name) => vec![RoutingKey::Room(name.clone())],
            MessageScope::Direct(pair) => {
                let (a, b) = pair.members();
                if a == b {
                    vec![RoutingKey::UserInbox(a)]
                } else {
                    vec![RoutingKey::UserInbox(a), RoutingKey::UserInbox(b)]
                }
            }
        }
    }
}
