//! Group registry for chatrelay.
//!
//! Maps routing keys to the live set of sessions subscribed under them and
//! fans events out to those sessions. The outer map is only write-locked to
//! create a group; join, leave and broadcast on one key serialize on that
//! group's own lock, so traffic on different keys never contends.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, RwLock};

use super::event::GroupEvent;
use super::session::{SessionHandle, SessionId};

/// Name under which a set of sessions receives broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoutingKey {
    /// All sessions viewing a room.
    Room(String),
    /// All sessions owned by a user, used for direct-message delivery.
    UserInbox(i64),
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingKey::Room(name) => write!(f, "chat_{name}"),
            RoutingKey::UserInbox(user_id) => write!(f, "inbox_{user_id}"),
        }
    }
}

type Group = Arc<Mutex<HashMap<SessionId, SessionHandle>>>;

/// Registry of groups keyed by routing key.
///
/// Groups are created on first join and are kept once empty.
#[derive(Default)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<RoutingKey, Group>>,
}

impl GroupRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    async fn group(&self, key: &RoutingKey) -> Option<Group> {
        self.groups.read().await.get(key).cloned()
    }

    async fn group_or_create(&self, key: &RoutingKey) -> Group {
        if let Some(group) = self.group(key).await {
            return group;
        }
        let mut groups = self.groups.write().await;
        Arc::clone(groups.entry(key.clone()).or_default())
    }

    /// Add a session to a group. Joining twice is the same as joining once.
    pub async fn join(&self, key: &RoutingKey, handle: SessionHandle) {
        let group = self.group_or_create(key).await;
        let session_id = handle.id;
        let inserted = group.lock().await.insert(session_id, handle).is_none();
        if inserted {
            tracing::debug!(session = %session_id, key = %key, "joined group");
        }
    }

    /// Remove a session from a group. Returns false if it was not a member.
    pub async fn leave(&self, key: &RoutingKey, session_id: SessionId) -> bool {
        let Some(group) = self.group(key).await else {
            return false;
        };
        let removed = group.lock().await.remove(&session_id).is_some();
        if removed {
            tracing::debug!(session = %session_id, key = %key, "left group");
        }
        removed
    }

    /// Remove a session from every group it is in.
    ///
    /// Used when a session's own record of its keys is lost. Returns the
    /// number of groups it was removed from.
    pub async fn leave_all(&self, session_id: SessionId) -> usize {
        let groups: Vec<(RoutingKey, Group)> = self
            .groups
            .read()
            .await
            .iter()
            .map(|(key, group)| (key.clone(), Arc::clone(group)))
            .collect();

        let mut removed = 0;
        for (key, group) in groups {
            if group.lock().await.remove(&session_id).is_some() {
                tracing::debug!(session = %session_id, key = %key, "left group");
                removed += 1;
            }
        }
        removed
    }

    /// Deliver an event to every session in a group.
    ///
    /// Delivery is best-effort: a session whose queue is full or closed is
    /// skipped and the others still receive the event. Returns the number of
    /// sessions the event was queued for.
    pub async fn broadcast(&self, key: &RoutingKey, event: Arc<GroupEvent>) -> usize {
        let Some(group) = self.group(key).await else {
            return 0;
        };

        let members = group.lock().await;
        let mut delivered = 0;
        for (session_id, handle) in members.iter() {
            match handle.sender.try_send(Arc::clone(&event)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        session = %session_id,
                        key = %key,
                        event = event.name(),
                        "outbound queue full, dropping event"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(
                        session = %session_id,
                        key = %key,
                        "outbound queue closed, skipping"
                    );
                }
            }
        }
        delivered
    }

    /// Number of sessions currently in a group.
    pub async fn group_size(&self, key: &RoutingKey) -> usize {
        match self.group(key).await {
            Some(group) => group.lock().await.len(),
            None => 0,
        }
    }

    /// Number of groups ever created.
    pub async fn group_count(&self) -> usize {
        self.groups.read().await.len()
    }

    /// Whether a session is in a group.
    pub async fn contains(&self, key: &RoutingKey, session_id: SessionId) -> bool {
        match self.group(key).await {
            Some(group) => group.lock().await.contains_key(&session_id),
            None => false,
        }
    }
}
