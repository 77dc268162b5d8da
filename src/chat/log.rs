//! Chat history storage for chatrelay.
//!
//! `HistoryStore` is the thin storage facade the router depends on. It holds
//! no business policy: tier-based filtering is applied by the caller, which
//! passes an optional cutoff.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::{QueryBuilder, Sqlite};

use super::message::{ChatMessage, MessageScope, NewChatMessage};
use crate::datetime::{from_storage, to_storage};
use crate::db::DbPool;
use crate::{RelayError, Result};

/// Durable message log used by the router.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append a message. The store assigns the ID and the creation timestamp.
    async fn append(&self, message: NewChatMessage) -> Result<ChatMessage>;

    /// Messages of a scope created at or after `since` (all if None),
    /// oldest first.
    async fn query_scope(
        &self,
        scope: &MessageScope,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChatMessage>>;

    /// Get a single message by ID.
    async fn get_by_id(&self, id: i64) -> Result<Option<ChatMessage>>;

    /// Hard-delete a message. Deleting a missing ID is a no-op; the return
    /// value tells whether a row was removed.
    async fn delete_by_id(&self, id: i64) -> Result<bool>;
}

/// Database row type for ChatMessage.
#[derive(sqlx::FromRow)]
struct ChatLogRow {
    id: i64,
    scope_kind: String,
    room_name: Option<String>,
    sender_id: Option<i64>,
    receiver_id: Option<i64>,
    sender_name: String,
    body: String,
    created_at: String,
}

impl TryFrom<ChatLogRow> for ChatMessage {
    type Error = RelayError;

    fn try_from(row: ChatLogRow) -> Result<Self> {
        let scope = match (row.scope_kind.as_str(), &row.room_name) {
            ("room", Some(name)) => MessageScope::Room(name.clone()),
            ("direct", _) => match (row.sender_id, row.receiver_id) {
                (Some(sender), Some(receiver)) => MessageScope::direct(sender, receiver),
                _ => {
                    return Err(RelayError::Database(format!(
                        "direct message {} has no participants",
                        row.id
                    )))
                }
            },
            (kind, _) => {
                return Err(RelayError::Database(format!(
                    "message {} has invalid scope '{kind}'",
                    row.id
                )))
            }
        };

        let created_at = from_storage(&row.created_at).ok_or_else(|| {
            RelayError::Database(format!(
                "message {} has invalid timestamp '{}'",
                row.id, row.created_at
            ))
        })?;

        Ok(Self {
            id: row.id,
            scope,
            sender_id: row.sender_id,
            sender_name: row.sender_name,
            receiver_id: row.receiver_id,
            body: row.body,
            created_at,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, scope_kind, room_name, sender_id, receiver_id, \
                              sender_name, body, created_at FROM chat_messages";

/// SQLite-backed history store.
#[derive(Clone)]
pub struct ChatLogRepository {
    pool: DbPool,
}

impl ChatLogRepository {
    /// Create a repository over the given pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for ChatLogRepository {
    async fn append(&self, message: NewChatMessage) -> Result<ChatMessage> {
        // Storage keeps microseconds; truncate so the returned value round-trips.
        let created_at = Utc::now().trunc_subsecs(6);
        let room_name = match &message.scope {
            MessageScope::Room(name) => Some(name.clone()),
            MessageScope::Direct(_) => None,
        };

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO chat_messages
                (scope_kind, room_name, sender_id, receiver_id, sender_name, body, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(message.scope.kind())
        .bind(&room_name)
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(&message.sender_name)
        .bind(&message.body)
        .bind(to_storage(&created_at))
        .fetch_one(&self.pool)
        .await?;

        Ok(ChatMessage {
            id,
            scope: message.scope,
            sender_id: message.sender_id,
            sender_name: message.sender_name,
            receiver_id: message.receiver_id,
            body: message.body,
            created_at,
        })
    }

    async fn query_scope(
        &self,
        scope: &MessageScope,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChatMessage>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_COLUMNS);

        match scope {
            MessageScope::Room(name) => {
                query
                    .push(" WHERE scope_kind = 'room' AND room_name = ")
                    .push_bind(name.clone());
            }
            MessageScope::Direct(pair) => {
                let (a, b) = pair.members();
                query
                    .push(" WHERE scope_kind = 'direct' AND ((sender_id = ")
                    .push_bind(a)
                    .push(" AND receiver_id = ")
                    .push_bind(b)
                    .push(") OR (sender_id = ")
                    .push_bind(b)
                    .push(" AND receiver_id = ")
                    .push_bind(a)
                    .push("))");
            }
        }

        if let Some(since) = since {
            query.push(" AND created_at >= ").push_bind(to_storage(&since));
        }
        query.push(" ORDER BY created_at ASC, id ASC");

        let rows = query
            .build_query_as::<ChatLogRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(ChatMessage::try_from).collect()
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ChatMessage>> {
        let row = sqlx::query_as::<_, ChatLogRow>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ChatMessage::try_from).transpose()
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
