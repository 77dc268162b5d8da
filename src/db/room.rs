//! Room storage for chatrelay.
//!
//! Rooms and their membership are managed by the surrounding application;
//! the relay resolves names and checks membership through this repository.

use super::DbPool;
use crate::{RelayError, Result};

/// Normalize a room name to its canonical capitalized form.
///
/// The first character is upper-cased and the rest lower-cased, so
/// "general", "GENERAL" and "General" all name the same room.
pub fn normalize_room_name(name: &str) -> String {
    let mut chars = name.trim().chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// A chat room.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Room {
    /// Room ID.
    pub id: i64,
    /// Canonical room name.
    pub name: String,
    /// Creation timestamp.
    pub created_at: String,
}

/// Repository for rooms and room membership.
pub struct RoomRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> RoomRepository<'a> {
    /// Create a new RoomRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Get a room by name, creating it if it does not exist.
    pub async fn get_or_create(&self, name: &str) -> Result<Room> {
        let name = normalize_room_name(name);
        if name.is_empty() {
            return Err(RelayError::Validation("room name is empty".to_string()));
        }

        sqlx::query("INSERT INTO rooms (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
            .bind(&name)
            .execute(self.pool)
            .await?;

        self.get_by_name(&name)
            .await?
            .ok_or_else(|| RelayError::NotFound(format!("room {name}")))
    }

    /// Get a room by name. The name is normalized before lookup.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Room>> {
        let room = sqlx::query_as::<_, Room>(
            "SELECT id, name, created_at FROM rooms WHERE name = ?",
        )
        .bind(normalize_room_name(name))
        .fetch_optional(self.pool)
        .await?;

        Ok(room)
    }

    /// Add a user to a room. Adding an existing member is a no-op.
    pub async fn add_member(&self, room_id: i64, user_id: i64) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO room_members (room_id, user_id) VALUES (?, ?)")
            .bind(room_id)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Check whether a user is a member of the named room.
    pub async fn is_member(&self, room_name: &str, user_id: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM room_members m
                JOIN rooms r ON r.id = m.room_id
                WHERE r.name = ? AND m.user_id = ?
            )",
        )
        .bind(normalize_room_name(room_name))
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;

        Ok(exists)
    }
}
