//! Identity and room lookups used by the router.
//!
//! Users and rooms are owned by the surrounding application. The relay only
//! needs to resolve names, read a user's tier and check room membership.

use async_trait::async_trait;

use crate::db::{normalize_room_name, DbPool, RoomRepository, Tier, User, UserRepository};
use crate::{RelayError, Result};

/// A resolved, authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    /// Stable user ID.
    pub id: i64,
    /// Username.
    pub username: String,
}

impl From<User> for UserIdentity {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

/// Looks up users.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a username to a user. None if no such user exists.
    async fn resolve_user(&self, username: &str) -> Result<Option<UserIdentity>>;

    /// Current tier of a user. `NotFound` if the user does not exist.
    async fn user_tier(&self, user_id: i64) -> Result<Tier>;
}

/// Looks up rooms and membership.
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Resolve a room name to its canonical name. None if no such room exists.
    async fn resolve_room(&self, name: &str) -> Result<Option<String>>;

    /// Whether a user is a member of a room.
    async fn is_member(&self, room: &str, user_id: i64) -> Result<bool>;
}

/// Directory backed by the users and rooms tables.
#[derive(Clone)]
pub struct DbDirectory {
    pool: DbPool,
}

impl DbDirectory {
    /// Create a directory over the given pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityProvider for DbDirectory {
    async fn resolve_user(&self, username: &str) -> Result<Option<UserIdentity>> {
        let user = UserRepository::new(&self.pool)
            .get_by_username(username)
            .await?;
        Ok(user.map(UserIdentity::from))
    }

    async fn user_tier(&self, user_id: i64) -> Result<Tier> {
        UserRepository::new(&self.pool)
            .get_by_id(user_id)
            .await?
            .map(|user| user.tier)
            .ok_or_else(|| RelayError::NotFound(format!("user {user_id}")))
    }
}

#[async_trait]
impl RoomDirectory for DbDirectory {
    async fn resolve_room(&self, name: &str) -> Result<Option<String>> {
        let name = normalize_room_name(name);
        if name.is_empty() {
            return Ok(None);
        }
        let room = RoomRepository::new(&self.pool).get_by_name(&name).await?;
        Ok(room.map(|room| room.name))
    }

    async fn is_member(&self, room: &str, user_id: i64) -> Result<bool> {
        RoomRepository::new(&self.pool).is_member(room, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, NewUser};

    #[tokio::test]
    async fn test_resolve_user() {
        let db = Database::open_in_memory().await.unwrap();
        let alice = UserRepository::new(db.pool())
            .create(&NewUser::new("alice"))
            .await
            .unwrap();
        let directory = DbDirectory::new(db.pool().clone());

        let identity = directory.resolve_user("ALICE").await.unwrap().unwrap();
        assert_eq!(identity.id, alice.id);
        assert_eq!(identity.username, "alice");
        assert!(directory.resolve_user("carol").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_tier() {
        let db = Database::open_in_memory().await.unwrap();
        let pro = UserRepository::new(db.pool())
            .create(&NewUser::new("pro").with_tier(Tier::Privileged))
            .await
            .unwrap();
        let directory = DbDirectory::new(db.pool().clone());

        assert_eq!(directory.user_tier(pro.id).await.unwrap(), Tier::Privileged);
        assert!(matches!(
            directory.user_tier(9999).await,
            Err(RelayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_room_and_membership() {
        let db = Database::open_in_memory().await.unwrap();
        let room = RoomRepository::new(db.pool())
            .get_or_create("test")
            .await
            .unwrap();
        let alice = UserRepository::new(db.pool())
            .create(&NewUser::new("alice"))
            .await
            .unwrap();
        RoomRepository::new(db.pool())
            .add_member(room.id, alice.id)
            .await
            .unwrap();
        let directory = DbDirectory::new(db.pool().clone());

        assert_eq!(
            directory.resolve_room("tEST").await.unwrap(),
            Some("Test".to_string())
        );
        assert!(directory.resolve_room("missing").await.unwrap().is_none());
        assert!(directory.resolve_room("").await.unwrap().is_none());
        assert!(directory.is_member("Test", alice.id).await.unwrap());
        assert!(!directory.is_member("Test", alice.id + 1).await.unwrap());
    }
}
