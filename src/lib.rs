//! chatrelay - real-time chat relay
//!
//! Clients join named rooms or one-to-one conversations over WebSocket,
//! exchange messages and receive tier-gated history on join.

pub mod chat;
pub mod config;
pub mod datetime;
pub mod db;
pub mod error;
pub mod logging;
pub mod web;

pub use chat::{
    ChatLogRepository, ChatMessage, ChatRouter, DbDirectory, GroupEvent, GroupRegistry,
    HistoryPolicy, HistoryStore, IdentityProvider, MessageScope, RoomDirectory, RoutingKey,
    ServerFrame, Session, UserIdentity,
};
pub use config::Config;
pub use db::{Database, NewUser, RoomRepository, Tier, User, UserRepository};
pub use error::{RelayError, Result};
