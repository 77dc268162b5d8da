//! WebSocket module for real-time communication.
//!
//! This module provides the room and direct-message chat endpoints.

pub mod chat;

pub use chat::{direct_ws_handler, room_ws_handler, ChatWsState};
