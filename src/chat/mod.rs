//! Chat module for chatrelay.
//!
//! This module provides the message-routing core:
//! - Group registry keyed by room or per-user inbox
//! - Sessions with bounded outbound queues
//! - Router applying history policy and delete authorization
//! - History store adapter over the durable message log

mod directory;
mod event;
mod log;
mod message;
mod policy;
mod protocol;
mod registry;
mod router;
mod session;

pub use directory::{DbDirectory, IdentityProvider, RoomDirectory, UserIdentity};
pub use event::GroupEvent;
pub use log::{ChatLogRepository, HistoryStore};
pub use message::{ChatMessage, DirectPair, MessageScope, NewChatMessage};
pub use policy::{
    HistoryAccess, HistoryPolicy, HistoryWindow, DEFAULT_STANDARD_WINDOW_HOURS,
    MAX_STANDARD_WINDOW_HOURS,
};
pub use protocol::{ChannelKind, InboundFrame, MessageEntry, ServerFrame};
pub use registry::{GroupRegistry, RoutingKey};
pub use router::{ChatRouter, DEFAULT_QUEUE_CAPACITY};
pub use session::{Channel, Session, SessionHandle, SessionId, SessionState};
