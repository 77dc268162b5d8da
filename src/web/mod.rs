//! Web module for chatrelay.
//!
//! This module hosts the WebSocket gateway that attaches browser clients to
//! the chat router, plus a liveness endpoint.

pub mod error;
pub mod router;
pub mod server;
pub mod ws;

pub use error::ApiError;
pub use router::{create_app, create_health_router, create_router};
pub use server::WebServer;
pub use ws::ChatWsState;
