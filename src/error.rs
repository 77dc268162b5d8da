//! Error types for chatrelay.

use thiserror::Error;

/// Common error type for chatrelay.
///
/// Every failure in the routing core is scoped to a single frame or a single
/// connection; none of these variants is fatal to the process.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Durable store error.
    ///
    /// Database errors from sqlx are automatically converted.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required field of an inbound frame was missing or empty.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found (unknown room, unknown peer, unknown user).
    #[error("{0} not found")]
    NotFound(String),

    /// Inbound frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Inbound frame carried a discriminator the protocol does not handle.
    #[error("unhandled frame type: {0}")]
    UnhandledFrame(String),

    /// Requester is not allowed to perform the operation.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for RelayError {
    fn from(e: sqlx::Error) -> Self {
        RelayError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Decode(e.to_string())
    }
}

/// Result type alias for chatrelay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
