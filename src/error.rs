//! Error taxonomy for the relay
//!
//! Per-connection failures never escape the connection that produced them:
//! `Transport` errors become that connection's disconnect and `Unauthorized`
//! rejects a single handshake.

use crate::auth::AuthError;
use crate::relay::ConnectionState;

/// Result type for binaries and server setup
pub type ServerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Relay-level errors
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("registry invariant violated for user {0}")]
    RegistryInvariantViolation(String),

    #[error("invalid connection transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}

/// Failure to hand a frame to one connection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("outbound buffer full")]
    BufferOverflow,

    #[error("send timed out")]
    SendTimeout,

    #[error("socket error: {0}")]
    Socket(String),
}
