//! Error types for control operations

use outreach_delivery::ErrorKind;
use thiserror::Error;

/// Errors that can occur during control operations
#[derive(Debug, Error)]
pub enum ControlError {
    /// I/O error communicating with the control socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    ProtocolDeserialization(#[from] bincode::error::DecodeError),

    #[error("Protocol error: {0}")]
    ProtocolSerialization(#[from] bincode::error::EncodeError),

    /// Client and server speak different protocol versions
    #[error("Incompatible protocol version: expected {expected}, got {actual}")]
    IncompatibleVersion { expected: u32, actual: u32 },

    /// The server processed the request and rejected it
    #[error("{message}")]
    ServerError { kind: ErrorKind, message: String },

    /// Connection closed unexpectedly
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Request timeout")]
    Timeout,

    /// Control socket path is invalid
    #[error("Invalid socket path: {0}")]
    InvalidSocketPath(String),
}

impl ControlError {
    /// Classification of a server-side rejection, if this is one
    #[must_use]
    pub const fn server_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::ServerError { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Result type for control operations
pub type Result<T> = std::result::Result<T, ControlError>;
