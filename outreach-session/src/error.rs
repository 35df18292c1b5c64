//! Error types for the outreach-session crate.

use std::io;

use outreach_common::SessionState;
use thiserror::Error;

/// Failures reported by a [`MailTransport`](crate::MailTransport)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The identity is no longer authenticated (expired, logged out elsewhere)
    #[error("Session is no longer valid: {0}")]
    SessionInvalid(String),

    /// This message could not be delivered, the session itself is fine
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// An interactive login did not produce a session
    #[error("Login failed: {0}")]
    Login(String),

    /// A session artifact could not be restored
    #[error("Invalid session artifact: {0}")]
    InvalidArtifact(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// An operation that needs a live session was attempted without one
    #[error("No mail session is connected (session is {0})")]
    NotConnected(SessionState),

    #[error("Session is no longer valid: {0}")]
    SessionInvalid(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid session artifact: {0}")]
    InvalidArtifact(String),

    #[error("Session artifact I/O error: {0}")]
    Io(#[from] io::Error),

    /// The worker task has stopped
    #[error("Session manager is not running")]
    WorkerGone,
}

impl SessionError {
    /// The session cannot be used until someone connects again
    #[must_use]
    pub const fn is_session_invalid(&self) -> bool {
        matches!(self, Self::SessionInvalid(_) | Self::NotConnected(_))
    }

    /// Only the message at hand failed
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::SessionInvalid(msg) => Self::SessionInvalid(msg),
            TransportError::Delivery(msg) | TransportError::Login(msg) => Self::Transport(msg),
            TransportError::InvalidArtifact(msg) => Self::InvalidArtifact(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let invalid: SessionError = TransportError::SessionInvalid("expired".into()).into();
        assert!(invalid.is_session_invalid());
        assert!(!invalid.is_transport());

        let delivery: SessionError = TransportError::Delivery("timeout".into()).into();
        assert!(delivery.is_transport());
        assert!(!delivery.is_session_invalid());

        assert!(SessionError::NotConnected(SessionState::Connecting).is_session_invalid());
        assert!(!SessionError::WorkerGone.is_session_invalid());
    }
}
