use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{artifact::SessionArtifact, error::TransportError};

/// One message, as handed to the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Caller supplied reference, e.g. the job id
    pub reference: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Result of a successful interactive login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub identity: String,
    /// Captured session, persisted so it can be restored later
    pub artifact: SessionArtifact,
}

/// A session-authenticated way of sending mail
///
/// Implementations are driven exclusively by the session manager's worker and
/// are never called concurrently, except that a long running `login` may be
/// aborted by dropping its future.
#[async_trait]
pub trait MailTransport: Send + Sync + std::fmt::Debug {
    /// Run an interactive login. This may wait minutes for a human.
    async fn login(&self) -> Result<LoginOutcome, TransportError>;

    /// Restore a previously captured session, returning the identity it belongs to
    async fn restore(&self, artifact: &SessionArtifact) -> Result<String, TransportError>;

    /// Send one message as the current identity
    ///
    /// Must return [`TransportError::SessionInvalid`] when the identity is no
    /// longer authenticated, and [`TransportError::Delivery`] for anything
    /// that only affects this message.
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError>;

    /// Drop the current session
    async fn close(&self) -> Result<(), TransportError>;
}
