//! Typed error handling for engine operations.
//!
//! Errors are grouped by who can act on them:
//! - Caller errors (validation, invalid transitions, unknown records, conflicts)
//! - Delivery errors, split into those affecting one message (`Transport`)
//!   and those affecting the whole session (`SessionInvalid`)
//! - System errors (store or session worker failures)

use outreach_common::ModelError;
use outreach_session::SessionError;
use outreach_store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of an [`EngineError`], stable across the control protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    InvalidStateTransition,
    NotFound,
    Conflict,
    Transport,
    SessionInvalid,
    System,
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The request is malformed, e.g. launching a campaign without contacts
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The record is not in a state that allows the operation
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    /// One message could not be delivered; the session is still usable
    #[error("Transport error: {0}")]
    Transport(String),

    /// The session is no longer authenticated
    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Session error: {0}")]
    Session(SessionError),

    #[error("Not initialized: {0}")]
    NotInitialized(String),
}

impl EngineError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidStateTransition(_) => ErrorKind::InvalidStateTransition,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Transport(_) => ErrorKind::Transport,
            Self::SessionInvalid(_) => ErrorKind::SessionInvalid,
            Self::Store(_) | Self::Session(_) | Self::NotInitialized(_) => ErrorKind::System,
        }
    }

    /// Returns `true` if the error is the caller's to fix
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation
                | ErrorKind::InvalidStateTransition
                | ErrorKind::NotFound
                | ErrorKind::Conflict
        )
    }

    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    #[must_use]
    pub const fn is_session_invalid(&self) -> bool {
        matches!(self, Self::SessionInvalid(_))
    }
}

impl From<ModelError> for EngineError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::InvalidTransition { .. } => Self::InvalidStateTransition(err.to_string()),
            ModelError::Validation(msg) => Self::Validation(msg),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => Self::NotFound { kind, id },
            StoreError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Store(other),
        }
    }
}

impl From<SessionError> for EngineError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Transport(msg) => Self::Transport(msg),
            SessionError::SessionInvalid(msg) => Self::SessionInvalid(msg),
            SessionError::NotConnected(state) => {
                Self::SessionInvalid(format!("No mail session is connected (session is {state})"))
            }
            SessionError::InvalidArtifact(msg) => Self::Validation(msg),
            other => Self::Session(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use outreach_common::SessionState;

    use super::*;

    #[test]
    fn test_store_errors_map_to_caller_errors() {
        let err: EngineError = StoreError::NotFound {
            kind: "Job",
            id: "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Job not found: 01ARZ3NDEKTSV4RRFFQ69G5FAV");
        assert!(err.is_client_error());

        let err: EngineError = StoreError::Internal("disk on fire".into()).into();
        assert_eq!(err.kind(), ErrorKind::System);
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_session_errors_keep_their_class() {
        let transport: EngineError = SessionError::Transport("timeout".into()).into();
        assert!(transport.is_transport());

        let invalid: EngineError = SessionError::NotConnected(SessionState::Disconnected).into();
        assert!(invalid.is_session_invalid());

        let gone: EngineError = SessionError::WorkerGone.into();
        assert_eq!(gone.kind(), ErrorKind::System);
    }

    #[test]
    fn test_model_errors() {
        let err: EngineError = ModelError::Validation("no steps".into()).into();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err: EngineError = ModelError::InvalidTransition {
            entity: "job",
            from: "sent".into(),
            event: "retry".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
        assert_eq!(
            err.to_string(),
            "Invalid state transition: Cannot retry a job that is sent"
        );
    }
}
