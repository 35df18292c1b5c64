//! Errors raised by the domain model itself.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    /// The requested input has no edge out of the current state.
    #[error("Cannot {event} a {entity} that is {from}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        event: String,
    },

    /// The record is not in a shape that allows the requested operation.
    #[error("Validation failed: {0}")]
    Validation(String),
}

impl ModelError {
    pub(crate) fn transition(
        entity: &'static str,
        from: impl std::fmt::Display,
        event: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.to_string(),
            event: event.to_string(),
        }
    }
}
