//! Error types for the outreach-store crate.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The record would violate a uniqueness constraint.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Reading or writing the on-disk snapshot failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Snapshot encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Snapshot decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub(crate) fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
