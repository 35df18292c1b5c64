//! Mail session management
//!
//! One authenticated identity sends every message. The [`SessionManager`]
//! owns that identity and its [`MailTransport`] inside a single worker task;
//! all callers talk to the worker through a command channel, so at most one
//! login transition, send or disconnect is in progress at any instant.

pub mod artifact;
pub mod config;
pub mod error;
pub mod manager;
pub mod transport;
pub mod transports;

pub use artifact::{SessionArtifact, StorageState};
pub use config::{SessionConfig, TransportConfig};
pub use error::{SessionError, TransportError};
pub use manager::SessionManager;
pub use transport::{LoginOutcome, MailTransport, OutboundMessage};
pub use transports::{OutboxTransport, TestTransport};
