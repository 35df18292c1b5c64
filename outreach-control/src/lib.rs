//! Control protocol for managing a running outreach engine
//!
//! This crate provides an IPC mechanism over a Unix domain socket to:
//! - Create, launch, pause, resume and delete campaigns
//! - Manage contacts and enrollments
//! - Inspect and retry email jobs
//! - Connect, import and disconnect the mail session
//! - Query engine status and run a dispatcher tick on demand
//!
//! Messages are bincode encoded and framed with a 4-byte big-endian length.

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::ControlClient;
pub use error::{ControlError, Result};
pub use protocol::{
    CampaignCommand, ContactCommand, JobCommand, PROTOCOL_VERSION, Request, RequestCommand,
    Response, ResponseData, ResponsePayload, SessionCommand, SystemCommand,
};
pub use server::{CommandHandler, ControlServer};

/// Default path for the control socket
pub const DEFAULT_CONTROL_SOCKET: &str = "/tmp/outreach.sock";
