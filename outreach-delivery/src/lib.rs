//! Campaign scheduling and delivery
//!
//! This crate provides functionality to:
//! - Expand launched campaigns into per-contact, per-step email jobs
//! - Drive campaigns through their lifecycle (launch, pause, resume, retry)
//! - Dispatch due jobs one at a time through the mail session
//! - Summarise campaign and delivery state

mod campaign;
mod error;
pub mod materializer;
mod processor;
mod service;
mod stats;
pub mod tokens;

pub use campaign::CampaignService;
pub use error::{EngineError, ErrorKind};
pub use processor::{Dispatcher, PastDuePolicy, TickReport};
pub use service::DispatchService;
pub use stats::DashboardStats;
