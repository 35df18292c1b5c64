pub mod audit;
pub mod campaign;
pub mod contact;
pub mod error;
pub mod id;
pub mod job;
pub mod logging;
pub mod session;
pub mod traits;

pub use tracing;

pub use campaign::{Campaign, CampaignEvent, CampaignStatus, EmailTemplate, SendAnchor};
pub use contact::{Contact, Enrollment};
pub use error::ModelError;
pub use id::{CampaignId, ContactId, JobId};
pub use job::{EmailJob, JobEvent, JobStatus};
pub use session::{MailSession, SessionState};

#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
    Finalised,
}
