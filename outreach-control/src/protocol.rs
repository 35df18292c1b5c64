//! Control protocol types and serialization

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use outreach_common::{
    Campaign, CampaignId, Contact, ContactId, EmailJob, EmailTemplate, JobId, JobStatus,
    MailSession, SessionState,
};
use outreach_delivery::{DashboardStats, ErrorKind, PastDuePolicy, TickReport};
use serde::{Deserialize, Serialize};

/// Current protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Format a timestamp for display
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Request sent to the control server (versioned wrapper)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub version: u32,
    pub command: RequestCommand,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestCommand {
    Campaign(CampaignCommand),
    Contact(ContactCommand),
    Job(JobCommand),
    Session(SessionCommand),
    System(SystemCommand),
}

/// Campaign lifecycle and enrollment commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CampaignCommand {
    /// Create a draft campaign
    Create {
        name: String,
        templates: Vec<EmailTemplate>,
    },
    List,
    /// Campaign with its enrolled contacts and jobs
    Show { id: CampaignId },
    Launch { id: CampaignId },
    Pause { id: CampaignId },
    Resume { id: CampaignId },
    /// Delete a campaign along with its enrollments and jobs
    Delete { id: CampaignId },
    Enroll {
        campaign: CampaignId,
        contact: ContactId,
    },
    /// Remove an enrollment and the contact's unsent jobs
    Unenroll {
        campaign: CampaignId,
        contact: ContactId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ContactCommand {
    Add(Contact),
    List,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobCommand {
    List {
        campaign: Option<CampaignId>,
        status: Option<JobStatus>,
    },
    /// Reschedule a failed or skipped job for now
    Retry { id: JobId },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionCommand {
    Status,
    /// Start an interactive login without waiting for it
    Connect,
    /// Restore a captured session or a browser cookie export
    Import { artifact: String },
    Disconnect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SystemCommand {
    /// Health check
    Ping,
    Status,
    /// Dashboard counters
    Stats,
    /// Run one dispatcher tick now
    Tick,
}

/// Response from the control server (versioned wrapper)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub version: u32,
    pub payload: ResponsePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponsePayload {
    /// Command succeeded
    Ok,
    /// Command succeeded with data
    Data(Box<ResponseData>),
    /// Command failed
    Error { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponseData {
    Campaign(Campaign),
    Campaigns(Vec<Campaign>),
    CampaignDetails(CampaignDetails),
    Contact(Contact),
    Contacts(Vec<Contact>),
    Job(EmailJob),
    Jobs(Vec<EmailJob>),
    Session(SessionStatus),
    Stats(DashboardStats),
    Tick(TickReport),
    SystemStatus(SystemStatus),
    /// Simple string message
    Message(String),
}

/// A campaign with everything attached to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignDetails {
    pub campaign: Campaign,
    pub enrolled: Vec<Contact>,
    pub jobs: Vec<EmailJob>,
}

impl Display for CampaignDetails {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let campaign = &self.campaign;
        f.write_fmt(format_args!("ID:        {}\n", campaign.id))?;
        f.write_fmt(format_args!("Name:      {}\n", campaign.name))?;
        f.write_fmt(format_args!("Status:    {}\n", campaign.status))?;
        f.write_fmt(format_args!(
            "Created:   {}\n",
            format_timestamp(campaign.created_at)
        ))?;
        if let Some(launched_at) = campaign.launched_at {
            f.write_fmt(format_args!("Launched:  {}\n", format_timestamp(launched_at)))?;
        }

        f.write_str("\n--- Steps ---\n")?;
        let mut steps: Vec<_> = campaign.templates.iter().collect();
        steps.sort_by_key(|t| t.step_number);
        for step in steps {
            let when = match (step.scheduled_at, step.offset_days) {
                (Some(at), _) => format_timestamp(at),
                (None, Some(days)) => format!("+{days} days"),
                (None, None) => "unscheduled".to_string(),
            };
            f.write_fmt(format_args!("{:>3}. {} ({when})\n", step.step_number, step.subject))?;
        }

        f.write_fmt(format_args!("\n--- Enrolled ({}) ---\n", self.enrolled.len()))?;
        for contact in &self.enrolled {
            f.write_fmt(format_args!("{} <{}> [{}]\n", contact.name, contact.email, contact.id))?;
        }

        f.write_fmt(format_args!("\n--- Jobs ({}) ---\n", self.jobs.len()))?;
        for job in &self.jobs {
            f.write_fmt(format_args!(
                "{} step {} to {}: {} at {}\n",
                job.id,
                job.step_number,
                job.recipient,
                job.status,
                format_timestamp(job.scheduled_at)
            ))?;
        }

        Ok(())
    }
}

/// The mail session with a human readable summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session: MailSession,
    pub message: String,
}

impl From<MailSession> for SessionStatus {
    fn from(session: MailSession) -> Self {
        Self {
            message: session.message(),
            session,
        }
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("State:     {}\n", self.session.state))?;
        if let Some(identity) = &self.session.identity {
            f.write_fmt(format_args!("Identity:  {identity}\n"))?;
        }
        if let Some(established_at) = self.session.established_at {
            f.write_fmt(format_args!(
                "Since:     {}\n",
                format_timestamp(established_at)
            ))?;
        }
        f.write_fmt(format_args!("{}\n", self.message))
    }
}

/// System status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Server version
    pub version: String,
    pub uptime_secs: u64,
    pub tick_interval_secs: u64,
    pub past_due: PastDuePolicy,
    pub session: SessionState,
    pub last_tick: Option<TickReport>,
}

impl Display for SystemStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Version:   {}\n", self.version))?;
        f.write_fmt(format_args!("Uptime:    {}s\n", self.uptime_secs))?;
        f.write_fmt(format_args!("Tick:      every {}s\n", self.tick_interval_secs))?;
        f.write_fmt(format_args!("Past due:  {}\n", self.past_due))?;
        f.write_fmt(format_args!("Session:   {}\n", self.session))?;
        match &self.last_tick {
            Some(report) => {
                let at = report
                    .started_at
                    .map_or_else(|| "unknown".to_string(), format_timestamp);
                f.write_fmt(format_args!("Last tick: {at}: {report}\n"))
            }
            None => f.write_str("Last tick: never\n"),
        }
    }
}

impl Request {
    /// Create a new request with the current protocol version
    #[must_use]
    pub const fn new(command: RequestCommand) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            command,
        }
    }

    #[must_use]
    pub const fn is_version_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

impl Response {
    #[must_use]
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Error {
                kind,
                message: message.into(),
            },
        }
    }

    /// Create a success response with no data
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Ok,
        }
    }

    #[must_use]
    pub fn data(data: ResponseData) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Data(Box::new(data)),
        }
    }

    /// Check if the response indicates success (not an error)
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self.payload, ResponsePayload::Error { .. })
    }

    #[must_use]
    pub const fn is_version_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}
