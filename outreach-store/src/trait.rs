use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outreach_common::{
    Campaign, CampaignId, Contact, ContactId, EmailJob, Enrollment, JobId, JobStatus,
};

use crate::Result;

/// Selects jobs in [`CampaignStore::list_jobs`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub campaign: Option<CampaignId>,
    pub contact: Option<ContactId>,
    pub status: Option<JobStatus>,
}

impl JobFilter {
    #[must_use]
    pub const fn campaign(id: CampaignId) -> Self {
        Self {
            campaign: Some(id),
            contact: None,
            status: None,
        }
    }

    #[must_use]
    pub const fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub const fn with_contact(mut self, contact: ContactId) -> Self {
        self.contact = Some(contact);
        self
    }

    #[must_use]
    pub fn matches(&self, job: &EmailJob) -> bool {
        self.campaign.is_none_or(|c| c == job.campaign_id)
            && self.contact.is_none_or(|c| c == job.contact_id)
            && self.status.is_none_or(|s| s == job.status)
    }
}

/// Persistence for campaigns, contacts, enrollments and jobs
///
/// Implementations must enforce, atomically with the write that could break
/// them:
/// - at most one enrollment per (campaign, contact), and no two enrolled
///   contacts of a campaign sharing an email address
/// - at most one job per (campaign, contact, step)
/// - jobs only for enrolled contacts
///
/// Listings are returned in a stable order: campaigns and contacts by id, jobs
/// by `scheduled_at` then id.
#[async_trait]
pub trait CampaignStore: Send + Sync + std::fmt::Debug {
    async fn insert_campaign(&self, campaign: &Campaign) -> Result<()>;

    async fn campaign(&self, id: &CampaignId) -> Result<Campaign>;

    async fn update_campaign(&self, campaign: &Campaign) -> Result<()>;

    async fn list_campaigns(&self) -> Result<Vec<Campaign>>;

    /// Delete a campaign together with its enrollments and jobs
    async fn delete_campaign(&self, id: &CampaignId) -> Result<()>;

    async fn insert_contact(&self, contact: &Contact) -> Result<()>;

    async fn contact(&self, id: &ContactId) -> Result<Contact>;

    async fn list_contacts(&self) -> Result<Vec<Contact>>;

    /// Enroll a contact in a campaign
    ///
    /// Fails with `NotFound` if either record is missing and with `Conflict`
    /// if the contact, or another contact with the same email, is already
    /// enrolled.
    async fn enroll(&self, enrollment: Enrollment) -> Result<()>;

    /// Remove an enrollment and every job of that contact in the campaign
    /// that has not been sent. Returns the number of jobs removed.
    async fn unenroll(&self, campaign: &CampaignId, contact: &ContactId) -> Result<usize>;

    async fn enrollments(&self, campaign: &CampaignId) -> Result<Vec<Enrollment>>;

    /// Insert freshly materialized jobs
    ///
    /// Jobs whose (campaign, contact, step) already exists, or whose contact is
    /// no longer enrolled, are dropped. Returns the jobs actually inserted.
    async fn insert_jobs(&self, jobs: Vec<EmailJob>) -> Result<Vec<EmailJob>>;

    async fn job(&self, id: &JobId) -> Result<EmailJob>;

    async fn update_job(&self, job: &EmailJob) -> Result<()>;

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<EmailJob>>;

    /// Scheduled jobs of active campaigns with `scheduled_at <= now`,
    /// earliest first across all campaigns
    async fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<EmailJob>>;
}
