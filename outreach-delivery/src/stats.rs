use chrono::{DateTime, Utc};
use outreach_common::{CampaignStatus, JobStatus};
use outreach_store::{CampaignStore, JobFilter};
use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Counters shown on the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_campaigns: usize,
    pub active_campaigns: usize,
    pub draft_campaigns: usize,
    pub total_contacts: usize,
    /// Jobs sent on the current UTC calendar day
    pub emails_sent_today: usize,
    pub emails_scheduled: usize,
    pub emails_failed: usize,
    pub total_emails_sent: usize,
}

impl DashboardStats {
    /// Compute the counters as of `now`
    ///
    /// # Errors
    ///
    /// Fails only if the store does.
    pub async fn collect(store: &dyn CampaignStore, now: DateTime<Utc>) -> Result<Self, EngineError> {
        let campaigns = store.list_campaigns().await?;
        let contacts = store.list_contacts().await?;
        let jobs = store.list_jobs(&JobFilter::default()).await?;

        let count_campaigns =
            |status: CampaignStatus| campaigns.iter().filter(|c| c.status == status).count();
        let count_jobs = |status: JobStatus| jobs.iter().filter(|j| j.status == status).count();
        let today = now.date_naive();

        Ok(Self {
            total_campaigns: campaigns.len(),
            active_campaigns: count_campaigns(CampaignStatus::Active),
            draft_campaigns: count_campaigns(CampaignStatus::Draft),
            total_contacts: contacts.len(),
            emails_sent_today: jobs
                .iter()
                .filter(|j| j.status == JobStatus::Sent)
                .filter(|j| j.sent_at.is_some_and(|at| at.date_naive() == today))
                .count(),
            emails_scheduled: count_jobs(JobStatus::Scheduled),
            emails_failed: count_jobs(JobStatus::Failed),
            total_emails_sent: count_jobs(JobStatus::Sent),
        })
    }
}
