//! Campaign lifecycle operations
//!
//! [`CampaignService`] is the only writer of campaign status. Every lifecycle
//! change (launch, pause, resume, reopen on retry, completion) runs under one
//! lock so that the dispatcher's completion sweep and user actions never
//! overwrite each other's status.
//!
//! Removing jobs (unenroll, delete) also waits for any send in flight, so a
//! message that went out always keeps its job record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use outreach_common::{
    Campaign, CampaignEvent, CampaignId, CampaignStatus, Contact, ContactId, EmailJob,
    EmailTemplate, Enrollment, JobId, audit, internal,
};
use outreach_store::{CampaignStore, JobFilter};
use tokio::sync::{Mutex, MutexGuard};

use crate::{EngineError, materializer};

#[derive(Debug)]
pub struct CampaignService {
    store: Arc<dyn CampaignStore>,
    lifecycle: Mutex<()>,
    /// Held by the dispatcher from the re-read of a job until its outcome is stored
    sending: Mutex<()>,
}

fn record_transition(campaign: &Campaign, event: CampaignEvent) {
    internal!(
        level = INFO,
        "Campaign {} ({}) {event} -> {}",
        campaign.id,
        campaign.name,
        campaign.status
    );
    audit::log_campaign_transition(
        &campaign.id.to_string(),
        &event.to_string(),
        &campaign.status.to_string(),
    );
}

impl CampaignService {
    #[must_use]
    pub fn new(store: Arc<dyn CampaignStore>) -> Self {
        Self {
            store,
            lifecycle: Mutex::new(()),
            sending: Mutex::new(()),
        }
    }

    /// Keep unenroll and delete from removing jobs while one is being sent
    pub(crate) async fn hold_sending(&self) -> MutexGuard<'_, ()> {
        self.sending.lock().await
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn CampaignStore> {
        &self.store
    }

    /// Create a draft campaign. Steps are only validated at launch.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for a blank name.
    pub async fn create_campaign(
        &self,
        name: &str,
        templates: Vec<EmailTemplate>,
    ) -> Result<Campaign, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation(
                "Campaign name must not be empty".to_string(),
            ));
        }

        let campaign = Campaign::new(name, templates);
        self.store.insert_campaign(&campaign).await?;
        internal!(level = INFO, "Created campaign {} ({})", campaign.id, campaign.name);

        Ok(campaign)
    }

    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for a blank name or an email
    /// address without an `@`.
    pub async fn add_contact(&self, mut contact: Contact) -> Result<Contact, EngineError> {
        contact.name = contact.name.trim().to_string();
        contact.email = contact.email.trim().to_string();

        if contact.name.is_empty() {
            return Err(EngineError::Validation(
                "Contact name must not be empty".to_string(),
            ));
        }
        if !contact.email.contains('@') {
            return Err(EngineError::Validation(format!(
                "'{}' is not an email address",
                contact.email
            )));
        }

        self.store.insert_contact(&contact).await?;
        Ok(contact)
    }

    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if the campaign does not exist.
    pub async fn campaign(&self, id: &CampaignId) -> Result<Campaign, EngineError> {
        Ok(self.store.campaign(id).await?)
    }

    /// # Errors
    ///
    /// Fails only if the store does.
    pub async fn campaigns(&self) -> Result<Vec<Campaign>, EngineError> {
        Ok(self.store.list_campaigns().await?)
    }

    /// # Errors
    ///
    /// Fails only if the store does.
    pub async fn contacts(&self) -> Result<Vec<Contact>, EngineError> {
        Ok(self.store.list_contacts().await?)
    }

    /// Enrolled contacts of a campaign, in enrollment order
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if the campaign or an enrolled contact
    /// does not exist.
    pub async fn enrolled(
        &self,
        campaign: &CampaignId,
    ) -> Result<Vec<(Enrollment, Contact)>, EngineError> {
        let enrollments = self.store.enrollments(campaign).await?;
        let mut enrolled = Vec::with_capacity(enrollments.len());
        for enrollment in enrollments {
            let contact = self.store.contact(&enrollment.contact_id).await?;
            enrolled.push((enrollment, contact));
        }
        Ok(enrolled)
    }

    /// # Errors
    ///
    /// Fails only if the store does.
    pub async fn jobs(&self, filter: &JobFilter) -> Result<Vec<EmailJob>, EngineError> {
        Ok(self.store.list_jobs(filter).await?)
    }

    /// Materialize and insert whatever jobs `campaign` is missing
    async fn fill_jobs(
        &self,
        campaign: &Campaign,
        enrolled: &[(Enrollment, Contact)],
        now: DateTime<Utc>,
    ) -> Result<Vec<EmailJob>, EngineError> {
        let existing = self.store.list_jobs(&JobFilter::campaign(campaign.id)).await?;
        let jobs = materializer::materialize(campaign, enrolled, &existing, now);
        if jobs.is_empty() {
            return Ok(jobs);
        }

        let inserted = self.store.insert_jobs(jobs).await?;
        internal!(
            level = DEBUG,
            "Materialized {} jobs for campaign {}",
            inserted.len(),
            campaign.id
        );
        Ok(inserted)
    }

    /// Launch a draft campaign and materialize a job for every enrolled
    /// contact and step
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidStateTransition`] unless the campaign is a draft
    /// - [`EngineError::Validation`] if a step cannot be scheduled or nobody is
    ///   enrolled
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn launch(&self, id: &CampaignId, now: DateTime<Utc>) -> Result<Campaign, EngineError> {
        let _guard = self.lifecycle.lock().await;
        let mut campaign = self.store.campaign(id).await?;

        campaign.apply(CampaignEvent::Launch, now)?;
        campaign.validate_steps()?;

        let enrolled = self.enrolled(id).await?;
        if enrolled.is_empty() {
            return Err(EngineError::Validation(format!(
                "Campaign '{}' has no enrolled contacts",
                campaign.name
            )));
        }

        // Jobs go in before the status flips, so the dispatcher never sees an
        // active campaign with half of its jobs
        self.fill_jobs(&campaign, &enrolled, now).await?;
        self.store.update_campaign(&campaign).await?;
        record_transition(&campaign, CampaignEvent::Launch);

        Ok(campaign)
    }

    /// # Errors
    ///
    /// Returns [`EngineError::InvalidStateTransition`] unless the campaign is active.
    pub async fn pause(&self, id: &CampaignId, now: DateTime<Utc>) -> Result<Campaign, EngineError> {
        let _guard = self.lifecycle.lock().await;
        let mut campaign = self.store.campaign(id).await?;

        campaign.apply(CampaignEvent::Pause, now)?;
        self.store.update_campaign(&campaign).await?;
        record_transition(&campaign, CampaignEvent::Pause);

        Ok(campaign)
    }

    /// Resume a paused campaign, materializing jobs for contacts enrolled
    /// while it was paused
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidStateTransition`] unless the campaign is paused.
    pub async fn resume(&self, id: &CampaignId, now: DateTime<Utc>) -> Result<Campaign, EngineError> {
        let _guard = self.lifecycle.lock().await;
        let mut campaign = self.store.campaign(id).await?;

        campaign.apply(CampaignEvent::Resume, now)?;
        let enrolled = self.enrolled(id).await?;
        self.fill_jobs(&campaign, &enrolled, now).await?;
        self.store.update_campaign(&campaign).await?;
        record_transition(&campaign, CampaignEvent::Resume);

        Ok(campaign)
    }

    /// Delete a campaign with its enrollments and jobs, whatever its status
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if the campaign does not exist.
    pub async fn delete(&self, id: &CampaignId) -> Result<(), EngineError> {
        let _guard = self.lifecycle.lock().await;
        let _sending = self.sending.lock().await;
        self.store.delete_campaign(id).await?;
        internal!(level = INFO, "Deleted campaign {id}");
        audit::log_campaign_transition(&id.to_string(), "delete", "deleted");
        Ok(())
    }

    /// Enroll a contact. Jobs are created right away for an active campaign,
    /// at launch for a draft and at resume for a paused one.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidStateTransition`] for a completed campaign
    /// - [`EngineError::Conflict`] if the contact, or another contact with the
    ///   same email, is already enrolled
    /// - [`EngineError::NotFound`] if either record does not exist
    pub async fn enroll(
        &self,
        campaign_id: &CampaignId,
        contact_id: &ContactId,
        now: DateTime<Utc>,
    ) -> Result<Vec<EmailJob>, EngineError> {
        let _guard = self.lifecycle.lock().await;
        let campaign = self.store.campaign(campaign_id).await?;
        if campaign.status == CampaignStatus::Completed {
            return Err(EngineError::InvalidStateTransition(format!(
                "Cannot enroll contacts into campaign '{}' because it is completed",
                campaign.name
            )));
        }

        let enrollment = Enrollment {
            campaign_id: *campaign_id,
            contact_id: *contact_id,
            enrolled_at: now,
        };
        self.store.enroll(enrollment).await?;

        if campaign.status != CampaignStatus::Active {
            return Ok(Vec::new());
        }

        let contact = self.store.contact(contact_id).await?;
        self.fill_jobs(&campaign, &[(enrollment, contact)], now)
            .await
    }

    /// Remove a contact from a campaign along with its unsent jobs.
    /// Sent jobs stay as history. Returns the number of jobs removed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if the contact is not enrolled.
    pub async fn unenroll(
        &self,
        campaign_id: &CampaignId,
        contact_id: &ContactId,
    ) -> Result<usize, EngineError> {
        let _guard = self.lifecycle.lock().await;
        let _sending = self.sending.lock().await;
        let removed = self.store.unenroll(campaign_id, contact_id).await?;
        internal!(
            level = INFO,
            "Unenrolled contact {contact_id} from campaign {campaign_id}, removed {removed} unsent jobs"
        );
        Ok(removed)
    }

    /// Put a failed or skipped job back on the schedule at `now`, reopening
    /// its campaign if it had completed
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if the job does not exist
    /// - [`EngineError::InvalidStateTransition`] unless the job is failed or skipped
    pub async fn retry(&self, id: &JobId, now: DateTime<Utc>) -> Result<EmailJob, EngineError> {
        let _guard = self.lifecycle.lock().await;
        let mut job = self.store.job(id).await?;

        job.retry(now)?;
        self.store.update_job(&job).await?;
        audit::log_job_retried(&job.id.to_string(), &job.campaign_id.to_string());

        let mut campaign = self.store.campaign(&job.campaign_id).await?;
        if campaign.status == CampaignStatus::Completed {
            campaign.apply(CampaignEvent::Reopen, now)?;
            self.store.update_campaign(&campaign).await?;
            record_transition(&campaign, CampaignEvent::Reopen);
        }

        Ok(job)
    }

    /// Complete every active or paused campaign whose jobs are all terminal.
    /// Campaigns without any job are left alone. Returns the completed ids.
    ///
    /// # Errors
    ///
    /// Fails only if the store does.
    pub async fn complete_finished(&self, now: DateTime<Utc>) -> Result<Vec<CampaignId>, EngineError> {
        let _guard = self.lifecycle.lock().await;
        let mut completed = Vec::new();

        for mut campaign in self.store.list_campaigns().await? {
            if !matches!(
                campaign.status,
                CampaignStatus::Active | CampaignStatus::Paused
            ) {
                continue;
            }

            let jobs = self.store.list_jobs(&JobFilter::campaign(campaign.id)).await?;
            if jobs.is_empty() || !jobs.iter().all(|job| job.status.is_terminal()) {
                continue;
            }

            campaign.apply(CampaignEvent::Complete, now)?;
            self.store.update_campaign(&campaign).await?;
            record_transition(&campaign, CampaignEvent::Complete);
            completed.push(campaign.id);
        }

        Ok(completed)
    }
}
