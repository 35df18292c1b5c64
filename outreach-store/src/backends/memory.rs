use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outreach_common::{
    Campaign, CampaignId, CampaignStatus, Contact, ContactId, EmailJob, Enrollment, JobId,
    JobStatus,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    StoreError,
    r#trait::{CampaignStore, JobFilter},
};

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Tables {
    campaigns: BTreeMap<CampaignId, Campaign>,
    contacts: BTreeMap<ContactId, Contact>,
    enrollments: BTreeMap<CampaignId, Vec<Enrollment>>,
    jobs: BTreeMap<JobId, EmailJob>,
}

impl Tables {
    fn is_enrolled(&self, campaign: &CampaignId, contact: &ContactId) -> bool {
        self.enrollments
            .get(campaign)
            .is_some_and(|list| list.iter().any(|e| e.contact_id == *contact))
    }

    fn has_job(&self, campaign: &CampaignId, contact: &ContactId, step: u32) -> bool {
        self.jobs.values().any(|job| {
            job.campaign_id == *campaign && job.contact_id == *contact && job.step_number == step
        })
    }

    fn sorted_jobs<'a>(jobs: impl Iterator<Item = &'a EmailJob>) -> Vec<EmailJob> {
        let mut jobs: Vec<_> = jobs.cloned().collect();
        jobs.sort_by(|a, b| {
            a.scheduled_at
                .cmp(&b.scheduled_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        jobs
    }
}

/// On-disk copy of the tables, rewritten after every mutation
#[derive(Debug)]
struct Snapshot {
    path: PathBuf,
    generation: AtomicU64,
    written: tokio::sync::Mutex<u64>,
}

impl Snapshot {
    fn prepare(&self, tables: &Tables) -> crate::Result<(u64, Vec<u8>)> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let bytes = bincode::serde::encode_to_vec(tables, bincode::config::legacy())?;
        Ok((generation, bytes))
    }

    async fn write(&self, generation: u64, bytes: Vec<u8>) -> crate::Result<()> {
        let mut written = self.written.lock().await;
        // A later mutation already reached the disk
        if *written >= generation {
            return Ok(());
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        *written = generation;

        Ok(())
    }
}

/// In-memory store
///
/// All tables live behind one lock, so every constraint check happens in the
/// same critical section as the write it guards. Optionally mirrors itself to
/// a bincode snapshot file that is loaded again by [`MemoryStore::open`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    snapshot: Option<Arc<Snapshot>>,
}

impl MemoryStore {
    /// Create a new, empty, purely in-memory store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store mirrored to `path`, loading the existing snapshot if there is one
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot exists but cannot be read or decoded
    pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();

        let tables = if path.exists() {
            let bytes = std::fs::read(&path)?;
            let (tables, _): (Tables, usize) =
                bincode::serde::decode_from_slice(&bytes, bincode::config::legacy())?;
            tracing::info!(
                "Loaded store snapshot from {} ({} campaigns, {} jobs)",
                path.display(),
                tables.campaigns.len(),
                tables.jobs.len()
            );
            tables
        } else {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            Tables::default()
        };

        Ok(Self {
            tables: Arc::new(RwLock::new(tables)),
            snapshot: Some(Arc::new(Snapshot {
                path,
                generation: AtomicU64::new(0),
                written: tokio::sync::Mutex::new(0),
            })),
        })
    }

    /// Number of jobs currently stored
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.tables.read().jobs.len()
    }

    async fn mutate<T, F>(&self, f: F) -> crate::Result<T>
    where
        F: FnOnce(&mut Tables) -> crate::Result<T> + Send,
        T: Send,
    {
        let (value, pending) = {
            let mut tables = self.tables.write();
            let value = f(&mut tables)?;
            let pending = match &self.snapshot {
                Some(snapshot) => Some(snapshot.prepare(&tables)?),
                None => None,
            };
            (value, pending)
        };

        if let (Some(snapshot), Some((generation, bytes))) = (&self.snapshot, pending) {
            snapshot.write(generation, bytes).await?;
        }

        Ok(value)
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn insert_campaign(&self, campaign: &Campaign) -> crate::Result<()> {
        let campaign = campaign.clone();
        self.mutate(move |tables| {
            if tables.campaigns.contains_key(&campaign.id) {
                return Err(StoreError::Conflict(format!(
                    "Campaign {} already exists",
                    campaign.id
                )));
            }
            tables.campaigns.insert(campaign.id, campaign);
            Ok(())
        })
        .await
    }

    async fn campaign(&self, id: &CampaignId) -> crate::Result<Campaign> {
        self.tables
            .read()
            .campaigns
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Campaign", id))
    }

    async fn update_campaign(&self, campaign: &Campaign) -> crate::Result<()> {
        let campaign = campaign.clone();
        self.mutate(move |tables| {
            let slot = tables
                .campaigns
                .get_mut(&campaign.id)
                .ok_or_else(|| StoreError::not_found("Campaign", campaign.id))?;
            *slot = campaign;
            Ok(())
        })
        .await
    }

    async fn list_campaigns(&self) -> crate::Result<Vec<Campaign>> {
        Ok(self.tables.read().campaigns.values().cloned().collect())
    }

    async fn delete_campaign(&self, id: &CampaignId) -> crate::Result<()> {
        let id = *id;
        self.mutate(move |tables| {
            tables
                .campaigns
                .remove(&id)
                .ok_or_else(|| StoreError::not_found("Campaign", id))?;
            tables.enrollments.remove(&id);
            tables.jobs.retain(|_, job| job.campaign_id != id);
            Ok(())
        })
        .await
    }

    async fn insert_contact(&self, contact: &Contact) -> crate::Result<()> {
        let contact = contact.clone();
        self.mutate(move |tables| {
            if tables.contacts.contains_key(&contact.id) {
                return Err(StoreError::Conflict(format!(
                    "Contact {} already exists",
                    contact.id
                )));
            }
            tables.contacts.insert(contact.id, contact);
            Ok(())
        })
        .await
    }

    async fn contact(&self, id: &ContactId) -> crate::Result<Contact> {
        self.tables
            .read()
            .contacts
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Contact", id))
    }

    async fn list_contacts(&self) -> crate::Result<Vec<Contact>> {
        Ok(self.tables.read().contacts.values().cloned().collect())
    }

    async fn enroll(&self, enrollment: Enrollment) -> crate::Result<()> {
        self.mutate(move |tables| {
            if !tables.campaigns.contains_key(&enrollment.campaign_id) {
                return Err(StoreError::not_found("Campaign", enrollment.campaign_id));
            }
            let contact = tables
                .contacts
                .get(&enrollment.contact_id)
                .ok_or_else(|| StoreError::not_found("Contact", enrollment.contact_id))?;
            let email = contact.email.to_ascii_lowercase();

            let existing = tables.enrollments.get(&enrollment.campaign_id);
            for other in existing.into_iter().flatten() {
                if other.contact_id == enrollment.contact_id {
                    return Err(StoreError::Conflict(format!(
                        "Contact {} is already enrolled in campaign {}",
                        enrollment.contact_id, enrollment.campaign_id
                    )));
                }

                let same_email = tables
                    .contacts
                    .get(&other.contact_id)
                    .is_some_and(|c| c.email.to_ascii_lowercase() == email);
                if same_email {
                    return Err(StoreError::Conflict(format!(
                        "Another contact with email {email} is already enrolled in campaign {}",
                        enrollment.campaign_id
                    )));
                }
            }

            tables
                .enrollments
                .entry(enrollment.campaign_id)
                .or_default()
                .push(enrollment);
            Ok(())
        })
        .await
    }

    async fn unenroll(&self, campaign: &CampaignId, contact: &ContactId) -> crate::Result<usize> {
        let (campaign, contact) = (*campaign, *contact);
        self.mutate(move |tables| {
            let list = tables
                .enrollments
                .get_mut(&campaign)
                .ok_or_else(|| StoreError::not_found("Enrollment", contact))?;
            let before = list.len();
            list.retain(|e| e.contact_id != contact);
            if list.len() == before {
                return Err(StoreError::not_found("Enrollment", contact));
            }

            let jobs_before = tables.jobs.len();
            tables.jobs.retain(|_, job| {
                job.campaign_id != campaign
                    || job.contact_id != contact
                    || job.status == JobStatus::Sent
            });
            Ok(jobs_before - tables.jobs.len())
        })
        .await
    }

    async fn enrollments(&self, campaign: &CampaignId) -> crate::Result<Vec<Enrollment>> {
        let tables = self.tables.read();
        if !tables.campaigns.contains_key(campaign) {
            return Err(StoreError::not_found("Campaign", campaign));
        }
        Ok(tables.enrollments.get(campaign).cloned().unwrap_or_default())
    }

    async fn insert_jobs(&self, jobs: Vec<EmailJob>) -> crate::Result<Vec<EmailJob>> {
        self.mutate(move |tables| {
            let mut inserted = Vec::with_capacity(jobs.len());
            for job in jobs {
                if !tables.is_enrolled(&job.campaign_id, &job.contact_id)
                    || tables.has_job(&job.campaign_id, &job.contact_id, job.step_number)
                {
                    continue;
                }
                tables.jobs.insert(job.id, job.clone());
                inserted.push(job);
            }
            Ok(inserted)
        })
        .await
    }

    async fn job(&self, id: &JobId) -> crate::Result<EmailJob> {
        self.tables
            .read()
            .jobs
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Job", id))
    }

    async fn update_job(&self, job: &EmailJob) -> crate::Result<()> {
        let job = job.clone();
        self.mutate(move |tables| {
            let slot = tables
                .jobs
                .get_mut(&job.id)
                .ok_or_else(|| StoreError::not_found("Job", job.id))?;
            *slot = job;
            Ok(())
        })
        .await
    }

    async fn list_jobs(&self, filter: &JobFilter) -> crate::Result<Vec<EmailJob>> {
        let tables = self.tables.read();
        Ok(Tables::sorted_jobs(
            tables.jobs.values().filter(|job| filter.matches(job)),
        ))
    }

    async fn due_jobs(&self, now: DateTime<Utc>) -> crate::Result<Vec<EmailJob>> {
        let tables = self.tables.read();
        Ok(Tables::sorted_jobs(tables.jobs.values().filter(|job| {
            job.status == JobStatus::Scheduled
                && job.scheduled_at <= now
                && tables
                    .campaigns
                    .get(&job.campaign_id)
                    .is_some_and(|c| c.status == CampaignStatus::Active)
        })))
    }
}
