//! Shared fixtures for the dispatcher scenarios

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeZone, Utc};
use outreach_common::{Campaign, Contact, EmailJob, EmailTemplate, JobStatus, MailSession};
use outreach_delivery::{CampaignService, Dispatcher, EngineError, PastDuePolicy, TickReport};
use outreach_session::{SessionConfig, SessionManager, TestTransport, TransportConfig};
use outreach_store::{JobFilter, TestStore};

/// The instant every scenario treats as "now"
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 10, 9, 0, 0).unwrap()
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    now() - chrono::Duration::days(days)
}

/// Three steps, all due before [`now`]
pub fn past_steps() -> Vec<EmailTemplate> {
    vec![
        EmailTemplate::new(1, "Hello {{first_name}}", "Hi from {{company}}").at(days_ago(3)),
        EmailTemplate::new(2, "Following up", "Any thoughts?").at(days_ago(2)),
        EmailTemplate::new(3, "Last note", "Closing the loop").at(days_ago(1)),
    ]
}

/// One step, due right away
pub fn single_step() -> Vec<EmailTemplate> {
    vec![EmailTemplate::new(1, "Hello {{first_name}}", "Hi").after_days(0)]
}

/// Three steps counted from enrollment: today, in 3 days and in 6 days
pub fn relative_steps() -> Vec<EmailTemplate> {
    vec![
        EmailTemplate::new(1, "Hello", "First").after_days(0),
        EmailTemplate::new(2, "Again", "Second").after_days(3),
        EmailTemplate::new(3, "Last", "Third").after_days(6),
    ]
}

pub struct Harness {
    pub store: TestStore,
    pub transport: TestTransport,
    pub session: SessionManager,
    pub campaigns: Arc<CampaignService>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(PastDuePolicy::SendImmediately)
    }

    pub fn with_policy(policy: PastDuePolicy) -> Self {
        let store = TestStore::new();
        let transport = TestTransport::new("sender@example.com");
        let session = SessionManager::spawn(
            Arc::new(transport.clone()),
            &SessionConfig {
                connect_timeout_secs: 120,
                artifact_path: None,
                transport: TransportConfig::Test,
            },
        );
        let campaigns = Arc::new(CampaignService::new(Arc::new(store.clone())));

        let mut dispatcher = Dispatcher::default();
        dispatcher.past_due = policy;
        dispatcher.init(campaigns.clone(), session.clone()).unwrap();

        Self {
            store,
            transport,
            session,
            campaigns,
            dispatcher: Arc::new(dispatcher),
        }
    }

    pub async fn connect(&self) {
        self.session.connect().await.unwrap();
        let mut status = self.session.subscribe();
        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(MailSession::is_connected),
        )
        .await
        .expect("session did not connect")
        .expect("session worker stopped");
    }

    /// A campaign with `contacts` enrolled contacts, still in draft
    pub async fn draft(
        &self,
        name: &str,
        steps: Vec<EmailTemplate>,
        contacts: usize,
    ) -> (Campaign, Vec<Contact>) {
        let campaign = self.campaigns.create_campaign(name, steps).await.unwrap();

        let mut enrolled = Vec::with_capacity(contacts);
        for i in 0..contacts {
            let contact = self
                .campaigns
                .add_contact(
                    Contact::new(format!("Person {i}"), format!("{name}-{i}@example.com"))
                        .with_company("Acme"),
                )
                .await
                .unwrap();
            self.campaigns
                .enroll(&campaign.id, &contact.id, days_ago(10))
                .await
                .unwrap();
            enrolled.push(contact);
        }

        (campaign, enrolled)
    }

    /// A campaign with `contacts` enrolled contacts, launched at [`now`]
    pub async fn launched(
        &self,
        name: &str,
        steps: Vec<EmailTemplate>,
        contacts: usize,
    ) -> (Campaign, Vec<Contact>) {
        let (campaign, enrolled) = self.draft(name, steps, contacts).await;
        let campaign = self.campaigns.launch(&campaign.id, now()).await.unwrap();
        (campaign, enrolled)
    }

    /// Jobs of a campaign in dispatch order
    pub async fn jobs(&self, campaign: &Campaign) -> Vec<EmailJob> {
        self.campaigns
            .jobs(&JobFilter::campaign(campaign.id))
            .await
            .unwrap()
    }

    /// Start a tick at [`now`] whose first send blocks until
    /// [`TestTransport::release_send`], returning once that send is under way
    pub async fn tick_with_held_send(
        &self,
    ) -> tokio::task::JoinHandle<Result<TickReport, EngineError>> {
        self.transport.hold_next_send();
        let dispatcher = self.dispatcher.clone();
        let tick = tokio::spawn(async move { dispatcher.tick_at(now()).await });
        tokio::time::timeout(Duration::from_secs(5), self.transport.wait_for_held_send())
            .await
            .expect("tick never started sending");
        tick
    }

    pub async fn statuses(&self, campaign: &Campaign) -> Vec<JobStatus> {
        self.jobs(campaign)
            .await
            .into_iter()
            .map(|job| job.status)
            .collect()
    }
}
