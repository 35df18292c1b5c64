//! Control handler for the outreach daemon
//!
//! Implements [`CommandHandler`] on top of the campaign service, the mail
//! session and the dispatcher. Engine rejections are returned to the client
//! as error responses carrying their [`ErrorKind`](outreach_delivery::ErrorKind).

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use chrono::Utc;
use outreach_common::incoming;
use outreach_control::{
    CampaignCommand, ContactCommand, JobCommand, Request, RequestCommand, Response,
    SessionCommand, SystemCommand,
    protocol::{CampaignDetails, ResponseData, SessionStatus, SystemStatus},
    server::CommandHandler,
};
use outreach_delivery::{
    CampaignService, DashboardStats, DispatchService, Dispatcher, EngineError,
};
use outreach_session::{SessionArtifact, SessionManager};
use outreach_store::JobFilter;

/// Handler for control commands
pub struct OutreachControlHandler {
    campaigns: Arc<CampaignService>,
    session: SessionManager,
    dispatch: Arc<dyn DispatchService>,
    /// Server start time for uptime calculation
    start_time: Instant,
}

impl OutreachControlHandler {
    #[must_use]
    pub fn new(
        campaigns: Arc<CampaignService>,
        session: SessionManager,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            campaigns,
            session,
            dispatch: dispatcher,
            start_time: Instant::now(),
        }
    }

    async fn handle_campaign_command(
        &self,
        command: CampaignCommand,
    ) -> Result<ResponseData, EngineError> {
        let now = Utc::now();
        let data = match command {
            CampaignCommand::Create { name, templates } => {
                ResponseData::Campaign(self.campaigns.create_campaign(&name, templates).await?)
            }
            CampaignCommand::List => ResponseData::Campaigns(self.campaigns.campaigns().await?),
            CampaignCommand::Show { id } => {
                let campaign = self.campaigns.campaign(&id).await?;
                let enrolled = self
                    .campaigns
                    .enrolled(&id)
                    .await?
                    .into_iter()
                    .map(|(_, contact)| contact)
                    .collect();
                let jobs = self.campaigns.jobs(&JobFilter::campaign(id)).await?;

                ResponseData::CampaignDetails(CampaignDetails {
                    campaign,
                    enrolled,
                    jobs,
                })
            }
            CampaignCommand::Launch { id } => {
                ResponseData::Campaign(self.campaigns.launch(&id, now).await?)
            }
            CampaignCommand::Pause { id } => {
                ResponseData::Campaign(self.campaigns.pause(&id, now).await?)
            }
            CampaignCommand::Resume { id } => {
                ResponseData::Campaign(self.campaigns.resume(&id, now).await?)
            }
            CampaignCommand::Delete { id } => {
                self.campaigns.delete(&id).await?;
                ResponseData::Message(format!("Deleted campaign {id}"))
            }
            CampaignCommand::Enroll { campaign, contact } => {
                ResponseData::Jobs(self.campaigns.enroll(&campaign, &contact, now).await?)
            }
            CampaignCommand::Unenroll { campaign, contact } => {
                let removed = self.campaigns.unenroll(&campaign, &contact).await?;
                ResponseData::Message(format!(
                    "Unenrolled {contact} from {campaign}, removed {removed} unsent job(s)"
                ))
            }
        };

        Ok(data)
    }

    async fn handle_contact_command(
        &self,
        command: ContactCommand,
    ) -> Result<ResponseData, EngineError> {
        Ok(match command {
            ContactCommand::Add(contact) => {
                ResponseData::Contact(self.campaigns.add_contact(contact).await?)
            }
            ContactCommand::List => ResponseData::Contacts(self.campaigns.contacts().await?),
        })
    }

    async fn handle_job_command(&self, command: JobCommand) -> Result<ResponseData, EngineError> {
        Ok(match command {
            JobCommand::List { campaign, status } => {
                let filter = JobFilter {
                    campaign,
                    status,
                    ..JobFilter::default()
                };
                ResponseData::Jobs(self.campaigns.jobs(&filter).await?)
            }
            JobCommand::Retry { id } => {
                ResponseData::Job(self.campaigns.retry(&id, Utc::now()).await?)
            }
        })
    }

    async fn handle_session_command(
        &self,
        command: SessionCommand,
    ) -> Result<ResponseData, EngineError> {
        let session = match command {
            SessionCommand::Status => self.session.status(),
            SessionCommand::Connect => self.session.connect().await?,
            SessionCommand::Import { artifact } => {
                let artifact = SessionArtifact::from_export(&artifact)?;
                self.session.import_session(artifact).await?
            }
            SessionCommand::Disconnect => self.session.disconnect().await?,
        };

        Ok(ResponseData::Session(SessionStatus::from(session)))
    }

    async fn handle_system_command(
        &self,
        command: SystemCommand,
    ) -> Result<Option<ResponseData>, EngineError> {
        let data = match command {
            SystemCommand::Ping => return Ok(None),
            SystemCommand::Status => ResponseData::SystemStatus(SystemStatus {
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_secs: self.start_time.elapsed().as_secs(),
                tick_interval_secs: self.dispatch.tick_interval().as_secs(),
                past_due: self.dispatch.past_due_policy(),
                session: self.session.status().state,
                last_tick: self.dispatch.last_report(),
            }),
            SystemCommand::Stats => ResponseData::Stats(
                DashboardStats::collect(self.campaigns.store().as_ref(), Utc::now()).await?,
            ),
            SystemCommand::Tick => ResponseData::Tick(self.dispatch.tick_now().await?),
        };

        Ok(Some(data))
    }
}

#[async_trait]
impl CommandHandler for OutreachControlHandler {
    async fn handle_request(&self, request: Request) -> outreach_control::Result<Response> {
        incoming!(level = DEBUG, "Control request: {:?}", request.command);

        let result = match request.command {
            RequestCommand::Campaign(command) => {
                self.handle_campaign_command(command).await.map(Some)
            }
            RequestCommand::Contact(command) => {
                self.handle_contact_command(command).await.map(Some)
            }
            RequestCommand::Job(command) => self.handle_job_command(command).await.map(Some),
            RequestCommand::Session(command) => {
                self.handle_session_command(command).await.map(Some)
            }
            RequestCommand::System(command) => self.handle_system_command(command).await,
        };

        Ok(match result {
            Ok(Some(data)) => Response::data(data),
            Ok(None) => Response::ok(),
            Err(e) => {
                if e.is_client_error() {
                    incoming!(level = INFO, "Rejected control request: {e}");
                } else {
                    incoming!(level = WARN, "Control request failed: {e}");
                }
                Response::error(e.kind(), e.to_string())
            }
        })
    }
}
