//! One pass of the dispatcher over the due jobs

use std::{fmt, time::Instant};

use chrono::{DateTime, Utc};
use outreach_common::{
    CampaignId, CampaignStatus, EmailJob, JobStatus, SessionState, audit, internal, outgoing,
};
use outreach_session::{OutboundMessage, SessionError, SessionManager};
use outreach_store::CampaignStore;
use serde::{Deserialize, Serialize};

use super::{Dispatcher, PastDuePolicy};
use crate::{CampaignService, EngineError};

const PAST_DUE_REASON: &str = "Send time had already passed when the job was scheduled";

/// What a tick did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub started_at: Option<DateTime<Utc>>,
    /// Jobs that were due when the tick started
    pub due: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    /// The session became unusable part way through; the rest stay scheduled
    pub aborted: bool,
    /// There was no connected session, so nothing was attempted
    pub session_unavailable: bool,
    /// Campaigns that completed at the end of the tick
    pub completed: Vec<CampaignId>,
}

impl TickReport {
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.due == 0 && self.completed.is_empty()
    }
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} due, {} sent, {} failed, {} skipped",
            self.due, self.sent, self.failed, self.skipped
        )?;
        if self.session_unavailable {
            f.write_str(", no connected session")?;
        }
        if self.aborted {
            f.write_str(", aborted: session invalid")?;
        }
        if !self.completed.is_empty() {
            write!(f, ", {} campaigns completed", self.completed.len())?;
        }
        Ok(())
    }
}

enum Outcome {
    Sent,
    Failed,
    Skipped,
    /// Job changed since the due query; not ours to touch any more
    Left,
    Abort,
}

/// Fresh copy of `job` if it is still scheduled in an active campaign
async fn still_due(store: &dyn CampaignStore, job: &EmailJob) -> Result<Option<EmailJob>, EngineError> {
    let current = match store.job(&job.id).await {
        Ok(current) => current,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if current.status != JobStatus::Scheduled {
        return Ok(None);
    }

    match store.campaign(&current.campaign_id).await {
        Ok(campaign) if campaign.status == CampaignStatus::Active => Ok(Some(current)),
        Ok(_) => Ok(None),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Store the outcome of a job the dispatcher has handled. Returns `false`
/// if the job was removed in the meantime; its outcome is then dropped.
async fn record(store: &dyn CampaignStore, job: &EmailJob) -> Result<bool, EngineError> {
    match store.update_job(job).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => {
            internal!(
                level = WARN,
                "Job {} to {} was removed while being dispatched, its {} outcome is not recorded",
                job.id,
                job.recipient,
                job.status
            );
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

impl Dispatcher {
    /// Run one tick as of `now`
    ///
    /// Due jobs are sent strictly one after another, earliest first. A
    /// transport error fails only its job; an invalid session stops the tick
    /// and leaves the remaining jobs scheduled. Campaigns whose jobs are all
    /// finished are completed at the end.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatcher is not initialized or the store
    /// fails. Delivery problems are recorded on the jobs instead.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickReport, EngineError> {
        let (campaigns, session) = self.parts()?;
        let _ticking = self.ticking.lock().await;
        let store = campaigns.store().as_ref();

        let due = store.due_jobs(now).await?;
        let mut report = TickReport {
            started_at: Some(now),
            due: due.len(),
            ..TickReport::default()
        };

        if !due.is_empty() {
            if session.status().is_connected() {
                for job in &due {
                    match self.dispatch(campaigns, session, job, now).await? {
                        Outcome::Sent => report.sent += 1,
                        Outcome::Failed => report.failed += 1,
                        Outcome::Skipped => report.skipped += 1,
                        Outcome::Left => {}
                        Outcome::Abort => {
                            report.aborted = true;
                            break;
                        }
                    }
                }
            } else {
                report.session_unavailable = true;
                internal!(
                    level = DEBUG,
                    "{} jobs are due but the mail session is {}",
                    due.len(),
                    session.status().state
                );
            }
        }

        report.completed = campaigns.complete_finished(now).await?;
        *self.last_report.lock() = Some(report.clone());

        Ok(report)
    }

    async fn dispatch(
        &self,
        campaigns: &CampaignService,
        session: &SessionManager,
        job: &EmailJob,
        now: DateTime<Utc>,
    ) -> Result<Outcome, EngineError> {
        let _sending = campaigns.hold_sending().await;
        let store = campaigns.store().as_ref();

        let Some(mut job) = still_due(store, job).await? else {
            internal!(level = DEBUG, "Job {} is no longer due, leaving it", job.id);
            return Ok(Outcome::Left);
        };
        let job_id = job.id.to_string();

        if self.past_due == PastDuePolicy::Skip && job.was_past_due() {
            job.mark_skipped(Some(PAST_DUE_REASON.to_string()))?;
            if !record(store, &job).await? {
                return Ok(Outcome::Left);
            }
            internal!(level = INFO, "Skipped past-due job {job_id}");
            return Ok(Outcome::Skipped);
        }

        let state = session.status().state;
        if state != SessionState::Connected {
            internal!(
                level = WARN,
                "Mail session is {state}, job {job_id} was not sent; stopping this tick"
            );
            return Ok(Outcome::Abort);
        }

        audit::log_send_attempt(&job_id, &job.recipient, job.step_number);
        outgoing!(
            level = DEBUG,
            "Sending job {job_id} step {} to {}",
            job.step_number,
            job.recipient
        );

        let message = OutboundMessage {
            reference: job_id.clone(),
            to: job.recipient.clone(),
            subject: job.subject.clone(),
            body: job.body.clone(),
        };
        let started = Instant::now();

        match session.send(message).await {
            Ok(()) => {
                audit::log_send_success(&job_id, &job.recipient, started.elapsed().as_millis());
                job.mark_sent(now)?;
                Ok(if record(store, &job).await? {
                    Outcome::Sent
                } else {
                    Outcome::Left
                })
            }
            Err(SessionError::NotConnected(state)) => {
                internal!(
                    level = WARN,
                    "Mail session is {state}, job {job_id} was not sent; stopping this tick"
                );
                Ok(Outcome::Abort)
            }
            Err(e) => match EngineError::from(e) {
                EngineError::Transport(reason) => {
                    audit::log_send_failure(&job_id, &job.recipient, &reason, "transport");
                    job.mark_failed(reason)?;
                    Ok(if record(store, &job).await? {
                        Outcome::Failed
                    } else {
                        Outcome::Left
                    })
                }
                EngineError::SessionInvalid(reason) => {
                    audit::log_send_failure(&job_id, &job.recipient, &reason, "session_invalid");
                    internal!(
                        level = WARN,
                        "Mail session is no longer valid ({reason}), stopping this tick"
                    );
                    Ok(Outcome::Abort)
                }
                e => Err(e),
            },
        }
    }
}
