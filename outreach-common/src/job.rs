//! Materialized email jobs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::ModelError,
    id::{CampaignId, ContactId, JobId},
    traits::FiniteStateMachine,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Scheduled,
    Sent,
    Failed,
    Skipped,
}

impl JobStatus {
    /// A terminal job will not be picked up by the dispatcher again without a retry
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Scheduled)
    }

    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scheduled => "scheduled",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        })
    }
}

impl std::str::FromStr for JobStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => Err(ModelError::Validation(format!("Unknown job status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    Sent,
    Failed,
    Skipped,
    Retry,
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sent => "send",
            Self::Failed => "fail",
            Self::Skipped => "skip",
            Self::Retry => "retry",
        })
    }
}

impl FiniteStateMachine for JobStatus {
    type Input = JobEvent;
    type Error = ModelError;

    fn transition(self, input: JobEvent) -> Result<Self, ModelError> {
        match (self, input) {
            (Self::Scheduled, JobEvent::Sent) => Ok(Self::Sent),
            (Self::Scheduled, JobEvent::Failed) => Ok(Self::Failed),
            (Self::Scheduled, JobEvent::Skipped) => Ok(Self::Skipped),
            (Self::Failed | Self::Skipped, JobEvent::Retry) => Ok(Self::Scheduled),
            (from, event) => Err(ModelError::transition("job", from, event)),
        }
    }
}

/// One email for one contact at one campaign step
///
/// Subject and body are resolved at materialization time and never re-rendered,
/// so later template edits do not affect existing jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailJob {
    pub id: JobId,
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    pub step_number: u32,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub scheduled_at: DateTime<Utc>,
    pub materialized_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub error_message: Option<String>,
}

impl EmailJob {
    /// Whether the job was already due when it was created
    #[must_use]
    pub fn was_past_due(&self) -> bool {
        self.scheduled_at < self.materialized_at
    }

    /// # Errors
    ///
    /// Fails unless the job is scheduled.
    pub fn mark_sent(&mut self, now: DateTime<Utc>) -> Result<(), ModelError> {
        self.status = self.status.transition(JobEvent::Sent)?;
        self.sent_at = Some(now);
        self.error_message = None;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails unless the job is scheduled.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), ModelError> {
        self.status = self.status.transition(JobEvent::Failed)?;
        self.error_message = Some(error.into());
        Ok(())
    }

    /// # Errors
    ///
    /// Fails unless the job is scheduled.
    pub fn mark_skipped(&mut self, reason: Option<String>) -> Result<(), ModelError> {
        self.status = self.status.transition(JobEvent::Skipped)?;
        self.error_message = reason;
        Ok(())
    }

    /// Put a failed or skipped job back on the schedule, due immediately.
    ///
    /// # Errors
    ///
    /// Fails unless the job is failed or skipped.
    pub fn retry(&mut self, now: DateTime<Utc>) -> Result<(), ModelError> {
        self.status = self.status.transition(JobEvent::Retry)?;
        self.scheduled_at = now;
        self.error_message = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    use super::*;

    fn job(status: JobStatus) -> EmailJob {
        let now = Utc::now();
        EmailJob {
            id: JobId::generate(),
            campaign_id: CampaignId::generate(),
            contact_id: ContactId::generate(),
            step_number: 1,
            recipient: "ada@example.com".to_string(),
            subject: "Hello".to_string(),
            body: "Body".to_string(),
            scheduled_at: now,
            materialized_at: now,
            sent_at: None,
            status,
            error_message: None,
        }
    }

    #[test]
    fn test_only_documented_edges_are_reachable() {
        use JobEvent as E;
        use JobStatus as S;

        let all_status = [S::Scheduled, S::Sent, S::Failed, S::Skipped];
        let all_events = [E::Sent, E::Failed, E::Skipped, E::Retry];

        let mut reachable = Vec::new();
        for from in all_status {
            for event in all_events {
                if let Ok(to) = from.transition(event) {
                    reachable.push((from, to));
                }
            }
        }

        assert_eq!(
            reachable,
            vec![
                (S::Scheduled, S::Sent),
                (S::Scheduled, S::Failed),
                (S::Scheduled, S::Skipped),
                (S::Failed, S::Scheduled),
                (S::Skipped, S::Scheduled),
            ]
        );
    }

    #[test]
    fn test_retry_resets_schedule_and_error() {
        let mut job = job(JobStatus::Scheduled);
        job.mark_failed("connection reset").unwrap();
        assert_eq!(job.error_message.as_deref(), Some("connection reset"));

        let now = Utc::now() + Duration::hours(1);
        job.retry(now).unwrap();

        assert_eq!(job.status, JobStatus::Scheduled);
        assert_eq!(job.scheduled_at, now);
        assert_eq!(job.error_message, None);
    }

    #[test]
    fn test_sent_job_cannot_be_retried() {
        let mut job = job(JobStatus::Scheduled);
        job.mark_sent(Utc::now()).unwrap();
        let before = job.clone();

        assert!(job.retry(Utc::now()).is_err());
        assert_eq!(job, before);
    }

    #[test]
    fn test_past_due() {
        let mut job = job(JobStatus::Scheduled);
        assert!(!job.was_past_due());

        job.scheduled_at = job.materialized_at - Duration::minutes(5);
        assert!(job.was_past_due());
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("FAILED".parse::<JobStatus>(), Ok(JobStatus::Failed));
        assert!("pending".parse::<JobStatus>().is_err());
    }
}
