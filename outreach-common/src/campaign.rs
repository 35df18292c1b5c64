//! Campaigns and their email steps

use std::{collections::HashSet, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::ModelError, id::CampaignId, traits::FiniteStateMachine};

/// Lifecycle of a campaign
///
/// ```text
/// Draft --launch--> Active --pause--> Paused
///                   Paused --resume--> Active
///          Active | Paused --complete--> Completed
///                 Completed --reopen--> Active
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

impl CampaignStatus {
    /// Whether a campaign in this status has been launched at some point
    #[must_use]
    pub const fn is_launched(self) -> bool {
        !matches!(self, Self::Draft)
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignEvent {
    Launch,
    Pause,
    Resume,
    /// Every job of the campaign is terminal
    Complete,
    /// A job of a completed campaign was retried
    Reopen,
}

impl fmt::Display for CampaignEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Launch => "launch",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Complete => "complete",
            Self::Reopen => "reopen",
        })
    }
}

impl FiniteStateMachine for CampaignStatus {
    type Input = CampaignEvent;
    type Error = ModelError;

    fn transition(self, input: CampaignEvent) -> Result<Self, ModelError> {
        match (self, input) {
            (Self::Draft, CampaignEvent::Launch) | (Self::Paused, CampaignEvent::Resume) => {
                Ok(Self::Active)
            }
            (Self::Active, CampaignEvent::Pause) => Ok(Self::Paused),
            (Self::Active | Self::Paused, CampaignEvent::Complete) => Ok(Self::Completed),
            (Self::Completed, CampaignEvent::Reopen) => Ok(Self::Active),
            (from, event) => Err(ModelError::transition("campaign", from, event)),
        }
    }
}

/// When a step should be sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendAnchor {
    /// At an absolute instant
    At(DateTime<Utc>),
    /// A number of days after the contact's enrollment or the launch, whichever is later
    OffsetDays(u32),
}

/// One step of a campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub step_number: u32,
    pub subject: String,
    pub body: String,
    /// Explicit send time. Takes precedence over `offset_days`.
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub offset_days: Option<u32>,
}

impl EmailTemplate {
    #[must_use]
    pub fn new(step_number: u32, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            step_number,
            subject: subject.into(),
            body: body.into(),
            scheduled_at: None,
            offset_days: None,
        }
    }

    #[must_use]
    pub const fn at(mut self, scheduled_at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(scheduled_at);
        self
    }

    #[must_use]
    pub const fn after_days(mut self, days: u32) -> Self {
        self.offset_days = Some(days);
        self
    }

    #[must_use]
    pub const fn anchor(&self) -> Option<SendAnchor> {
        match (self.scheduled_at, self.offset_days) {
            (Some(at), _) => Some(SendAnchor::At(at)),
            (None, Some(days)) => Some(SendAnchor::OffsetDays(days)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub status: CampaignStatus,
    pub templates: Vec<EmailTemplate>,
    pub created_at: DateTime<Utc>,
    /// Stamped by the first launch and never changed afterwards
    pub launched_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Create a new draft campaign
    #[must_use]
    pub fn new(name: impl Into<String>, templates: Vec<EmailTemplate>) -> Self {
        Self {
            id: CampaignId::generate(),
            name: name.into(),
            status: CampaignStatus::Draft,
            templates,
            created_at: Utc::now(),
            launched_at: None,
        }
    }

    /// Check that every step can be materialized.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Validation`] when there are no steps, when step
    /// numbers are not unique positive integers, or when a step has neither an
    /// explicit send time nor a day offset.
    pub fn validate_steps(&self) -> Result<(), ModelError> {
        if self.templates.is_empty() {
            return Err(ModelError::Validation(format!(
                "Campaign '{}' has no email steps",
                self.name
            )));
        }

        let mut seen = HashSet::with_capacity(self.templates.len());
        for template in &self.templates {
            if template.step_number == 0 {
                return Err(ModelError::Validation(
                    "Step numbers start at 1".to_string(),
                ));
            }

            if !seen.insert(template.step_number) {
                return Err(ModelError::Validation(format!(
                    "Step {} appears more than once",
                    template.step_number
                )));
            }

            if template.anchor().is_none() {
                return Err(ModelError::Validation(format!(
                    "Step {} has neither a send time nor a day offset",
                    template.step_number
                )));
            }
        }

        Ok(())
    }

    /// Apply a lifecycle event, stamping `launched_at` on the first launch.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidTransition`] if the event is not valid for
    /// the current status. The campaign is left untouched in that case.
    pub fn apply(&mut self, event: CampaignEvent, now: DateTime<Utc>) -> Result<(), ModelError> {
        self.status = self.status.transition(event)?;
        if event == CampaignEvent::Launch && self.launched_at.is_none() {
            self.launched_at = Some(now);
        }
        Ok(())
    }

    #[must_use]
    pub fn template(&self, step_number: u32) -> Option<&EmailTemplate> {
        self.templates.iter().find(|t| t.step_number == step_number)
    }
}
