//! Dispatcher orchestration

mod tick;

use std::{fmt, sync::Arc, time::Duration};

use chrono::Utc;
use outreach_common::{Signal, internal};
use outreach_session::SessionManager;
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;

pub use self::tick::TickReport;
use crate::{CampaignService, EngineError};

const fn default_tick_interval() -> u64 {
    60
}

/// What to do with a job whose send time had already passed when it was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PastDuePolicy {
    /// Send it on the next tick like any other due job
    #[default]
    SendImmediately,
    /// Mark it skipped instead of sending it late
    Skip,
}

impl fmt::Display for PastDuePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SendImmediately => "send immediately",
            Self::Skip => "skip",
        })
    }
}

/// Recurring loop that sends due jobs through the mail session
///
/// Ticks never overlap: the loop awaits each tick before the next, and an
/// on-demand [`Dispatcher::tick_at`] waits for any tick already running.
#[derive(Debug, Deserialize)]
pub struct Dispatcher {
    /// Seconds between ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    #[serde(default)]
    pub past_due: PastDuePolicy,

    /// Campaign lifecycle, used for the completion sweep (initialized in `init()`)
    #[serde(skip)]
    pub(crate) campaigns: Option<Arc<CampaignService>>,

    /// The mail session (initialized in `init()`)
    #[serde(skip)]
    pub(crate) session: Option<SessionManager>,

    #[serde(skip)]
    pub(crate) ticking: tokio::sync::Mutex<()>,

    #[serde(skip)]
    pub(crate) last_report: parking_lot::Mutex<Option<TickReport>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            past_due: PastDuePolicy::default(),
            campaigns: None,
            session: None,
            ticking: tokio::sync::Mutex::new(()),
            last_report: parking_lot::Mutex::new(None),
        }
    }
}

impl Dispatcher {
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] if `tick_interval_secs` is zero.
    pub fn init(
        &mut self,
        campaigns: Arc<CampaignService>,
        session: SessionManager,
    ) -> Result<(), EngineError> {
        if self.tick_interval_secs == 0 {
            return Err(EngineError::Validation(
                "tick_interval_secs must be at least 1".to_string(),
            ));
        }

        internal!(
            "Initialising dispatcher: tick every {}s, past-due jobs: {}",
            self.tick_interval_secs,
            self.past_due
        );
        self.campaigns = Some(campaigns);
        self.session = Some(session);
        Ok(())
    }

    fn parts(&self) -> Result<(&Arc<CampaignService>, &SessionManager), EngineError> {
        match (&self.campaigns, &self.session) {
            (Some(campaigns), Some(session)) => Ok((campaigns, session)),
            _ => Err(EngineError::NotInitialized(
                "Dispatcher not initialized. Call init() first.".to_string(),
            )),
        }
    }

    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    /// Report of the most recent completed tick
    #[must_use]
    pub fn last_report(&self) -> Option<TickReport> {
        self.last_report.lock().clone()
    }

    /// Run ticks until a shutdown signal arrives
    ///
    /// A failing tick is logged and the loop carries on with the next one.
    /// A tick in progress when shutdown arrives is finished first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotInitialized`] if `init()` was not called.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn serve(
        &self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), EngineError> {
        self.parts()?;
        internal!("Dispatcher starting");

        let mut timer = tokio::time::interval(self.tick_interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Skip the first tick to avoid immediate execution
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    match self.tick_at(Utc::now()).await {
                        Ok(report) if report.is_idle() => {
                            outreach_common::tracing::debug!("Dispatcher tick found nothing to do");
                        }
                        Ok(report) => {
                            outreach_common::tracing::info!("Dispatcher tick: {report}");
                        }
                        Err(e) => {
                            outreach_common::tracing::error!("Dispatcher tick failed: {e}");
                        }
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!("Dispatcher received shutdown signal");
                            break;
                        }
                        Err(e) => {
                            outreach_common::tracing::error!("Dispatcher shutdown channel error: {e}");
                            break;
                        }
                    }
                }
            }
        }

        internal!("Dispatcher shutdown complete");
        Ok(())
    }
}
