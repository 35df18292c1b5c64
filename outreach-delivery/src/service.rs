//! Service trait abstraction for dispatcher operations
//!
//! Lets control interfaces drive and inspect the dispatcher without holding
//! the concrete [`Dispatcher`] type, and lets tests substitute their own.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::{Dispatcher, EngineError, PastDuePolicy, TickReport};

#[async_trait]
pub trait DispatchService: Send + Sync {
    /// Run one tick right away, waiting for a tick already in progress
    async fn tick_now(&self) -> Result<TickReport, EngineError>;

    /// Report of the most recent tick, if any has run
    fn last_report(&self) -> Option<TickReport>;

    fn tick_interval(&self) -> Duration;

    fn past_due_policy(&self) -> PastDuePolicy;
}

#[async_trait]
impl DispatchService for Dispatcher {
    async fn tick_now(&self) -> Result<TickReport, EngineError> {
        self.tick_at(Utc::now()).await
    }

    fn last_report(&self) -> Option<TickReport> {
        Self::last_report(self)
    }

    fn tick_interval(&self) -> Duration {
        Self::tick_interval(self)
    }

    fn past_due_policy(&self) -> PastDuePolicy {
        self.past_due
    }
}
