//! Refresh scheduler: decides which data sources are due at each tick.
//!
//! A tick selects due sources oldest-first (never-refreshed sources lead)
//! and spawns one executor run per source. Enqueuing is idempotent per
//! source: a duplicate spawn finds the executor's lock held and degenerates
//! to a recorded skip, so the queue cannot grow without bound. One source's
//! failure never fails the tick.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use prism_core::events::DomainEvent;
use prism_core::types::RefreshTrigger;
use prism_storage::{DataSourceRepository, Database};

use crate::error::SyncError;
use crate::executor::RefreshExecutor;

/// Periodically enqueues refresh runs for due data sources.
pub struct RefreshScheduler {
    sources: DataSourceRepository,
    executor: Arc<RefreshExecutor>,
    events: Option<broadcast::Sender<DomainEvent>>,
}

impl RefreshScheduler {
    pub fn new(
        db: Arc<Database>,
        executor: Arc<RefreshExecutor>,
        events: Option<broadcast::Sender<DomainEvent>>,
    ) -> Self {
        Self {
            sources: DataSourceRepository::new(db),
            executor,
            events,
        }
    }

    /// Whether a source is due at `now`.
    ///
    /// Due means never refreshed, or at least `interval_secs` elapsed since
    /// the last successful run's start time. The boundary is inclusive:
    /// exactly `interval_secs` elapsed is due.
    pub fn is_due(
        last_refresh: Option<DateTime<Utc>>,
        interval_secs: i64,
        now: DateTime<Utc>,
    ) -> bool {
        match last_refresh {
            None => true,
            Some(last) => (now - last).num_seconds() >= interval_secs,
        }
    }

    /// Run one scheduling pass: spawn an executor run for every due source.
    ///
    /// Returns the number of runs spawned. Each spawn is isolated; an
    /// executor error is logged and never propagates into the tick.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize, SyncError> {
        let due = self.sources.due_sources(now)?;
        if due.is_empty() {
            debug!("Scheduler tick: nothing due");
            return Ok(0);
        }

        info!(due = due.len(), "Scheduler tick: enqueuing refreshes");
        let mut spawned = 0;
        for source in due {
            let data_source_id = source.id;
            if let Some(tx) = &self.events {
                let _ = tx.send(DomainEvent::RefreshEnqueued { data_source_id });
            }
            let executor = self.executor.clone();
            tokio::spawn(async move {
                if let Err(e) = executor.run(data_source_id, RefreshTrigger::Scheduled).await {
                    warn!(source = %data_source_id, error = %e, "Scheduled refresh errored");
                }
            });
            spawned += 1;
        }
        Ok(spawned)
    }
}

// =============================================================================
// Tests
// =============================================================================
