//! Refresh executor: one refresh for one data source, end to end.
//!
//! Mutual exclusion is per source: the executor try-acquires the lock for
//! the target id and records a `skipped_lock_held` audit entry when another
//! run already holds it. The lock guard lives for the whole run (fetch,
//! reconcile, bookkeeping) and releases on drop, whatever the exit path.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use prism_core::config::SyncConfig;
use prism_core::events::DomainEvent;
use prism_core::types::{
    DataSource, FetchedRecord, RefreshAuditEntry, RefreshOutcome, RefreshTrigger,
};
use prism_storage::{
    ConnectionRepository, DataSourceRepository, Database, ReconcileCounts, RecordStore,
    RefreshLogRepository,
};

use crate::client::{QueryDescriptor, RecordSource, SourceError};
use crate::error::SyncError;
use crate::lock::RefreshLocks;

/// What one `run` call did.
#[derive(Debug, Clone, PartialEq)]
pub enum RunReport {
    /// Fetched and reconciled; the counts describe the snapshot delta.
    Completed { counts: ReconcileCounts },
    /// The run failed after retries; the snapshot is untouched.
    Failed { error: String },
    /// Another run held the lock. Expected under concurrent triggers.
    SkippedLockHeld,
}

/// Executes refresh runs with per-source mutual exclusion.
pub struct RefreshExecutor {
    connections: ConnectionRepository,
    sources: DataSourceRepository,
    records: RecordStore,
    audit: RefreshLogRepository,
    client: Arc<dyn RecordSource>,
    locks: RefreshLocks,
    config: SyncConfig,
    events: Option<broadcast::Sender<DomainEvent>>,
}

impl RefreshExecutor {
    pub fn new(
        db: Arc<Database>,
        client: Arc<dyn RecordSource>,
        config: SyncConfig,
        events: Option<broadcast::Sender<DomainEvent>>,
    ) -> Self {
        Self {
            connections: ConnectionRepository::new(db.clone()),
            sources: DataSourceRepository::new(db.clone()),
            records: RecordStore::new(db.clone()),
            audit: RefreshLogRepository::new(db),
            client,
            locks: RefreshLocks::new(),
            config,
            events,
        }
    }

    /// Run one refresh for one data source.
    ///
    /// Manual and scheduled triggers share this entry point and the same
    /// lock, so they can never run concurrently for one source. Upstream
    /// failures are not surfaced as `Err`: they end in a `failure` audit
    /// entry and a [`RunReport::Failed`], since refreshes are background
    /// work. `Err` is reserved for caller mistakes (unknown source,
    /// inactive connection) and storage trouble.
    pub async fn run(
        &self,
        data_source_id: Uuid,
        trigger: RefreshTrigger,
    ) -> Result<RunReport, SyncError> {
        let source = self
            .sources
            .find_by_id(data_source_id)?
            .ok_or(SyncError::SourceNotFound(data_source_id))?;
        let connection = self
            .connections
            .find_by_id(source.connection_id)?
            .ok_or(SyncError::ConnectionNotFound(source.connection_id))?;
        if !connection.is_active {
            return Err(SyncError::ConnectionInactive(connection.id));
        }

        let Some(_guard) = self.locks.try_acquire(data_source_id) else {
            let now = Utc::now();
            self.audit.append(&RefreshAuditEntry {
                id: Uuid::new_v4(),
                data_source_id,
                trigger,
                started_at: now,
                ended_at: Some(now),
                outcome: RefreshOutcome::SkippedLockHeld,
                records_fetched: 0,
                records_inserted: 0,
                records_updated: 0,
                records_removed: 0,
                error_detail: None,
            })?;
            self.emit(DomainEvent::RefreshSkipped { data_source_id });
            info!(source = %data_source_id, "Refresh skipped, lock held by another run");
            return Ok(RunReport::SkippedLockHeld);
        };

        let started_at = Utc::now();
        self.sources.mark_running(data_source_id)?;
        self.emit(DomainEvent::RefreshStarted {
            data_source_id,
            trigger,
        });

        let result = self.fetch_and_reconcile(&source, started_at).await;
        let ended_at = Utc::now();

        match result {
            Ok(counts) => {
                self.audit.append(&RefreshAuditEntry {
                    id: Uuid::new_v4(),
                    data_source_id,
                    trigger,
                    started_at,
                    ended_at: Some(ended_at),
                    outcome: RefreshOutcome::Success,
                    records_fetched: counts.fetched,
                    records_inserted: counts.inserted,
                    records_updated: counts.updated,
                    records_removed: counts.removed,
                    error_detail: None,
                })?;
                // last_refresh is the run's start time, so interval math is
                // immune to execution-duration drift.
                self.sources.mark_succeeded(data_source_id, started_at)?;
                self.emit(DomainEvent::RefreshFinished {
                    data_source_id,
                    outcome: RefreshOutcome::Success,
                    records_fetched: counts.fetched,
                });
                info!(
                    source = %data_source_id,
                    fetched = counts.fetched,
                    inserted = counts.inserted,
                    updated = counts.updated,
                    removed = counts.removed,
                    "Refresh succeeded"
                );
                Ok(RunReport::Completed { counts })
            }
            Err(err) => {
                let detail = err.to_string();
                self.audit.append(&RefreshAuditEntry {
                    id: Uuid::new_v4(),
                    data_source_id,
                    trigger,
                    started_at,
                    ended_at: Some(ended_at),
                    outcome: RefreshOutcome::Failure,
                    records_fetched: 0,
                    records_inserted: 0,
                    records_updated: 0,
                    records_removed: 0,
                    error_detail: Some(detail.clone()),
                })?;
                // A failed run does not advance the due-schedule clock.
                self.sources.mark_failed(data_source_id, &detail)?;
                self.emit(DomainEvent::RefreshFinished {
                    data_source_id,
                    outcome: RefreshOutcome::Failure,
                    records_fetched: 0,
                });
                warn!(source = %data_source_id, error = %detail, "Refresh failed");
                Ok(RunReport::Failed { error: detail })
            }
        }
    }

    /// Probe the upstream on behalf of `test-connection`.
    pub async fn test_connection(&self, connection_id: Uuid) -> Result<(), SyncError> {
        let connection = self
            .connections
            .find_by_id(connection_id)?
            .ok_or(SyncError::ConnectionNotFound(connection_id))?;
        if !connection.is_active {
            return Err(SyncError::ConnectionInactive(connection_id));
        }
        let timeout = Duration::from_secs(self.config.fetch_timeout_secs);
        match tokio::time::timeout(timeout, self.client.probe()).await {
            Ok(result) => result.map_err(SyncError::from),
            Err(_) => Err(SourceError::Transient(format!(
                "probe timed out after {}s",
                self.config.fetch_timeout_secs
            ))
            .into()),
        }
    }

    /// Reset any source left in `running` by a previous process.
    ///
    /// Runs once at startup, before the first scheduler tick. Each reset
    /// source gets a `failure` audit entry so the stall is visible in the
    /// log. Returns the reset ids.
    pub fn recover_interrupted(&self) -> Result<Vec<Uuid>, SyncError> {
        let reset = self.sources.reset_interrupted()?;
        let now = Utc::now();
        for &data_source_id in &reset {
            self.audit.append(&RefreshAuditEntry {
                id: Uuid::new_v4(),
                data_source_id,
                trigger: RefreshTrigger::Recovery,
                started_at: now,
                ended_at: Some(now),
                outcome: RefreshOutcome::Failure,
                records_fetched: 0,
                records_inserted: 0,
                records_updated: 0,
                records_removed: 0,
                error_detail: Some("recovered after restart".to_string()),
            })?;
            self.emit(DomainEvent::RefreshRecovered { data_source_id });
            warn!(source = %data_source_id, "Reset interrupted refresh after restart");
        }
        Ok(reset)
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    async fn fetch_and_reconcile(
        &self,
        source: &DataSource,
        started_at: DateTime<Utc>,
    ) -> Result<ReconcileCounts, SyncError> {
        let descriptor = QueryDescriptor::new(
            source.record_type.clone(),
            source.fields.clone(),
            source.filter.clone(),
        );
        let fetched = self.fetch_with_retry(&descriptor).await?;
        let counts =
            self.records
                .replace_snapshot(source.id, &fetched, source.max_records, started_at)?;
        Ok(counts)
    }

    /// Fetch with a per-attempt timeout, retrying transient failures with
    /// linear backoff. Permanent failures are returned immediately.
    async fn fetch_with_retry(
        &self,
        descriptor: &QueryDescriptor,
    ) -> Result<Vec<FetchedRecord>, SourceError> {
        let timeout = Duration::from_secs(self.config.fetch_timeout_secs);
        let mut attempt: u32 = 0;
        loop {
            let result = match tokio::time::timeout(timeout, self.client.fetch(descriptor)).await
            {
                Ok(result) => result,
                Err(_) => Err(SourceError::Transient(format!(
                    "fetch timed out after {}s",
                    self.config.fetch_timeout_secs
                ))),
            };
            match result {
                Ok(records) => return Ok(records),
                Err(err) if err.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        record_type = %descriptor.record_type,
                        attempt,
                        error = %err,
                        "Transient fetch failure, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(
                        self.config.retry_backoff_ms * u64::from(attempt),
                    ))
                    .await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn emit(&self, event: DomainEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use prism_core::types::{RefreshStatus, Secret, SourceConnection};
    use serde_json::json;
    use tokio::sync::Notify;

    fn rec(id: &str, values: serde_json::Value) -> FetchedRecord {
        FetchedRecord {
            external_id: id.to_string(),
            values,
        }
    }

    fn test_config() -> SyncConfig {
        SyncConfig {
            tick_interval_secs: 60,
            default_refresh_interval_secs: 1800,
            fetch_timeout_secs: 5,
            max_retries: 2,
            retry_backoff_ms: 1,
            audit_retention_days: 30,
        }
    }

    struct Fixture {
        db: Arc<Database>,
        connection_id: Uuid,
        source_id: Uuid,
    }

    fn seed(db: &Arc<Database>, active_connection: bool) -> Fixture {
        let connections = ConnectionRepository::new(db.clone());
        let sources = DataSourceRepository::new(db.clone());

        let connection = SourceConnection {
            id: Uuid::new_v4(),
            name: format!("conn-{}", Uuid::new_v4()),
            account_id: "ACME-1".into(),
            secret: Secret::new("tok"),
            is_active: active_connection,
            auto_refresh: true,
            refresh_interval_secs: 1800,
            description: None,
            created_at: Utc::now(),
        };
        connections.insert(&connection).unwrap();

        let source = DataSource {
            id: Uuid::new_v4(),
            name: "customers".into(),
            connection_id: connection.id,
            record_type: "customer".into(),
            fields: vec![],
            filter: json!({}),
            auto_refresh: true,
            refresh_interval_secs: 1800,
            last_refresh: None,
            refresh_status: RefreshStatus::Idle,
            last_error: None,
            max_records: 10_000,
            created_at: Utc::now(),
        };
        sources.insert(&source).unwrap();

        Fixture {
            db: db.clone(),
            connection_id: connection.id,
            source_id: source.id,
        }
    }

    fn executor(db: &Arc<Database>, client: Arc<dyn RecordSource>) -> RefreshExecutor {
        RefreshExecutor::new(db.clone(), client, test_config(), None)
    }

    // ---- Mock sources ----

    /// Fails with a transient error `failures` times, then serves records.
    struct FlakySource {
        failures: usize,
        calls: AtomicUsize,
        records: Vec<FetchedRecord>,
    }

    #[async_trait]
    impl RecordSource for FlakySource {
        async fn fetch(
            &self,
            _descriptor: &QueryDescriptor,
        ) -> Result<Vec<FetchedRecord>, SourceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(SourceError::Transient("connection reset".into()))
            } else {
                Ok(self.records.clone())
            }
        }
    }

    /// Always fails with a permanent error.
    struct BrokenSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RecordSource for BrokenSource {
        async fn fetch(
            &self,
            _descriptor: &QueryDescriptor,
        ) -> Result<Vec<FetchedRecord>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(SourceError::Permanent("invalid credentials".into()))
        }
    }

    /// Blocks inside fetch until released, so tests can overlap two runs.
    struct GatedSource {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl RecordSource for GatedSource {
        async fn fetch(
            &self,
            _descriptor: &QueryDescriptor,
        ) -> Result<Vec<FetchedRecord>, SourceError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(vec![rec("1", json!({"id": "1"}))])
        }
    }

    // ---- Success path ----

    #[tokio::test]
    async fn test_run_success_reconciles_and_records_audit() {
        let db = Arc::new(Database::in_memory().unwrap());
        let fx = seed(&db, true);
        let client = Arc::new(
            crate::client::StaticSource::new().with_records(
                "customer",
                vec![
                    rec("1", json!({"id": "1", "name": "Acme"})),
                    rec("2", json!({"id": "2", "name": "Globex"})),
                ],
            ),
        );
        let exec = executor(&db, client);

        let report = exec.run(fx.source_id, RefreshTrigger::Manual).await.unwrap();
        let RunReport::Completed { counts } = report else {
            panic!("expected completed report");
        };
        assert_eq!(counts.fetched, 2);
        assert_eq!(counts.inserted, 2);

        let sources = DataSourceRepository::new(fx.db.clone());
        let source = sources.find_by_id(fx.source_id).unwrap().unwrap();
        assert_eq!(source.refresh_status, RefreshStatus::Succeeded);
        assert!(source.last_refresh.is_some());
        assert!(source.last_error.is_none());

        let audit = RefreshLogRepository::new(fx.db.clone());
        let entries = audit.list_for_source(fx.source_id, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, RefreshOutcome::Success);
        assert_eq!(entries[0].records_fetched, 2);
        assert_eq!(entries[0].trigger, RefreshTrigger::Manual);

        let records = RecordStore::new(fx.db);
        assert_eq!(records.count_for_source(fx.source_id).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_last_refresh_is_run_start_not_end() {
        let db = Arc::new(Database::in_memory().unwrap());
        let fx = seed(&db, true);
        let client =
            Arc::new(crate::client::StaticSource::new().with_records("customer", vec![]));
        let exec = executor(&db, client);

        let before = Utc::now();
        exec.run(fx.source_id, RefreshTrigger::Manual).await.unwrap();
        let after = Utc::now();

        let sources = DataSourceRepository::new(fx.db);
        let last = sources
            .find_by_id(fx.source_id)
            .unwrap()
            .unwrap()
            .last_refresh
            .unwrap();
        assert!(last.timestamp() >= before.timestamp());
        assert!(last.timestamp() <= after.timestamp());
    }

    // ---- Retry semantics ----

    #[tokio::test]
    async fn test_transient_failures_retried_then_succeed() {
        let db = Arc::new(Database::in_memory().unwrap());
        let fx = seed(&db, true);
        let client = Arc::new(FlakySource {
            failures: 2,
            calls: AtomicUsize::new(0),
            records: vec![rec("1", json!({"id": "1"}))],
        });
        let exec = executor(&db, client.clone());

        let report = exec.run(fx.source_id, RefreshTrigger::Scheduled).await.unwrap();
        assert!(matches!(report, RunReport::Completed { .. }));
        // Two failures + one success.
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_transient_failures_exhaust_retries() {
        let db = Arc::new(Database::in_memory().unwrap());
        let fx = seed(&db, true);
        let client = Arc::new(FlakySource {
            failures: 10,
            calls: AtomicUsize::new(0),
            records: vec![],
        });
        let exec = executor(&db, client.clone());

        let report = exec.run(fx.source_id, RefreshTrigger::Scheduled).await.unwrap();
        assert!(matches!(report, RunReport::Failed { .. }));
        // Initial attempt + max_retries.
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);

        let sources = DataSourceRepository::new(fx.db.clone());
        let source = sources.find_by_id(fx.source_id).unwrap().unwrap();
        assert_eq!(source.refresh_status, RefreshStatus::Failed);
        // A failed run never sets last_refresh.
        assert!(source.last_refresh.is_none());

        let audit = RefreshLogRepository::new(fx.db);
        let entries = audit.list_for_source(fx.source_id, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, RefreshOutcome::Failure);
        assert!(entries[0].error_detail.as_ref().unwrap().contains("reset"));
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let db = Arc::new(Database::in_memory().unwrap());
        let fx = seed(&db, true);
        let client = Arc::new(BrokenSource {
            calls: AtomicUsize::new(0),
        });
        let exec = executor(&db, client.clone());

        let report = exec.run(fx.source_id, RefreshTrigger::Manual).await.unwrap();
        let RunReport::Failed { error } = report else {
            panic!("expected failed report");
        };
        assert!(error.contains("invalid credentials"));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_run_leaves_snapshot_untouched() {
        let db = Arc::new(Database::in_memory().unwrap());
        let fx = seed(&db, true);

        let good = Arc::new(crate::client::StaticSource::new().with_records(
            "customer",
            vec![rec("1", json!({"id": "1", "name": "Acme"}))],
        ));
        executor(&db, good)
            .run(fx.source_id, RefreshTrigger::Manual)
            .await
            .unwrap();

        let bad = Arc::new(BrokenSource {
            calls: AtomicUsize::new(0),
        });
        executor(&db, bad)
            .run(fx.source_id, RefreshTrigger::Manual)
            .await
            .unwrap();

        let records = RecordStore::new(fx.db.clone());
        let snapshot = records.records_for_source(fx.source_id).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].values["name"], "Acme");

        // last_refresh still reflects the successful run.
        let sources = DataSourceRepository::new(fx.db);
        assert!(sources
            .find_by_id(fx.source_id)
            .unwrap()
            .unwrap()
            .last_refresh
            .is_some());
    }

    // ---- Mutual exclusion ----

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_runs_one_skips() {
        let db = Arc::new(Database::in_memory().unwrap());
        let fx = seed(&db, true);
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let client = Arc::new(GatedSource {
            entered: entered.clone(),
            release: release.clone(),
        });
        let exec = Arc::new(executor(&db, client));

        let first = {
            let exec = exec.clone();
            let id = fx.source_id;
            tokio::spawn(async move { exec.run(id, RefreshTrigger::Scheduled).await.unwrap() })
        };

        // Wait until the first run is inside the fetch, holding the lock.
        entered.notified().await;

        let second = exec.run(fx.source_id, RefreshTrigger::Manual).await.unwrap();
        assert_eq!(second, RunReport::SkippedLockHeld);

        release.notify_one();
        let first = first.await.unwrap();
        assert!(matches!(first, RunReport::Completed { .. }));

        let audit = RefreshLogRepository::new(fx.db);
        let entries = audit.list_for_source(fx.source_id, 10).unwrap();
        let outcomes: Vec<RefreshOutcome> = entries.iter().map(|e| e.outcome).collect();
        assert!(outcomes.contains(&RefreshOutcome::Success));
        assert!(outcomes.contains(&RefreshOutcome::SkippedLockHeld));
    }

    #[tokio::test]
    async fn test_lock_released_after_failure() {
        let db = Arc::new(Database::in_memory().unwrap());
        let fx = seed(&db, true);
        let exec = executor(
            &db,
            Arc::new(BrokenSource {
                calls: AtomicUsize::new(0),
            }),
        );

        exec.run(fx.source_id, RefreshTrigger::Manual).await.unwrap();
        // A second run can acquire the lock again: not SkippedLockHeld.
        let report = exec.run(fx.source_id, RefreshTrigger::Manual).await.unwrap();
        assert!(matches!(report, RunReport::Failed { .. }));
    }

    // ---- Guard rails ----

    #[tokio::test]
    async fn test_run_unknown_source() {
        let db = Arc::new(Database::in_memory().unwrap());
        seed(&db, true);
        let exec = executor(&db, Arc::new(crate::client::StaticSource::new()));
        let err = exec.run(Uuid::new_v4(), RefreshTrigger::Manual).await;
        assert!(matches!(err, Err(SyncError::SourceNotFound(_))));
    }

    #[tokio::test]
    async fn test_run_inactive_connection() {
        let db = Arc::new(Database::in_memory().unwrap());
        let fx = seed(&db, false);
        let exec = executor(&db, Arc::new(crate::client::StaticSource::new()));
        let err = exec.run(fx.source_id, RefreshTrigger::Manual).await;
        assert!(matches!(err, Err(SyncError::ConnectionInactive(_))));
    }

    // ---- test_connection ----

    #[tokio::test]
    async fn test_connection_probe_ok() {
        let db = Arc::new(Database::in_memory().unwrap());
        let fx = seed(&db, true);
        let client = Arc::new(
            crate::client::StaticSource::new()
                .with_records("customer", vec![rec("1", json!({"id": "1"}))]),
        );
        let exec = executor(&db, client);
        assert!(exec.test_connection(fx.connection_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_connection_probe_inactive() {
        let db = Arc::new(Database::in_memory().unwrap());
        let fx = seed(&db, false);
        let exec = executor(&db, Arc::new(crate::client::StaticSource::new()));
        assert!(matches!(
            exec.test_connection(fx.connection_id).await,
            Err(SyncError::ConnectionInactive(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_probe_unknown() {
        let db = Arc::new(Database::in_memory().unwrap());
        seed(&db, true);
        let exec = executor(&db, Arc::new(crate::client::StaticSource::new()));
        assert!(matches!(
            exec.test_connection(Uuid::new_v4()).await,
            Err(SyncError::ConnectionNotFound(_))
        ));
    }

    // ---- Crash recovery ----

    #[tokio::test]
    async fn test_recover_interrupted_resets_and_audits() {
        let db = Arc::new(Database::in_memory().unwrap());
        let fx = seed(&db, true);
        let sources = DataSourceRepository::new(db.clone());
        sources.mark_running(fx.source_id).unwrap();

        let exec = executor(&db, Arc::new(crate::client::StaticSource::new()));
        let reset = exec.recover_interrupted().unwrap();
        assert_eq!(reset, vec![fx.source_id]);

        let source = sources.find_by_id(fx.source_id).unwrap().unwrap();
        assert_eq!(source.refresh_status, RefreshStatus::Failed);

        let audit = RefreshLogRepository::new(fx.db);
        let entries = audit.list_for_source(fx.source_id, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].trigger, RefreshTrigger::Recovery);
        assert_eq!(entries[0].outcome, RefreshOutcome::Failure);
        assert_eq!(
            entries[0].error_detail.as_deref(),
            Some("recovered after restart")
        );
    }

    #[tokio::test]
    async fn test_recover_interrupted_noop() {
        let db = Arc::new(Database::in_memory().unwrap());
        seed(&db, true);
        let exec = executor(&db, Arc::new(crate::client::StaticSource::new()));
        assert!(exec.recover_interrupted().unwrap().is_empty());
    }
}
