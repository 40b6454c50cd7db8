//! Repository implementations for SQLite-backed persistence.
//!
//! Provides ConnectionRepository, DataSourceRepository, and
//! RefreshLogRepository that operate on the Database struct using raw SQL.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use prism_core::error::PrismError;
use prism_core::types::{
    DataSource, RefreshAuditEntry, RefreshOutcome, RefreshStatus, RefreshTrigger, Secret,
    SourceConnection,
};

use crate::db::Database;

fn ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(epoch: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(epoch, 0).single().unwrap_or_default()
}

// =============================================================================
// ConnectionRepository
// =============================================================================

/// Repository for upstream account connections.
#[derive(Clone)]
pub struct ConnectionRepository {
    db: Arc<Database>,
}

impl ConnectionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store a new connection.
    pub fn insert(&self, conn_row: &SourceConnection) -> Result<(), PrismError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO connections
                     (id, name, account_id, secret, is_active, auto_refresh,
                      refresh_interval_secs, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    conn_row.id.to_string(),
                    conn_row.name,
                    conn_row.account_id,
                    conn_row.secret.expose(),
                    conn_row.is_active as i32,
                    conn_row.auto_refresh as i32,
                    conn_row.refresh_interval_secs,
                    conn_row.description,
                    ts(conn_row.created_at),
                ],
            )
            .map_err(|e| PrismError::Storage(format!("Failed to save connection: {}", e)))?;
            Ok(())
        })
    }

    /// Find a connection by ID.
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<SourceConnection>, PrismError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, account_id, secret, is_active, auto_refresh,
                            refresh_interval_secs, description, created_at
                     FROM connections WHERE id = ?1",
                )
                .map_err(|e| PrismError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![id.to_string()], |row| {
                    Ok(row_to_connection(row))
                })
                .optional()
                .map_err(|e| PrismError::Storage(e.to_string()))?;

            match result {
                Some(c) => Ok(Some(c?)),
                None => Ok(None),
            }
        })
    }

    /// List all connections, newest first.
    pub fn list(&self) -> Result<Vec<SourceConnection>, PrismError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, account_id, secret, is_active, auto_refresh,
                            refresh_interval_secs, description, created_at
                     FROM connections ORDER BY created_at DESC",
                )
                .map_err(|e| PrismError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| Ok(row_to_connection(row)))
                .map_err(|e| PrismError::Storage(e.to_string()))?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(|e| PrismError::Storage(e.to_string()))??);
            }
            Ok(out)
        })
    }

    /// Enable or disable a connection (soft-deactivation).
    pub fn set_active(&self, id: Uuid, active: bool) -> Result<(), PrismError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE connections SET is_active = ?2 WHERE id = ?1",
                    rusqlite::params![id.to_string(), active as i32],
                )
                .map_err(|e| PrismError::Storage(e.to_string()))?;
            if changed == 0 {
                return Err(PrismError::NotFound(format!("connection {}", id)));
            }
            Ok(())
        })
    }

    /// Rotate the stored credential material.
    pub fn rotate_secret(&self, id: Uuid, secret: &Secret) -> Result<(), PrismError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE connections SET secret = ?2 WHERE id = ?1",
                    rusqlite::params![id.to_string(), secret.expose()],
                )
                .map_err(|e| PrismError::Storage(e.to_string()))?;
            if changed == 0 {
                return Err(PrismError::NotFound(format!("connection {}", id)));
            }
            Ok(())
        })
    }
}

// =============================================================================
// DataSourceRepository
// =============================================================================

/// Repository for data source definitions and refresh bookkeeping.
#[derive(Clone)]
pub struct DataSourceRepository {
    db: Arc<Database>,
}

impl DataSourceRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store a new data source.
    pub fn insert(&self, source: &DataSource) -> Result<(), PrismError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO data_sources
                     (id, name, connection_id, record_type, fields, filter,
                      auto_refresh, refresh_interval_secs, last_refresh,
                      refresh_status, last_error, max_records, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    source.id.to_string(),
                    source.name,
                    source.connection_id.to_string(),
                    source.record_type,
                    serde_json::to_string(&source.fields)?,
                    serde_json::to_string(&source.filter)?,
                    source.auto_refresh as i32,
                    source.refresh_interval_secs,
                    source.last_refresh.map(ts),
                    source.refresh_status.as_str(),
                    source.last_error,
                    source.max_records,
                    ts(source.created_at),
                ],
            )
            .map_err(|e| PrismError::Storage(format!("Failed to save data source: {}", e)))?;
            Ok(())
        })
    }

    /// Find a data source by ID.
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<DataSource>, PrismError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM data_sources WHERE id = ?1",
                    SOURCE_COLUMNS
                ))
                .map_err(|e| PrismError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![id.to_string()], |row| {
                    Ok(row_to_source(row))
                })
                .optional()
                .map_err(|e| PrismError::Storage(e.to_string()))?;

            match result {
                Some(s) => Ok(Some(s?)),
                None => Ok(None),
            }
        })
    }

    /// List all data sources, newest first.
    pub fn list(&self) -> Result<Vec<DataSource>, PrismError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM data_sources ORDER BY created_at DESC",
                    SOURCE_COLUMNS
                ))
                .map_err(|e| PrismError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| Ok(row_to_source(row)))
                .map_err(|e| PrismError::Storage(e.to_string()))?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(|e| PrismError::Storage(e.to_string()))??);
            }
            Ok(out)
        })
    }

    /// Data sources due for refresh at `now`.
    ///
    /// Due means: auto_refresh on, owning connection active, and either never
    /// refreshed or `now - last_refresh >= refresh_interval_secs`. Ordered
    /// oldest-first with never-refreshed sources leading, so no source can
    /// starve under load.
    pub fn due_sources(&self, now: DateTime<Utc>) -> Result<Vec<DataSource>, PrismError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM data_sources d
                     JOIN connections c ON c.id = d.connection_id
                     WHERE d.auto_refresh = 1
                       AND c.is_active = 1
                       AND (d.last_refresh IS NULL
                            OR ?1 - d.last_refresh >= d.refresh_interval_secs)
                     ORDER BY d.last_refresh IS NOT NULL, d.last_refresh ASC",
                    SOURCE_COLUMNS_QUALIFIED
                ))
                .map_err(|e| PrismError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![ts(now)], |row| Ok(row_to_source(row)))
                .map_err(|e| PrismError::Storage(e.to_string()))?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(|e| PrismError::Storage(e.to_string()))??);
            }
            Ok(out)
        })
    }

    /// Enable or disable auto-refresh (soft-deactivation of a source).
    pub fn set_auto_refresh(&self, id: Uuid, enabled: bool) -> Result<(), PrismError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE data_sources SET auto_refresh = ?2 WHERE id = ?1",
                    rusqlite::params![id.to_string(), enabled as i32],
                )
                .map_err(|e| PrismError::Storage(e.to_string()))?;
            if changed == 0 {
                return Err(PrismError::NotFound(format!("data source {}", id)));
            }
            Ok(())
        })
    }

    /// Mark a source as running at the start of an executor run.
    pub fn mark_running(&self, id: Uuid) -> Result<(), PrismError> {
        self.set_status(id, RefreshStatus::Running, None, None)
    }

    /// Record a successful run: status succeeded, last_refresh = run start.
    pub fn mark_succeeded(&self, id: Uuid, started_at: DateTime<Utc>) -> Result<(), PrismError> {
        self.set_status(id, RefreshStatus::Succeeded, Some(started_at), None)
    }

    /// Record a failed run. `last_refresh` is intentionally untouched so the
    /// due-schedule clock still derives from the last successful run.
    pub fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), PrismError> {
        self.set_status(id, RefreshStatus::Failed, None, Some(error))
    }

    fn set_status(
        &self,
        id: Uuid,
        status: RefreshStatus,
        last_refresh: Option<DateTime<Utc>>,
        error: Option<&str>,
    ) -> Result<(), PrismError> {
        self.db.with_conn(|conn| {
            let changed = match (last_refresh, status) {
                (Some(at), _) => conn.execute(
                    "UPDATE data_sources
                     SET refresh_status = ?2, last_refresh = ?3, last_error = NULL
                     WHERE id = ?1",
                    rusqlite::params![id.to_string(), status.as_str(), ts(at)],
                ),
                (None, RefreshStatus::Failed) => conn.execute(
                    "UPDATE data_sources SET refresh_status = ?2, last_error = ?3
                     WHERE id = ?1",
                    rusqlite::params![id.to_string(), status.as_str(), error],
                ),
                (None, _) => conn.execute(
                    "UPDATE data_sources SET refresh_status = ?2 WHERE id = ?1",
                    rusqlite::params![id.to_string(), status.as_str()],
                ),
            }
            .map_err(|e| PrismError::Storage(e.to_string()))?;
            if changed == 0 {
                return Err(PrismError::NotFound(format!("data source {}", id)));
            }
            Ok(())
        })
    }

    /// Reset any source left in `running` by a previous process.
    ///
    /// No in-memory lock can survive a restart, so a persisted `running`
    /// status is necessarily stale and would block future refreshes forever.
    /// Returns the IDs that were reset.
    pub fn reset_interrupted(&self) -> Result<Vec<Uuid>, PrismError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id FROM data_sources WHERE refresh_status = 'running'")
                .map_err(|e| PrismError::Storage(e.to_string()))?;
            let ids: Vec<String> = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| PrismError::Storage(e.to_string()))?
                .collect::<Result<_, _>>()
                .map_err(|e| PrismError::Storage(e.to_string()))?;

            conn.execute(
                "UPDATE data_sources
                 SET refresh_status = 'failed', last_error = 'recovered after restart'
                 WHERE refresh_status = 'running'",
                [],
            )
            .map_err(|e| PrismError::Storage(e.to_string()))?;

            ids.iter()
                .map(|s| {
                    Uuid::parse_str(s)
                        .map_err(|e| PrismError::Storage(format!("bad uuid in db: {}", e)))
                })
                .collect()
        })
    }
}

// =============================================================================
// RefreshLogRepository
// =============================================================================

/// Append-only repository for refresh audit entries.
#[derive(Clone)]
pub struct RefreshLogRepository {
    db: Arc<Database>,
}

impl RefreshLogRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append one audit entry. Entries are immutable once written.
    pub fn append(&self, entry: &RefreshAuditEntry) -> Result<(), PrismError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO refresh_log
                     (id, data_source_id, trigger_kind, started_at, ended_at, outcome,
                      records_fetched, records_inserted, records_updated,
                      records_removed, error_detail)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    entry.id.to_string(),
                    entry.data_source_id.to_string(),
                    entry.trigger.as_str(),
                    ts(entry.started_at),
                    entry.ended_at.map(ts),
                    entry.outcome.as_str(),
                    entry.records_fetched,
                    entry.records_inserted,
                    entry.records_updated,
                    entry.records_removed,
                    entry.error_detail,
                ],
            )
            .map_err(|e| PrismError::Storage(format!("Failed to append audit entry: {}", e)))?;
            Ok(())
        })
    }

    /// Audit entries for one source, newest first.
    pub fn list_for_source(
        &self,
        data_source_id: Uuid,
        limit: u64,
    ) -> Result<Vec<RefreshAuditEntry>, PrismError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, data_source_id, trigger_kind, started_at, ended_at, outcome,
                            records_fetched, records_inserted, records_updated,
                            records_removed, error_detail
                     FROM refresh_log
                     WHERE data_source_id = ?1
                     ORDER BY started_at DESC
                     LIMIT ?2",
                )
                .map_err(|e| PrismError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![data_source_id.to_string(), limit], |row| {
                    Ok(row_to_audit(row))
                })
                .map_err(|e| PrismError::Storage(e.to_string()))?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(|e| PrismError::Storage(e.to_string()))??);
            }
            Ok(out)
        })
    }

    /// Delete entries that started before the cutoff. Returns the count.
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, PrismError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM refresh_log WHERE started_at < ?1",
                rusqlite::params![ts(cutoff)],
            )
            .map_err(|e| PrismError::Storage(e.to_string()))
        })
    }
}

// =============================================================================
// Row mappers
// =============================================================================

const SOURCE_COLUMNS: &str = "id, name, connection_id, record_type, fields, filter, \
     auto_refresh, refresh_interval_secs, last_refresh, refresh_status, \
     last_error, max_records, created_at";

const SOURCE_COLUMNS_QUALIFIED: &str =
    "d.id, d.name, d.connection_id, d.record_type, d.fields, d.filter, \
     d.auto_refresh, d.refresh_interval_secs, d.last_refresh, d.refresh_status, \
     d.last_error, d.max_records, d.created_at";

fn row_to_connection(row: &rusqlite::Row<'_>) -> Result<SourceConnection, PrismError> {
    let id: String = row.get(0).map_err(storage_err)?;
    let secret: String = row.get(3).map_err(storage_err)?;
    Ok(SourceConnection {
        id: parse_uuid(&id)?,
        name: row.get(1).map_err(storage_err)?,
        account_id: row.get(2).map_err(storage_err)?,
        secret: Secret::new(secret),
        is_active: row.get::<_, i64>(4).map_err(storage_err)? != 0,
        auto_refresh: row.get::<_, i64>(5).map_err(storage_err)? != 0,
        refresh_interval_secs: row.get(6).map_err(storage_err)?,
        description: row.get(7).map_err(storage_err)?,
        created_at: from_ts(row.get(8).map_err(storage_err)?),
    })
}

fn row_to_source(row: &rusqlite::Row<'_>) -> Result<DataSource, PrismError> {
    let id: String = row.get(0).map_err(storage_err)?;
    let connection_id: String = row.get(2).map_err(storage_err)?;
    let fields: String = row.get(4).map_err(storage_err)?;
    let filter: String = row.get(5).map_err(storage_err)?;
    let status: String = row.get(9).map_err(storage_err)?;
    Ok(DataSource {
        id: parse_uuid(&id)?,
        name: row.get(1).map_err(storage_err)?,
        connection_id: parse_uuid(&connection_id)?,
        record_type: row.get(3).map_err(storage_err)?,
        fields: serde_json::from_str(&fields)?,
        filter: serde_json::from_str(&filter)?,
        auto_refresh: row.get::<_, i64>(6).map_err(storage_err)? != 0,
        refresh_interval_secs: row.get(7).map_err(storage_err)?,
        last_refresh: row
            .get::<_, Option<i64>>(8)
            .map_err(storage_err)?
            .map(from_ts),
        refresh_status: status.parse()?,
        last_error: row.get(10).map_err(storage_err)?,
        max_records: row.get(11).map_err(storage_err)?,
        created_at: from_ts(row.get(12).map_err(storage_err)?),
    })
}

fn row_to_audit(row: &rusqlite::Row<'_>) -> Result<RefreshAuditEntry, PrismError> {
    let id: String = row.get(0).map_err(storage_err)?;
    let data_source_id: String = row.get(1).map_err(storage_err)?;
    let trigger: String = row.get(2).map_err(storage_err)?;
    let outcome: String = row.get(5).map_err(storage_err)?;
    Ok(RefreshAuditEntry {
        id: parse_uuid(&id)?,
        data_source_id: parse_uuid(&data_source_id)?,
        trigger: trigger.parse::<RefreshTrigger>()?,
        started_at: from_ts(row.get(3).map_err(storage_err)?),
        ended_at: row
            .get::<_, Option<i64>>(4)
            .map_err(storage_err)?
            .map(from_ts),
        outcome: outcome.parse::<RefreshOutcome>()?,
        records_fetched: row.get(6).map_err(storage_err)?,
        records_inserted: row.get(7).map_err(storage_err)?,
        records_updated: row.get(8).map_err(storage_err)?,
        records_removed: row.get(9).map_err(storage_err)?,
        error_detail: row.get(10).map_err(storage_err)?,
    })
}

fn parse_uuid(s: &str) -> Result<Uuid, PrismError> {
    Uuid::parse_str(s).map_err(|e| PrismError::Storage(format!("bad uuid in db: {}", e)))
}

fn storage_err(e: rusqlite::Error) -> PrismError {
    PrismError::Storage(e.to_string())
}

// =============================================================================
// Tests
// =============================================================================
