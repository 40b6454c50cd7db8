//! Synced record cache and snapshot reconciliation.
//!
//! Each data source owns one locally cached snapshot of its upstream rows.
//! A refresh replaces that snapshot wholesale: the fetch result is ground
//! truth, never a delta. Reconciliation runs inside a single transaction so
//! concurrent readers observe either the old snapshot or the new one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use prism_core::error::PrismError;
use prism_core::types::{FetchedRecord, SyncedRecord};

use crate::db::Database;

/// Per-kind row counts produced by one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileCounts {
    pub fetched: i64,
    pub inserted: i64,
    pub updated: i64,
    pub removed: i64,
}

/// Store for locally cached upstream records.
#[derive(Clone)]
pub struct RecordStore {
    db: Arc<Database>,
}

impl RecordStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Replace the cached snapshot for a data source with a fetch result.
    ///
    /// Upserts by natural key and removes any stored record whose key is
    /// absent from the fetch. Rows whose field values are unchanged are left
    /// alone, so repeating a run against an unchanged upstream is a no-op.
    /// `max_records` caps how many fetched rows are kept; the overflow is
    /// dropped but still counted in `fetched`.
    pub fn replace_snapshot(
        &self,
        data_source_id: Uuid,
        fetched: &[FetchedRecord],
        max_records: i64,
        now: DateTime<Utc>,
    ) -> Result<ReconcileCounts, PrismError> {
        let ds = data_source_id.to_string();
        let kept = &fetched[..fetched.len().min(max_records.max(0) as usize)];

        self.db.with_tx(|tx| {
            let mut counts = ReconcileCounts {
                fetched: fetched.len() as i64,
                ..Default::default()
            };

            // Current snapshot, keyed by natural key.
            let mut existing: HashMap<String, String> = HashMap::new();
            {
                let mut stmt = tx
                    .prepare(
                        "SELECT external_id, field_values FROM synced_records
                         WHERE data_source_id = ?1",
                    )
                    .map_err(|e| PrismError::Storage(e.to_string()))?;
                let rows = stmt
                    .query_map(rusqlite::params![ds], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })
                    .map_err(|e| PrismError::Storage(e.to_string()))?;
                for row in rows {
                    let (key, values) = row.map_err(|e| PrismError::Storage(e.to_string()))?;
                    existing.insert(key, values);
                }
            }

            let mut seen: HashSet<&str> = HashSet::with_capacity(kept.len());
            for record in kept {
                // Later duplicates of the same natural key are ignored; the
                // first occurrence wins.
                if !seen.insert(record.external_id.as_str()) {
                    continue;
                }
                let serialized = serde_json::to_string(&record.values)?;
                match existing.get(&record.external_id) {
                    Some(current) if *current == serialized => {}
                    Some(_) => {
                        tx.execute(
                            "UPDATE synced_records
                             SET field_values = ?3, synced_at = ?4
                             WHERE data_source_id = ?1 AND external_id = ?2",
                            rusqlite::params![ds, record.external_id, serialized, now.timestamp()],
                        )
                        .map_err(|e| PrismError::Storage(e.to_string()))?;
                        counts.updated += 1;
                    }
                    None => {
                        tx.execute(
                            "INSERT INTO synced_records
                                 (data_source_id, external_id, field_values, synced_at)
                             VALUES (?1, ?2, ?3, ?4)",
                            rusqlite::params![ds, record.external_id, serialized, now.timestamp()],
                        )
                        .map_err(|e| PrismError::Storage(e.to_string()))?;
                        counts.inserted += 1;
                    }
                }
            }

            // Anything stored but absent upstream is gone.
            for stale in existing.keys().filter(|k| !seen.contains(k.as_str())) {
                tx.execute(
                    "DELETE FROM synced_records
                     WHERE data_source_id = ?1 AND external_id = ?2",
                    rusqlite::params![ds, stale],
                )
                .map_err(|e| PrismError::Storage(e.to_string()))?;
                counts.removed += 1;
            }

            Ok(counts)
        })
    }

    /// All cached records for a source, ordered by natural key.
    pub fn records_for_source(
        &self,
        data_source_id: Uuid,
    ) -> Result<Vec<SyncedRecord>, PrismError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT external_id, field_values, synced_at FROM synced_records
                     WHERE data_source_id = ?1
                     ORDER BY external_id ASC",
                )
                .map_err(|e| PrismError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(rusqlite::params![data_source_id.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })
                .map_err(|e| PrismError::Storage(e.to_string()))?;

            let mut out = Vec::new();
            for row in rows {
                let (external_id, values, synced_at) =
                    row.map_err(|e| PrismError::Storage(e.to_string()))?;
                out.push(SyncedRecord {
                    data_source_id,
                    external_id,
                    values: serde_json::from_str(&values)?,
                    synced_at: Utc
                        .timestamp_opt(synced_at, 0)
                        .single()
                        .unwrap_or_default(),
                });
            }
            Ok(out)
        })
    }

    /// Count cached records for a source.
    pub fn count_for_source(&self, data_source_id: Uuid) -> Result<u64, PrismError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM synced_records WHERE data_source_id = ?1",
                    rusqlite::params![data_source_id.to_string()],
                    |row| row.get(0),
                )
                .map_err(|e| PrismError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }

    /// First `limit` records for a source, for tabular previews.
    pub fn preview(
        &self,
        data_source_id: Uuid,
        limit: u64,
    ) -> Result<Vec<SyncedRecord>, PrismError> {
        let mut records = self.records_for_source(data_source_id)?;
        records.truncate(limit as usize);
        Ok(records)
    }
}

// =============================================================================
// Tests
// =============================================================================
