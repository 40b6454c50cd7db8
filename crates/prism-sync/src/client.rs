//! External record-source client interface.
//!
//! The executor talks to the upstream provider exclusively through the
//! [`RecordSource`] trait, so the pipeline can be exercised against any
//! backend. The provider's authentication handshake lives behind the
//! implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use prism_core::types::FetchedRecord;

/// A structured upstream query: record type, field projection, and filter
/// predicate. Never raw query text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub record_type: String,
    /// Fields to project. Empty means all fields.
    pub fields: Vec<String>,
    /// Equality predicates as a JSON object: field name to required value.
    pub filter: serde_json::Value,
}

impl QueryDescriptor {
    pub fn new(
        record_type: impl Into<String>,
        fields: Vec<String>,
        filter: serde_json::Value,
    ) -> Self {
        Self {
            record_type: record_type.into(),
            fields,
            filter,
        }
    }

    /// Minimal one-row descriptor used by connection tests.
    pub fn probe(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            fields: vec!["id".to_string()],
            filter: serde_json::json!({}),
        }
    }
}

/// Upstream failure, split by whether a retry can help.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Network trouble, timeouts. Retried with backoff.
    #[error("transient upstream error: {0}")]
    Transient(String),
    /// Bad credentials, malformed queries. Never retried.
    #[error("permanent upstream error: {0}")]
    Permanent(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

/// Client for one upstream record API.
///
/// Object-safe so executors can hold `Arc<dyn RecordSource>`.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch the full current snapshot matching the descriptor.
    ///
    /// The result is treated as ground truth for the data source at this
    /// instant, never as a delta.
    async fn fetch(&self, descriptor: &QueryDescriptor)
        -> Result<Vec<FetchedRecord>, SourceError>;

    /// Cheap liveness probe used by `test-connection`.
    async fn probe(&self) -> Result<(), SourceError> {
        self.fetch(&QueryDescriptor::probe("customer"))
            .await
            .map(|_| ())
    }
}

// =============================================================================
// StaticSource
// =============================================================================

/// Deterministic in-memory record source.
///
/// Serves fixture data keyed by record type, honoring the descriptor's field
/// projection and equality filter. Used by the composition root when no real
/// provider is wired, and by tests.
#[derive(Default)]
pub struct StaticSource {
    tables: std::collections::HashMap<String, Vec<FetchedRecord>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register fixture records for a record type, replacing any previous set.
    pub fn with_records(mut self, record_type: impl Into<String>, records: Vec<FetchedRecord>) -> Self {
        self.tables.insert(record_type.into(), records);
        self
    }
}

#[async_trait]
impl RecordSource for StaticSource {
    async fn fetch(
        &self,
        descriptor: &QueryDescriptor,
    ) -> Result<Vec<FetchedRecord>, SourceError> {
        let rows = self
            .tables
            .get(&descriptor.record_type)
            .ok_or_else(|| {
                SourceError::Permanent(format!(
                    "unknown record type: {}",
                    descriptor.record_type
                ))
            })?;

        let filter = descriptor.filter.as_object();
        let mut out = Vec::new();
        for row in rows {
            let matches = filter.map_or(true, |predicates| {
                predicates
                    .iter()
                    .all(|(field, expected)| row.values.get(field) == Some(expected))
            });
            if !matches {
                continue;
            }
            out.push(FetchedRecord {
                external_id: row.external_id.clone(),
                values: project(&row.values, &descriptor.fields),
            });
        }
        Ok(out)
    }
}

/// Keep only the projected fields. An empty projection keeps everything.
fn project(values: &serde_json::Value, fields: &[String]) -> serde_json::Value {
    if fields.is_empty() {
        return values.clone();
    }
    let Some(map) = values.as_object() else {
        return values.clone();
    };
    let projected: serde_json::Map<String, serde_json::Value> = map
        .iter()
        .filter(|(k, _)| fields.iter().any(|f| f == *k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    serde_json::Value::Object(projected)
}

// =============================================================================
// Tests
// =============================================================================
