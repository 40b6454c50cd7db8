use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PrismError;

// =============================================================================
// Credential material
// =============================================================================

/// Opaque credential material for an upstream account.
///
/// Write-only from the perspective of every outward-facing surface: `Debug`,
/// `Display`, and `Serialize` all emit a fixed placeholder. The raw value is
/// only reachable through [`Secret::expose`], which the storage layer and the
/// source client use when building authenticated requests.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Secret(String);

/// Placeholder returned on every read path instead of the raw secret.
pub const SECRET_PLACEHOLDER: &str = "[redacted]";

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw credential. Callers outside storage and the source
    /// client should not need this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(SECRET_PLACEHOLDER)
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(SECRET_PLACEHOLDER)
    }
}

impl Serialize for Secret {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(SECRET_PLACEHOLDER)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Refresh state of a data source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    /// Never refreshed, or refresh settings changed since the last run.
    #[default]
    Idle,
    /// An executor currently holds the refresh lock for this source.
    Running,
    /// The most recent run completed and the snapshot was reconciled.
    Succeeded,
    /// The most recent run failed; the previous snapshot is untouched.
    Failed,
}

impl RefreshStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshStatus::Idle => "idle",
            RefreshStatus::Running => "running",
            RefreshStatus::Succeeded => "succeeded",
            RefreshStatus::Failed => "failed",
        }
    }
}

impl FromStr for RefreshStatus {
    type Err = PrismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(RefreshStatus::Idle),
            "running" => Ok(RefreshStatus::Running),
            "succeeded" => Ok(RefreshStatus::Succeeded),
            "failed" => Ok(RefreshStatus::Failed),
            other => Err(PrismError::Storage(format!(
                "unknown refresh status: {}",
                other
            ))),
        }
    }
}

/// Outcome of a single executor run attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// The snapshot was fetched and reconciled.
    Success,
    /// The run failed after exhausting retries (or on a permanent error).
    Failure,
    /// Another run already held the lock; nothing was fetched.
    SkippedLockHeld,
}

impl RefreshOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshOutcome::Success => "success",
            RefreshOutcome::Failure => "failure",
            RefreshOutcome::SkippedLockHeld => "skipped_lock_held",
        }
    }
}

impl FromStr for RefreshOutcome {
    type Err = PrismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(RefreshOutcome::Success),
            "failure" => Ok(RefreshOutcome::Failure),
            "skipped_lock_held" => Ok(RefreshOutcome::SkippedLockHeld),
            other => Err(PrismError::Storage(format!(
                "unknown refresh outcome: {}",
                other
            ))),
        }
    }
}

/// How a refresh run was initiated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTrigger {
    /// Operator-initiated via the CLI.
    Manual,
    /// Enqueued by the scheduler tick.
    Scheduled,
    /// Written by the startup sweep that resets interrupted runs.
    Recovery,
}

impl RefreshTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshTrigger::Manual => "manual",
            RefreshTrigger::Scheduled => "scheduled",
            RefreshTrigger::Recovery => "recovery",
        }
    }
}

impl FromStr for RefreshTrigger {
    type Err = PrismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(RefreshTrigger::Manual),
            "scheduled" => Ok(RefreshTrigger::Scheduled),
            "recovery" => Ok(RefreshTrigger::Recovery),
            other => Err(PrismError::Storage(format!(
                "unknown refresh trigger: {}",
                other
            ))),
        }
    }
}

/// Author role of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

impl FromStr for MessageRole {
    type Err = PrismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            other => Err(PrismError::Storage(format!("unknown role: {}", other))),
        }
    }
}

/// Payload kind attached to a chat message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageContentType {
    /// Plain conversational text.
    #[default]
    Text,
    /// Text plus a chart configuration payload.
    Chart,
    /// Text plus a tabular data preview payload.
    Data,
    /// A system-role message describing a generation failure.
    Error,
}

impl MessageContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageContentType::Text => "text",
            MessageContentType::Chart => "chart",
            MessageContentType::Data => "data",
            MessageContentType::Error => "error",
        }
    }
}

impl FromStr for MessageContentType {
    type Err = PrismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageContentType::Text),
            "chart" => Ok(MessageContentType::Chart),
            "data" => Ok(MessageContentType::Data),
            "error" => Ok(MessageContentType::Error),
            other => Err(PrismError::Storage(format!(
                "unknown content type: {}",
                other
            ))),
        }
    }
}

/// Turn-taking state of a chat session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// Ready to accept the next user message.
    #[default]
    Active,
    /// A user message was posted and its reply is being generated.
    AwaitingReply,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Active => "active",
            TurnState::AwaitingReply => "awaiting_reply",
        }
    }
}

impl FromStr for TurnState {
    type Err = PrismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TurnState::Active),
            "awaiting_reply" => Ok(TurnState::AwaitingReply),
            other => Err(PrismError::Storage(format!(
                "unknown turn state: {}",
                other
            ))),
        }
    }
}

// =============================================================================
// Sync entities
// =============================================================================

/// Credentials and identity for one upstream account.
///
/// Never hard-deleted while referenced by a [`DataSource`]; deactivation
/// clears `is_active` instead.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConnection {
    pub id: Uuid,
    pub name: String,
    /// Account identifier at the upstream provider.
    pub account_id: String,
    /// Opaque credential material; redacted on every read path.
    pub secret: Secret,
    pub is_active: bool,
    pub auto_refresh: bool,
    /// Default refresh interval for sources under this connection, seconds.
    pub refresh_interval_secs: i64,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A named, filtered view of one upstream record type. The unit of refresh
/// scheduling.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataSource {
    pub id: Uuid,
    pub name: String,
    pub connection_id: Uuid,
    /// Upstream record type, e.g. "customer" or "transaction".
    pub record_type: String,
    /// Field projection applied to each fetched record.
    pub fields: Vec<String>,
    /// Structured filter predicate forwarded to the upstream query. Never
    /// raw query text.
    pub filter: serde_json::Value,
    pub auto_refresh: bool,
    pub refresh_interval_secs: i64,
    /// Start time of the last successful run. `None` until the first success.
    pub last_refresh: Option<DateTime<Utc>>,
    pub refresh_status: RefreshStatus,
    pub last_error: Option<String>,
    /// Upper bound on records kept per snapshot.
    pub max_records: i64,
    pub created_at: DateTime<Utc>,
}

/// One record as returned by an upstream fetch, before reconciliation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FetchedRecord {
    /// The upstream system's stable identifier (natural key).
    pub external_id: String,
    /// Field name to value mapping, already projected.
    pub values: serde_json::Value,
}

/// One upstream row cached locally. `(data_source_id, external_id)` is unique.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncedRecord {
    pub data_source_id: Uuid,
    /// The upstream system's stable identifier (natural key).
    pub external_id: String,
    /// Field name to value mapping.
    pub values: serde_json::Value,
    pub synced_at: DateTime<Utc>,
}

/// Append-only log row, written exactly once per executor run attempt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefreshAuditEntry {
    pub id: Uuid,
    pub data_source_id: Uuid,
    pub trigger: RefreshTrigger,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: RefreshOutcome,
    pub records_fetched: i64,
    pub records_inserted: i64,
    pub records_updated: i64,
    pub records_removed: i64,
    pub error_detail: Option<String>,
}

impl RefreshAuditEntry {
    /// Run duration in seconds, if the run has ended.
    pub fn duration_secs(&self) -> Option<i64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_seconds())
    }
}

// =============================================================================
// Chat entities
// =============================================================================

/// One conversation. Never hard-deleted, only deactivated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub is_active: bool,
    pub turn_state: TurnState,
    /// What the user was viewing when the session started.
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// One turn in a conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    /// Position within the session; strictly increasing, assigned on append.
    pub seq: i64,
    pub role: MessageRole,
    pub content: String,
    pub content_type: MessageContentType,
    /// Chart configuration or tabular preview, when content_type warrants.
    pub payload: Option<serde_json::Value>,
    /// The sub-request text a data/chart reply was derived from.
    pub source_query: Option<String>,
    pub processing_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Secret redaction ----

    #[test]
    fn test_secret_debug_redacted() {
        let s = Secret::new("tok_super_secret");
        assert_eq!(format!("{:?}", s), SECRET_PLACEHOLDER);
        assert_eq!(format!("{}", s), SECRET_PLACEHOLDER);
    }

    #[test]
    fn test_secret_serialize_redacted() {
        let s = Secret::new("tok_super_secret");
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, format!("\"{}\"", SECRET_PLACEHOLDER));
        assert!(!json.contains("super_secret"));
    }

    #[test]
    fn test_secret_expose_returns_raw() {
        let s = Secret::new("tok_super_secret");
        assert_eq!(s.expose(), "tok_super_secret");
    }

    #[test]
    fn test_secret_deserializes_raw_value() {
        let s: Secret = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(s.expose(), "abc");
    }

    // ---- Enum string round-trips ----

    #[test]
    fn test_refresh_status_round_trip() {
        for status in [
            RefreshStatus::Idle,
            RefreshStatus::Running,
            RefreshStatus::Succeeded,
            RefreshStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RefreshStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_refresh_status_unknown_rejected() {
        assert!("pending".parse::<RefreshStatus>().is_err());
    }

    #[test]
    fn test_refresh_outcome_round_trip() {
        for outcome in [
            RefreshOutcome::Success,
            RefreshOutcome::Failure,
            RefreshOutcome::SkippedLockHeld,
        ] {
            assert_eq!(outcome.as_str().parse::<RefreshOutcome>().unwrap(), outcome);
        }
    }

    #[test]
    fn test_trigger_round_trip() {
        assert_eq!("manual".parse::<RefreshTrigger>().unwrap(), RefreshTrigger::Manual);
        assert_eq!(
            "scheduled".parse::<RefreshTrigger>().unwrap(),
            RefreshTrigger::Scheduled
        );
    }

    #[test]
    fn test_role_round_trip() {
        for role in [MessageRole::User, MessageRole::Assistant, MessageRole::System] {
            assert_eq!(role.as_str().parse::<MessageRole>().unwrap(), role);
        }
    }

    #[test]
    fn test_content_type_round_trip() {
        for ct in [
            MessageContentType::Text,
            MessageContentType::Chart,
            MessageContentType::Data,
            MessageContentType::Error,
        ] {
            assert_eq!(ct.as_str().parse::<MessageContentType>().unwrap(), ct);
        }
    }

    #[test]
    fn test_turn_state_round_trip() {
        assert_eq!("active".parse::<TurnState>().unwrap(), TurnState::Active);
        assert_eq!(
            "awaiting_reply".parse::<TurnState>().unwrap(),
            TurnState::AwaitingReply
        );
    }

    #[test]
    fn test_serde_snake_case_names() {
        assert_eq!(
            serde_json::to_string(&RefreshOutcome::SkippedLockHeld).unwrap(),
            "\"skipped_lock_held\""
        );
        assert_eq!(
            serde_json::to_string(&TurnState::AwaitingReply).unwrap(),
            "\"awaiting_reply\""
        );
    }

    // ---- Audit duration ----

    #[test]
    fn test_audit_duration() {
        let start = Utc::now();
        let entry = RefreshAuditEntry {
            id: Uuid::new_v4(),
            data_source_id: Uuid::new_v4(),
            trigger: RefreshTrigger::Manual,
            started_at: start,
            ended_at: Some(start + chrono::Duration::seconds(42)),
            outcome: RefreshOutcome::Success,
            records_fetched: 10,
            records_inserted: 3,
            records_updated: 7,
            records_removed: 0,
            error_detail: None,
        };
        assert_eq!(entry.duration_secs(), Some(42));
    }

    #[test]
    fn test_audit_duration_open_ended() {
        let entry = RefreshAuditEntry {
            id: Uuid::new_v4(),
            data_source_id: Uuid::new_v4(),
            trigger: RefreshTrigger::Scheduled,
            started_at: Utc::now(),
            ended_at: None,
            outcome: RefreshOutcome::Failure,
            records_fetched: 0,
            records_inserted: 0,
            records_updated: 0,
            records_removed: 0,
            error_detail: Some("timeout".into()),
        };
        assert_eq!(entry.duration_secs(), None);
    }

    // ---- Connection serialization hides the secret ----

    #[test]
    fn test_connection_serialization_redacts_secret() {
        let conn = SourceConnection {
            id: Uuid::new_v4(),
            name: "prod".into(),
            account_id: "ACME-1".into(),
            secret: Secret::new("tok_raw"),
            is_active: true,
            auto_refresh: true,
            refresh_interval_secs: 1800,
            description: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&conn).unwrap();
        assert!(!json.contains("tok_raw"));
        assert!(json.contains(SECRET_PLACEHOLDER));
    }
}
