//! Chat transcript persistence.
//!
//! Sessions and messages live in SQLite. Message appends run inside a
//! transaction that assigns the next per-session sequence number and bumps
//! the session's last-activity timestamp, so transcripts have no gaps and
//! no reordering even when two appends land in the same second.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use prism_core::error::PrismError;
use prism_core::types::{ChatMessage, ChatSession, TurnState};

use crate::db::Database;

/// Repository for chat sessions and their transcripts.
#[derive(Clone)]
pub struct ChatStore {
    db: Arc<Database>,
}

impl ChatStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    // -----------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------

    /// Store a new session.
    pub fn create_session(&self, session: &ChatSession) -> Result<(), PrismError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chat_sessions
                     (id, user_id, title, is_active, turn_state, context,
                      created_at, last_activity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    session.id.to_string(),
                    session.user_id,
                    session.title,
                    session.is_active as i32,
                    session.turn_state.as_str(),
                    serde_json::to_string(&session.context)?,
                    session.created_at.timestamp(),
                    session.last_activity.timestamp(),
                ],
            )
            .map_err(|e| PrismError::Storage(format!("Failed to save session: {}", e)))?;
            Ok(())
        })
    }

    /// Find a session by ID.
    pub fn find_session(&self, id: Uuid) -> Result<Option<ChatSession>, PrismError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, user_id, title, is_active, turn_state, context,
                            created_at, last_activity
                     FROM chat_sessions WHERE id = ?1",
                )
                .map_err(|e| PrismError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![id.to_string()], |row| {
                    Ok(row_to_session(row))
                })
                .optional()
                .map_err(|e| PrismError::Storage(e.to_string()))?;

            match result {
                Some(s) => Ok(Some(s?)),
                None => Ok(None),
            }
        })
    }

    /// List sessions for one user, most recently active first.
    pub fn sessions_for_user(&self, user_id: &str) -> Result<Vec<ChatSession>, PrismError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, user_id, title, is_active, turn_state, context,
                            created_at, last_activity
                     FROM chat_sessions
                     WHERE user_id = ?1
                     ORDER BY last_activity DESC",
                )
                .map_err(|e| PrismError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![user_id], |row| Ok(row_to_session(row)))
                .map_err(|e| PrismError::Storage(e.to_string()))?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(|e| PrismError::Storage(e.to_string()))??);
            }
            Ok(out)
        })
    }

    /// Update the turn-taking state of a session.
    pub fn set_turn_state(&self, id: Uuid, state: TurnState) -> Result<(), PrismError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE chat_sessions SET turn_state = ?2 WHERE id = ?1",
                    rusqlite::params![id.to_string(), state.as_str()],
                )
                .map_err(|e| PrismError::Storage(e.to_string()))?;
            if changed == 0 {
                return Err(PrismError::NotFound(format!("session {}", id)));
            }
            Ok(())
        })
    }

    /// Deactivate a session. Terminal and idempotent; the transcript stays.
    pub fn deactivate_session(&self, id: Uuid) -> Result<(), PrismError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE chat_sessions SET is_active = 0, turn_state = 'active'
                     WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                )
                .map_err(|e| PrismError::Storage(e.to_string()))?;
            if changed == 0 {
                return Err(PrismError::NotFound(format!("session {}", id)));
            }
            Ok(())
        })
    }

    // -----------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------

    /// Append one message to a session's transcript.
    ///
    /// Assigns the next sequence number and bumps the session's
    /// last-activity timestamp in the same transaction. The `seq` field of
    /// the passed message is ignored; the assigned value is returned.
    pub fn append_message(&self, message: &ChatMessage) -> Result<i64, PrismError> {
        self.db.with_tx(|tx| insert_message(tx, message))
    }

    /// Atomically start a turn: flip the session from `active` to
    /// `awaiting_reply` and append the user message, in one transaction.
    ///
    /// Returns `None` without side effects when the session is missing,
    /// deactivated, or already awaiting a reply. The conditional update is
    /// what makes two concurrent posts on one session safe: exactly one of
    /// them wins the flip.
    pub fn begin_turn(&self, message: &ChatMessage) -> Result<Option<i64>, PrismError> {
        self.db.with_tx(|tx| {
            let sid = message.session_id.to_string();
            let flipped = tx
                .execute(
                    "UPDATE chat_sessions SET turn_state = 'awaiting_reply'
                     WHERE id = ?1 AND is_active = 1 AND turn_state = 'active'",
                    rusqlite::params![sid],
                )
                .map_err(|e| PrismError::Storage(e.to_string()))?;
            if flipped == 0 {
                return Ok(None);
            }
            Ok(Some(insert_message(tx, message)?))
        })
    }

    /// Atomically finish a turn: append the reply and flip the session back
    /// to `active`.
    pub fn complete_turn(&self, message: &ChatMessage) -> Result<i64, PrismError> {
        self.db.with_tx(|tx| {
            let seq = insert_message(tx, message)?;
            tx.execute(
                "UPDATE chat_sessions SET turn_state = 'active' WHERE id = ?1",
                rusqlite::params![message.session_id.to_string()],
            )
            .map_err(|e| PrismError::Storage(e.to_string()))?;
            Ok(seq)
        })
    }

    /// The ordered transcript for a session: (timestamp, seq) ascending,
    /// which is exactly append order.
    pub fn messages_for_session(&self, id: Uuid) -> Result<Vec<ChatMessage>, PrismError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, session_id, seq, role, content, content_type, payload,
                            source_query, processing_ms, created_at
                     FROM chat_messages
                     WHERE session_id = ?1
                     ORDER BY created_at ASC, seq ASC",
                )
                .map_err(|e| PrismError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![id.to_string()], |row| {
                    Ok(row_to_message(row))
                })
                .map_err(|e| PrismError::Storage(e.to_string()))?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(|e| PrismError::Storage(e.to_string()))??);
            }
            Ok(out)
        })
    }

    /// Count messages in a session.
    pub fn message_count(&self, id: Uuid) -> Result<u64, PrismError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM chat_messages WHERE session_id = ?1",
                    rusqlite::params![id.to_string()],
                    |row| row.get(0),
                )
                .map_err(|e| PrismError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }
}

/// Assign the next per-session seq, insert the row, and bump the session's
/// last-activity timestamp. Must run inside a transaction.
fn insert_message(
    tx: &rusqlite::Transaction<'_>,
    message: &ChatMessage,
) -> Result<i64, PrismError> {
    let sid = message.session_id.to_string();
    let seq: i64 = tx
        .query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM chat_messages WHERE session_id = ?1",
            rusqlite::params![sid],
            |row| row.get(0),
        )
        .map_err(|e| PrismError::Storage(e.to_string()))?;

    tx.execute(
        "INSERT INTO chat_messages
             (id, session_id, seq, role, content, content_type, payload,
              source_query, processing_ms, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            message.id.to_string(),
            sid,
            seq,
            message.role.as_str(),
            message.content,
            message.content_type.as_str(),
            message
                .payload
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            message.source_query,
            message.processing_ms,
            message.created_at.timestamp(),
        ],
    )
    .map_err(|e| PrismError::Storage(format!("Failed to append message: {}", e)))?;

    tx.execute(
        "UPDATE chat_sessions SET last_activity = ?2 WHERE id = ?1",
        rusqlite::params![sid, message.created_at.timestamp()],
    )
    .map_err(|e| PrismError::Storage(e.to_string()))?;

    Ok(seq)
}

// =============================================================================
// Row mappers
// =============================================================================

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<ChatSession, PrismError> {
    let id: String = row.get(0).map_err(storage_err)?;
    let turn_state: String = row.get(4).map_err(storage_err)?;
    let context: String = row.get(5).map_err(storage_err)?;
    Ok(ChatSession {
        id: parse_uuid(&id)?,
        user_id: row.get(1).map_err(storage_err)?,
        title: row.get(2).map_err(storage_err)?,
        is_active: row.get::<_, i64>(3).map_err(storage_err)? != 0,
        turn_state: turn_state.parse()?,
        context: serde_json::from_str(&context)?,
        created_at: epoch(row.get(6).map_err(storage_err)?),
        last_activity: epoch(row.get(7).map_err(storage_err)?),
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<ChatMessage, PrismError> {
    let id: String = row.get(0).map_err(storage_err)?;
    let session_id: String = row.get(1).map_err(storage_err)?;
    let role: String = row.get(3).map_err(storage_err)?;
    let content_type: String = row.get(5).map_err(storage_err)?;
    let payload: Option<String> = row.get(6).map_err(storage_err)?;
    Ok(ChatMessage {
        id: parse_uuid(&id)?,
        session_id: parse_uuid(&session_id)?,
        seq: row.get(2).map_err(storage_err)?,
        role: role.parse()?,
        content: row.get(4).map_err(storage_err)?,
        content_type: content_type.parse()?,
        payload: payload.map(|p| serde_json::from_str(&p)).transpose()?,
        source_query: row.get(7).map_err(storage_err)?,
        processing_ms: row.get(8).map_err(storage_err)?,
        created_at: epoch(row.get(9).map_err(storage_err)?),
    })
}

fn parse_uuid(s: &str) -> Result<Uuid, PrismError> {
    Uuid::parse_str(s).map_err(|e| PrismError::Storage(format!("bad uuid in db: {}", e)))
}

fn epoch(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

fn storage_err(e: rusqlite::Error) -> PrismError {
    PrismError::Storage(e.to_string())
}

// =============================================================================
// Tests
// =============================================================================
