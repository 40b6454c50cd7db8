//! Database schema migrations.
//!
//! Applies the initial schema: connections, data_sources, synced_records,
//! refresh_log, chat_sessions, chat_messages, and the schema_migrations
//! tracking table.

use rusqlite::Connection;
use tracing::info;

use prism_core::error::PrismError;

/// Run all pending database migrations.
///
/// Currently implements the initial schema (version 1). Future migrations
/// can be added by checking the current version and applying incremental
/// changes.
pub fn run_migrations(conn: &Connection) -> Result<(), PrismError> {
    // Create the migrations tracking table first.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| PrismError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| PrismError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), PrismError> {
    conn.execute_batch(
        "
        -- Upstream account credentials. Soft-deactivated, never hard-deleted
        -- while data sources reference them.
        CREATE TABLE IF NOT EXISTS connections (
            id                      TEXT PRIMARY KEY NOT NULL,
            name                    TEXT NOT NULL UNIQUE,
            account_id              TEXT NOT NULL,
            secret                  TEXT NOT NULL,
            is_active               INTEGER NOT NULL DEFAULT 1,
            auto_refresh            INTEGER NOT NULL DEFAULT 1,
            refresh_interval_secs   INTEGER NOT NULL DEFAULT 1800,
            description             TEXT,
            created_at              INTEGER NOT NULL
        );

        -- Named, filtered views of one upstream record type.
        CREATE TABLE IF NOT EXISTS data_sources (
            id                      TEXT PRIMARY KEY NOT NULL,
            name                    TEXT NOT NULL,
            connection_id           TEXT NOT NULL REFERENCES connections (id),
            record_type             TEXT NOT NULL,
            fields                  TEXT NOT NULL DEFAULT '[]',
            filter                  TEXT NOT NULL DEFAULT '{}',
            auto_refresh            INTEGER NOT NULL DEFAULT 1,
            refresh_interval_secs   INTEGER NOT NULL DEFAULT 1800,
            last_refresh            INTEGER,
            refresh_status          TEXT NOT NULL DEFAULT 'idle'
                                    CHECK (refresh_status IN
                                           ('idle', 'running', 'succeeded', 'failed')),
            last_error              TEXT,
            max_records             INTEGER NOT NULL DEFAULT 10000,
            created_at              INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_data_sources_connection
            ON data_sources (connection_id);

        CREATE INDEX IF NOT EXISTS idx_data_sources_due
            ON data_sources (auto_refresh, last_refresh ASC);

        -- Locally cached upstream rows, one snapshot per data source.
        CREATE TABLE IF NOT EXISTS synced_records (
            data_source_id  TEXT NOT NULL,
            external_id     TEXT NOT NULL,
            field_values    TEXT NOT NULL,
            synced_at       INTEGER NOT NULL,
            PRIMARY KEY (data_source_id, external_id)
        );

        -- Append-only refresh audit log.
        CREATE TABLE IF NOT EXISTS refresh_log (
            id                TEXT PRIMARY KEY NOT NULL,
            data_source_id    TEXT NOT NULL,
            trigger_kind      TEXT NOT NULL
                              CHECK (trigger_kind IN ('manual', 'scheduled', 'recovery')),
            started_at        INTEGER NOT NULL,
            ended_at          INTEGER,
            outcome           TEXT NOT NULL
                              CHECK (outcome IN
                                     ('success', 'failure', 'skipped_lock_held')),
            records_fetched   INTEGER NOT NULL DEFAULT 0,
            records_inserted  INTEGER NOT NULL DEFAULT 0,
            records_updated   INTEGER NOT NULL DEFAULT 0,
            records_removed   INTEGER NOT NULL DEFAULT 0,
            error_detail      TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_refresh_log_source
            ON refresh_log (data_source_id, started_at DESC);

        CREATE INDEX IF NOT EXISTS idx_refresh_log_started
            ON refresh_log (started_at ASC);

        -- Chat sessions. Deactivated, never deleted.
        CREATE TABLE IF NOT EXISTS chat_sessions (
            id              TEXT PRIMARY KEY NOT NULL,
            user_id         TEXT NOT NULL,
            title           TEXT NOT NULL DEFAULT 'New chat',
            is_active       INTEGER NOT NULL DEFAULT 1,
            turn_state      TEXT NOT NULL DEFAULT 'active'
                            CHECK (turn_state IN ('active', 'awaiting_reply')),
            context         TEXT NOT NULL DEFAULT '{}',
            created_at      INTEGER NOT NULL,
            last_activity   INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chat_sessions_user
            ON chat_sessions (user_id, last_activity DESC);

        -- Chat transcript. seq is assigned on append and strictly increasing
        -- within a session.
        CREATE TABLE IF NOT EXISTS chat_messages (
            id              TEXT PRIMARY KEY NOT NULL,
            session_id      TEXT NOT NULL REFERENCES chat_sessions (id),
            seq             INTEGER NOT NULL,
            role            TEXT NOT NULL
                            CHECK (role IN ('user', 'assistant', 'system')),
            content         TEXT NOT NULL,
            content_type    TEXT NOT NULL DEFAULT 'text'
                            CHECK (content_type IN ('text', 'chart', 'data', 'error')),
            payload         TEXT,
            source_query    TEXT,
            processing_ms   INTEGER,
            created_at      INTEGER NOT NULL,
            UNIQUE (session_id, seq)
        );

        CREATE INDEX IF NOT EXISTS idx_chat_messages_session
            ON chat_messages (session_id, created_at ASC, seq ASC);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| PrismError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}
