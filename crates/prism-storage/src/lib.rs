//! SQLite-backed persistence for Prism.
//!
//! Provides the Database wrapper (WAL mode, transactional helper), schema
//! migrations, and repositories for connections, data sources, synced
//! records, refresh audit entries, and chat transcripts.

pub mod chat_store;
pub mod db;
pub mod migrations;
pub mod records;
pub mod repository;

pub use chat_store::ChatStore;
pub use db::Database;
pub use records::{ReconcileCounts, RecordStore};
pub use repository::{ConnectionRepository, DataSourceRepository, RefreshLogRepository};
