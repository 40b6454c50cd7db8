//! Error types for the refresh pipeline.

use uuid::Uuid;

use prism_core::error::PrismError;

use crate::client::SourceError;

/// Errors from the scheduler and executor.
///
/// Lock contention is deliberately not represented here: a second run
/// finding the lock held is an expected skip, reported through the audit
/// log rather than an error.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("data source not found: {0}")]
    SourceNotFound(Uuid),
    #[error("connection not found: {0}")]
    ConnectionNotFound(Uuid),
    #[error("connection is inactive: {0}")]
    ConnectionInactive(Uuid),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<PrismError> for SyncError {
    fn from(err: PrismError) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<SyncError> for PrismError {
    fn from(err: SyncError) -> Self {
        PrismError::Sync(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_error_display() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            SyncError::SourceNotFound(id).to_string(),
            "data source not found: 550e8400-e29b-41d4-a716-446655440000"
        );
        assert_eq!(
            SyncError::ConnectionInactive(id).to_string(),
            "connection is inactive: 550e8400-e29b-41d4-a716-446655440000"
        );
    }

    #[test]
    fn test_source_error_is_transparent() {
        let err: SyncError = SourceError::Transient("socket closed".to_string()).into();
        assert_eq!(err.to_string(), "transient upstream error: socket closed");
    }

    #[test]
    fn test_from_prism_error() {
        let err: SyncError = PrismError::Storage("disk full".to_string()).into();
        assert!(matches!(err, SyncError::Storage(_)));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_into_prism_error() {
        let err: PrismError = SyncError::SourceNotFound(Uuid::new_v4()).into();
        assert!(matches!(err, PrismError::Sync(_)));
    }
}
