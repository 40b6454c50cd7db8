use thiserror::Error;

/// Top-level error type for the Prism system.
///
/// Each variant wraps a subsystem-specific error. Subsystem crates define
/// their own error types and implement `From<SubsystemError> for PrismError`
/// so that the `?` operator works seamlessly across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PrismError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Chat error: {0}")]
    Chat(String),

    #[error("Upstream source error: {0}")]
    Source(String),

    #[error("Assistant error: {0}")]
    Assistant(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for PrismError {
    fn from(err: toml::de::Error) -> Self {
        PrismError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for PrismError {
    fn from(err: toml::ser::Error) -> Self {
        PrismError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for PrismError {
    fn from(err: serde_json::Error) -> Self {
        PrismError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Prism operations.
pub type Result<T> = std::result::Result<T, PrismError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PrismError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let prism_err: PrismError = io_err.into();
        assert!(matches!(prism_err, PrismError::Io(_)));
        assert!(prism_err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(PrismError, &str)> = vec![
            (
                PrismError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                PrismError::Storage("disk full".to_string()),
                "Storage error: disk full",
            ),
            (
                PrismError::Sync("lock poisoned".to_string()),
                "Sync error: lock poisoned",
            ),
            (
                PrismError::Chat("bad turn".to_string()),
                "Chat error: bad turn",
            ),
            (
                PrismError::Source("timeout".to_string()),
                "Upstream source error: timeout",
            ),
            (
                PrismError::Assistant("quota".to_string()),
                "Assistant error: quota",
            ),
            (
                PrismError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
            (
                PrismError::NotFound("data source 7".to_string()),
                "Not found: data source 7",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_error_from_toml_de() {
        let bad_toml = "invalid = [[[";
        let err: std::result::Result<toml::Value, _> = toml::from_str(bad_toml);
        assert!(err.is_err());
        let prism_err: PrismError = err.unwrap_err().into();
        assert!(matches!(prism_err, PrismError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let bad_json = "{ invalid json }";
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str(bad_json);
        assert!(err.is_err());
        let prism_err: PrismError = err.unwrap_err().into();
        assert!(matches!(prism_err, PrismError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let _value = io_result?;
            Ok("success".to_string())
        }

        assert_eq!(inner().unwrap(), "success");
    }
}
