use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PrismError, Result};

/// Top-level configuration for the Prism application.
///
/// Loaded from `~/.prism/config.toml` by default. Each section corresponds
/// to a bounded context or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrismConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl PrismConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PrismConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PrismError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.prism/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Refresh pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between scheduler ticks.
    pub tick_interval_secs: u64,
    /// Default refresh interval assigned to new data sources, seconds.
    pub default_refresh_interval_secs: i64,
    /// Upper bound on one upstream fetch, seconds.
    pub fetch_timeout_secs: u64,
    /// Retry attempts for transient upstream failures within one run.
    pub max_retries: u32,
    /// Base backoff between retries, milliseconds (linear: attempt * base).
    pub retry_backoff_ms: u64,
    /// Days to keep refresh audit entries before pruning.
    pub audit_retention_days: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            default_refresh_interval_secs: 1800,
            fetch_timeout_secs: 60,
            max_retries: 3,
            retry_backoff_ms: 500,
            audit_retention_days: 30,
        }
    }
}

/// Chat assistant settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Whether the chat engine accepts messages at all.
    pub enabled: bool,
    /// Maximum user message length in characters.
    pub max_message_length: usize,
    /// Upper bound on one generation call, seconds.
    pub generation_timeout_secs: u64,
    /// System greeting seeded into every new session.
    pub greeting: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_message_length: 2000,
            generation_timeout_secs: 30,
            greeting: "Hello! I can answer questions about your synchronized data, \
                       build charts, and pull record previews. How can I help?"
                .to_string(),
        }
    }
}
