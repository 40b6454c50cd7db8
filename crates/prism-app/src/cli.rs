//! CLI argument definitions for the Prism application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

/// Prism keeps externally-sourced data fresh and answers questions about it.
#[derive(Parser, Debug)]
#[command(name = "prism", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the SQLite database.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the background service: recovery sweep, scheduler, retention.
    Serve,
    /// Manage upstream connections.
    Connection {
        #[command(subcommand)]
        action: ConnectionAction,
    },
    /// Manage data sources.
    Source {
        #[command(subcommand)]
        action: SourceAction,
    },
    /// Trigger one refresh for a data source.
    Refresh {
        /// Data source id.
        data_source_id: Uuid,
    },
    /// Chat with the assistant.
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConnectionAction {
    /// Register a new upstream connection.
    Add {
        name: String,
        account_id: String,
        /// Credential material; stored, never echoed back.
        secret: String,
        #[arg(long)]
        description: Option<String>,
        /// Default refresh interval for sources under this connection, seconds.
        #[arg(long)]
        interval_secs: Option<i64>,
    },
    /// List connections (credentials redacted).
    List,
    /// Soft-deactivate a connection.
    Deactivate { id: Uuid },
    /// Replace the stored credential material.
    RotateSecret { id: Uuid, secret: String },
    /// Probe the upstream with a one-row fetch.
    Test { id: Uuid },
}

#[derive(Subcommand, Debug)]
pub enum SourceAction {
    /// Define a new data source under a connection.
    Add {
        name: String,
        connection_id: Uuid,
        /// Upstream record type, e.g. "customer".
        record_type: String,
        /// Comma-separated field projection. Empty keeps all fields.
        #[arg(long, default_value = "")]
        fields: String,
        /// Equality filter as a JSON object.
        #[arg(long, default_value = "{}")]
        filter: String,
        #[arg(long)]
        interval_secs: Option<i64>,
        #[arg(long)]
        max_records: Option<i64>,
    },
    /// List data sources with refresh status.
    List,
    /// Turn auto-refresh off for a source.
    Deactivate { id: Uuid },
}

#[derive(Subcommand, Debug)]
pub enum ChatAction {
    /// Start a new chat session.
    New {
        #[arg(long, default_value = "operator")]
        user: String,
        /// Context snapshot as a JSON object.
        #[arg(long, default_value = "{}")]
        context: String,
    },
    /// Post a message and wait for the reply.
    Post { session_id: Uuid, message: String },
    /// Print a session's transcript.
    Show { session_id: Uuid },
    /// Deactivate a session.
    Deactivate { session_id: Uuid },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > PRISM_CONFIG env var > ~/.prism/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("PRISM_CONFIG") {
            return PathBuf::from(p);
        }
        default_prism_dir().join("config.toml")
    }

    /// Resolve the data directory.
    ///
    /// Priority: --data-dir flag > config file value.
    pub fn resolve_data_dir(&self, config_dir: &str) -> PathBuf {
        if let Some(ref p) = self.data_dir {
            return p.clone();
        }
        expand_home(config_dir)
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// `~/.prism` for the current platform.
fn default_prism_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".prism");
    }
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".prism");
    }
    PathBuf::from(".prism")
}

/// Expand a leading `~/` against the home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
        if let Ok(home) = std::env::var("USERPROFILE") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let args = CliArgs::parse_from(["prism", "serve"]);
        assert!(matches!(args.command, Command::Serve));
    }

    #[test]
    fn test_parse_refresh() {
        let id = Uuid::new_v4();
        let args = CliArgs::parse_from(["prism", "refresh", &id.to_string()]);
        let Command::Refresh { data_source_id } = args.command else {
            panic!("expected refresh command");
        };
        assert_eq!(data_source_id, id);
    }

    #[test]
    fn test_parse_connection_add() {
        let args = CliArgs::parse_from([
            "prism",
            "connection",
            "add",
            "prod",
            "ACME-1",
            "tok_secret",
            "--interval-secs",
            "900",
        ]);
        let Command::Connection {
            action:
                ConnectionAction::Add {
                    name,
                    account_id,
                    secret,
                    interval_secs,
                    ..
                },
        } = args.command
        else {
            panic!("expected connection add");
        };
        assert_eq!(name, "prod");
        assert_eq!(account_id, "ACME-1");
        assert_eq!(secret, "tok_secret");
        assert_eq!(interval_secs, Some(900));
    }

    #[test]
    fn test_parse_source_add_defaults() {
        let cid = Uuid::new_v4();
        let args = CliArgs::parse_from([
            "prism",
            "source",
            "add",
            "customers",
            &cid.to_string(),
            "customer",
        ]);
        let Command::Source {
            action:
                SourceAction::Add {
                    fields,
                    filter,
                    interval_secs,
                    ..
                },
        } = args.command
        else {
            panic!("expected source add");
        };
        assert_eq!(fields, "");
        assert_eq!(filter, "{}");
        assert!(interval_secs.is_none());
    }

    #[test]
    fn test_parse_chat_post() {
        let sid = Uuid::new_v4();
        let args =
            CliArgs::parse_from(["prism", "chat", "post", &sid.to_string(), "hello there"]);
        let Command::Chat {
            action: ChatAction::Post {
                session_id,
                message,
            },
        } = args.command
        else {
            panic!("expected chat post");
        };
        assert_eq!(session_id, sid);
        assert_eq!(message, "hello there");
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::parse_from(["prism", "serve", "--log-level", "debug"]);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_resolve_log_level_flag_wins() {
        let args = CliArgs::parse_from(["prism", "--log-level", "trace", "serve"]);
        assert_eq!(args.resolve_log_level("info"), "trace");
    }

    #[test]
    fn test_resolve_log_level_falls_back_to_config() {
        let args = CliArgs::parse_from(["prism", "serve"]);
        assert_eq!(args.resolve_log_level("warn"), "warn");
    }

    #[test]
    fn test_expand_home_passthrough() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
    }
}
