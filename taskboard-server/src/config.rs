//! Configuration system for the Taskboard server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskboard/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

use taskboard_proto::action::UserProfile;

use crate::actions::DEFAULT_RETENTION;
use crate::service::{DEFAULT_FEED_LIMIT, DEFAULT_MAX_FEED_LIMIT};

/// Errors that can occur when loading server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A limit was set to a value the server cannot run with.
    #[error("invalid config value for {key}: {reason}")]
    Invalid {
        /// Offending key.
        key: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BoardConfigFile {
    server: ServerFileConfig,
    actions: ActionsFileConfig,
    users: Vec<UserProfile>,
}

/// `[server]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    max_frame_size: Option<usize>,
    log_file: Option<PathBuf>,
}

/// `[actions]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ActionsFileConfig {
    feed_limit: Option<usize>,
    max_feed_limit: Option<usize>,
    retention: Option<usize>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the board server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Taskboard realtime board server")]
pub struct BoardCliArgs {
    /// Address to bind the server to.
    #[arg(short, long, env = "TASKBOARD_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/taskboard/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum websocket frame size in bytes.
    #[arg(long)]
    pub max_frame_size: Option<usize>,

    /// Default number of entries returned by the activity feed.
    #[arg(long)]
    pub feed_limit: Option<usize>,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKBOARD_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:5000`).
    pub bind_addr: String,
    /// Maximum accepted websocket frame size in bytes.
    pub max_frame_size: usize,
    /// Default activity feed page size.
    pub feed_limit: usize,
    /// Upper bound on a requested feed page size.
    pub max_feed_limit: usize,
    /// Actions kept per board before the oldest are evicted.
    pub retention: usize,
    /// Known user profiles.
    pub users: Vec<UserProfile>,
    /// Optional log file; stderr when absent.
    pub log_file: Option<PathBuf>,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            max_frame_size: 64 * 1024,
            feed_limit: DEFAULT_FEED_LIMIT,
            max_feed_limit: DEFAULT_MAX_FEED_LIMIT,
            retention: DEFAULT_RETENTION,
            users: Vec::new(),
            log_file: None,
            log_level: "info".to_string(),
        }
    }
}

impl BoardConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read or
    /// parsed, or if a resolved limit is zero.
    pub fn load(cli: &BoardCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, file);
        config.validate()?;
        Ok(config)
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &BoardCliArgs, file: BoardConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or(file.server.bind_addr)
                .unwrap_or(defaults.bind_addr),
            max_frame_size: cli
                .max_frame_size
                .or(file.server.max_frame_size)
                .unwrap_or(defaults.max_frame_size),
            feed_limit: cli
                .feed_limit
                .or(file.actions.feed_limit)
                .unwrap_or(defaults.feed_limit),
            max_feed_limit: file
                .actions
                .max_feed_limit
                .unwrap_or(defaults.max_feed_limit),
            retention: file.actions.retention.unwrap_or(defaults.retention),
            users: file.users,
            log_file: cli.log_file.clone().or(file.server.log_file),
            log_level: cli.log_level.clone(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_frame_size", self.max_frame_size),
            ("feed_limit", self.feed_limit),
            ("max_feed_limit", self.max_feed_limit),
            ("retention", self.retention),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.feed_limit > self.max_feed_limit {
            return Err(ConfigError::Invalid {
                key: "feed_limit",
                reason: format!("exceeds max_feed_limit ({})", self.max_feed_limit),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<BoardConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(BoardConfigFile::default());
        };
        config_dir.join("taskboard").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BoardConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
