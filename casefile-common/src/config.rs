//! Bootstrap configuration loading
//!
//! Settings needed before the database is open live in a small TOML file.
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`CASEFILE_CONFIG`)
//! 3. Per-user config file (`~/.config/casefile/config.toml`)
//! 4. Compiled defaults (no file)
//!
//! A missing or unreadable file is never fatal: the service logs a warning and
//! starts with compiled defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "CASEFILE_CONFIG";

/// Longest lock lifetime accepted from config (one day)
pub const MAX_LOCK_DURATION_MINUTES: i64 = 24 * 60;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Interface the HTTP server binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Workflow engine tuning
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Lifetime of a record lock from its last acquisition or extension
    #[serde(default = "default_lock_duration_minutes")]
    pub lock_duration_minutes: i64,

    /// Approver must differ from every earlier actor on the record
    #[serde(default = "default_true")]
    pub require_distinct_approver: bool,
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("casefile").join("casefile.db"))
        .unwrap_or_else(|| PathBuf::from("./casefile_data/casefile.db"))
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5740
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_lock_duration_minutes() -> i64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_address: default_bind_address(),
            port: default_port(),
            logging: LoggingConfig::default(),
            workflow: WorkflowConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            lock_duration_minutes: default_lock_duration_minutes(),
            require_distinct_approver: true,
        }
    }
}

impl WorkflowConfig {
    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_LOCK_DURATION_MINUTES).contains(&self.lock_duration_minutes) {
            return Err(Error::Config(format!(
                "lock_duration_minutes must be between 1 and {}, got {}",
                MAX_LOCK_DURATION_MINUTES, self.lock_duration_minutes
            )));
        }
        Ok(())
    }
}

/// Resolve which config file to read, if any
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    dirs::config_dir()
        .map(|d| d.join("casefile").join("config.toml"))
        .filter(|p| p.exists())
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))?;
    config.workflow.validate()?;
    Ok(config)
}

/// Load bootstrap configuration, falling back to compiled defaults
pub fn load_bootstrap_config(cli_arg: Option<&Path>) -> TomlConfig {
    let Some(path) = resolve_config_path(cli_arg) else {
        info!("No config file found, using compiled defaults");
        return TomlConfig::default();
    };

    match load_toml_config(&path) {
        Ok(config) => {
            info!("Loaded configuration from {}", path.display());
            config
        }
        Err(e) => {
            warn!("Failed to load config {}: {} (using defaults)", path.display(), e);
            TomlConfig::default()
        }
    }
}
