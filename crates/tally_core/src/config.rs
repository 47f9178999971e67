//! Environment-driven engine configuration.
//!
//! # Responsibility
//! - Resolve database, logging and commit-retry settings from `TALLY_*`
//!   variables with documented defaults.
//! - Reject malformed values instead of silently falling back.
//!
//! # Invariants
//! - `commit_attempts >= 1`.
//! - `log_level` is one of `trace|debug|info|warn|error`.

use crate::db::DbOptions;
use crate::logging::{default_log_level, normalize_level};
use crate::repo::ledger_repo::DEFAULT_COMMIT_ATTEMPTS;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "TALLY_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "TALLY_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "TALLY_LOG_DIR";
pub const ENV_BUSY_TIMEOUT_MS: &str = "TALLY_BUSY_TIMEOUT_MS";
pub const ENV_COMMIT_RETRIES: &str = "TALLY_COMMIT_RETRIES";

const DEFAULT_DB_PATH: &str = "tally.sqlite3";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Configuration parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidNumber { key: &'static str, value: String },
    InvalidLogLevel(String),
    ZeroCommitAttempts,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNumber { key, value } => {
                write!(f, "{key} must be a non-negative integer, got `{value}`")
            }
            Self::InvalidLogLevel(message) => write!(f, "{message}"),
            Self::ZeroCommitAttempts => write!(f, "{ENV_COMMIT_RETRIES} must be at least 1"),
        }
    }
}

impl Error for ConfigError {}

/// Resolved runtime settings for one engine process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub db_path: PathBuf,
    pub log_level: &'static str,
    /// Logging stays disabled when unset.
    pub log_dir: Option<PathBuf>,
    pub busy_timeout: Duration,
    pub commit_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            log_level: default_log_level(),
            log_dir: None,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            commit_attempts: DEFAULT_COMMIT_ATTEMPTS,
        }
    }
}

impl EngineConfig {
    /// Reads configuration from process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(path) = read(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(level) = read(ENV_LOG_LEVEL) {
            config.log_level = normalize_level(&level).map_err(ConfigError::InvalidLogLevel)?;
        }
        config.log_dir = read(ENV_LOG_DIR).map(PathBuf::from);
        if let Some(value) = read(ENV_BUSY_TIMEOUT_MS) {
            let millis = value
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber {
                    key: ENV_BUSY_TIMEOUT_MS,
                    value,
                })?;
            config.busy_timeout = Duration::from_millis(millis);
        }
        if let Some(value) = read(ENV_COMMIT_RETRIES) {
            let attempts = value
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidNumber {
                    key: ENV_COMMIT_RETRIES,
                    value,
                })?;
            if attempts == 0 {
                return Err(ConfigError::ZeroCommitAttempts);
            }
            config.commit_attempts = attempts;
        }

        Ok(config)
    }

    /// Connection options derived from this config.
    pub fn db_options(&self) -> DbOptions {
        DbOptions {
            busy_timeout: self.busy_timeout,
        }
    }
}
