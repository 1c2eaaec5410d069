//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/pentest-notes/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/pentest-notes/` (~/.config/pentest-notes/)
//! - Data: `$XDG_DATA_HOME/pentest-notes/` (~/.local/share/pentest-notes/)
//! - State/Logs: `$XDG_STATE_HOME/pentest-notes/` (~/.local/state/pentest-notes/)
//!
//! The storage root can be overridden with the `PENTEST_NOTES_DIR`
//! environment variable, which wins over the config file.

use crate::error::{Error, Result};
use crate::storage::LockOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that selects the storage root directory.
pub const STORAGE_DIR_ENV: &str = "PENTEST_NOTES_DIR";

const APP_DIR: &str = "pentest-notes";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Where engagement data lives
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Index lock tuning
    #[serde(default)]
    pub lock: LockConfig,
}

/// Storage location configuration
#[derive(Debug, Deserialize, Default)]
pub struct StorageConfig {
    /// Override for the storage root (defaults to the XDG data directory)
    pub root: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Advisory lock parameters for the engagement index.
///
/// A holder that does not release within `stale_after_secs` is considered
/// crashed and its lock is reclaimed.
#[derive(Debug, Deserialize, Clone)]
pub struct LockConfig {
    /// Age in seconds after which a held lock is considered abandoned
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Acquisition attempts before giving up
    #[serde(default = "default_lock_retries")]
    pub retries: u32,

    /// First backoff delay in milliseconds (doubles per attempt)
    #[serde(default = "default_min_backoff_ms")]
    pub min_backoff_ms: u64,

    /// Upper bound for the backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
            retries: default_lock_retries(),
            min_backoff_ms: default_min_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl LockConfig {
    /// Convert to the runtime lock options.
    pub fn options(&self) -> LockOptions {
        LockOptions {
            stale_after: Duration::from_secs(self.stale_after_secs),
            retries: self.retries,
            min_backoff: Duration::from_millis(self.min_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.stale_after_secs == 0 {
            return Err(Error::Config(
                "lock.stale_after_secs must be greater than 0".to_string(),
            ));
        }
        if self.retries == 0 {
            return Err(Error::Config(
                "lock.retries must be greater than 0".to_string(),
            ));
        }
        if self.min_backoff_ms > self.max_backoff_ms {
            return Err(Error::Config(
                "lock.min_backoff_ms must not exceed lock.max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_stale_after_secs() -> u64 {
    10
}

fn default_lock_retries() -> u32 {
    10
}

fn default_min_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    1000
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.lock.validate()
    }

    /// Resolve the storage root.
    ///
    /// Order: `PENTEST_NOTES_DIR`, then `storage.root`, then [`Self::data_dir`].
    pub fn storage_root(&self) -> PathBuf {
        match std::env::var_os(STORAGE_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => self.storage.root.clone().unwrap_or_else(Self::data_dir),
        }
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/pentest-notes/config.toml` (~/.config/pentest-notes/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join(APP_DIR).join("config.toml")
    }

    /// Returns the default data directory (engagement storage root)
    ///
    /// `$XDG_DATA_HOME/pentest-notes/` (~/.local/share/pentest-notes/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join(APP_DIR)
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/pentest-notes/` (~/.local/state/pentest-notes/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join(APP_DIR)
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/pentest-notes/pentest-notes.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("pentest-notes.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
