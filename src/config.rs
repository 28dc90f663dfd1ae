//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\smartlists\config.toml
//! - macOS: ~/Library/Application Support/smartlists/config.toml
//! - Linux: ~/.config/smartlists/config.toml
//!
//! The config file is human-readable and editable. Every key is optional;
//! missing keys take their defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::refresh::{DEFAULT_BATCH_SIZE, DEFAULT_HISTORY_SIZE, QueueConfig};
use crate::schedule::SchedulerConfig;
use crate::service::ServiceConfig;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Refresh workers and scheduling
    pub engine: EngineConfig,

    /// Database location
    pub database: DatabaseConfig,

    /// Where library items come from
    pub library: LibraryConfig,

    /// Ignore list behavior
    pub ignore: IgnoreConfig,
}

/// Refresh engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Targets refreshed concurrently
    pub worker_count: usize,

    /// Items per host call and evaluation chunk
    pub batch_size: usize,

    /// Soft limit for a single refresh
    pub job_timeout_secs: u64,

    /// Finished jobs kept for status queries
    pub history_size: usize,

    /// How often the scheduler checks for due targets
    pub tick_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            batch_size: DEFAULT_BATCH_SIZE,
            job_timeout_secs: 600,
            history_size: DEFAULT_HISTORY_SIZE,
            tick_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(crate::db::DEFAULT_DB_NAME),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// JSON library snapshot used when no `--library` is given
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Duration for new entries when neither caller nor definition sets
    /// one (empty = permanent)
    pub default_duration_days: Option<i32>,

    /// Purge expired entries on every scheduler tick
    pub sweep_expired: bool,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            default_duration_days: None,
            sweep_expired: true,
        }
    }
}

impl Config {
    /// Engine settings for [`crate::service::SmartListService`].
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            queue: QueueConfig {
                worker_count: self.engine.worker_count.max(1),
                job_timeout: Duration::from_secs(self.engine.job_timeout_secs.max(1)),
            },
            scheduler: SchedulerConfig {
                tick_interval: Duration::from_secs(self.engine.tick_interval_secs.max(1)),
                sweep_expired: self.ignore.sweep_expired,
            },
            batch_size: self.engine.batch_size.max(1),
            history_size: self.engine.history_size.max(1),
            default_ignore_days: self.ignore.default_duration_days,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("smartlists"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from a specific file, with the same fallbacks as [`load`].
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to the default location
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)
}

/// Save configuration to a specific file
///
/// Creates the parent directory if it doesn't exist.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
