//! Configuration system.
//!
//! Layered loading: built-in defaults, then an optional global file under the
//! user's config directory, then an optional `almanac.toml` in the working
//! directory, then `ALMANAC_*` environment variables. Later layers win.

use crate::error::SyncError;
use crate::logging::LoggingConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlmanacConfig {
    /// Storage paths
    #[serde(default)]
    pub storage: StorageConfig,

    /// Sync behavior
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage paths
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database directory; defaults to the platform data dir.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the database directory, falling back to
    /// `$XDG_DATA_HOME/almanac/store` (or the platform equivalent).
    pub fn resolve_data_dir(&self) -> Result<PathBuf, SyncError> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let dirs = ProjectDirs::from("", "", "almanac")
            .ok_or_else(|| SyncError::Config("Cannot determine data directory".to_string()))?;
        Ok(dirs.data_dir().join("store"))
    }
}

/// Sync behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// TTL in days for tombstones created by reconciliation removals.
    /// Zero or negative means permanent.
    #[serde(default = "default_tombstone_ttl_days")]
    pub default_tombstone_ttl_days: i64,

    /// Name this machine reports as `origin_machine`; defaults to $HOSTNAME.
    #[serde(default)]
    pub machine_name: Option<String>,
}

fn default_tombstone_ttl_days() -> i64 {
    90
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_tombstone_ttl_days: default_tombstone_ttl_days(),
            machine_name: None,
        }
    }
}

impl SyncConfig {
    /// TTL as a duration, None when configured permanent.
    pub fn default_ttl(&self) -> Option<chrono::Duration> {
        if self.default_tombstone_ttl_days > 0 {
            Some(chrono::Duration::days(self.default_tombstone_ttl_days))
        } else {
            None
        }
    }

    /// Machine name for sync-state rows.
    pub fn resolve_machine_name(&self) -> String {
        if let Some(ref name) = self.machine_name {
            return name.clone();
        }
        std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
    }
}

/// Loads configuration with the layered merge policy.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all layers.
    pub fn load() -> Result<AlmanacConfig, SyncError> {
        let mut builder = builder_with_defaults()?;

        if let Some(global) = global_config_path() {
            builder = builder.add_source(File::from(global).required(false));
        }
        builder = builder.add_source(File::with_name("almanac").required(false));
        builder = builder.add_source(Environment::with_prefix("ALMANAC").separator("__"));

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load configuration from an explicit file only (plus defaults and env).
    pub fn load_from_file(path: &Path) -> Result<AlmanacConfig, SyncError> {
        let builder = builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).required(true))
            .add_source(Environment::with_prefix("ALMANAC").separator("__"));
        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }
}

/// Create a Config builder with merge policy defaults applied.
fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, SyncError> {
    Ok(Config::builder()
        .set_default("sync.default_tombstone_ttl_days", 90)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stderr")?)
}

fn global_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "almanac").map(|d| d.config_dir().join("config.toml"))
}
