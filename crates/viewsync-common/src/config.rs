//! Configuration types for viewsync
//!
//! The board service reads a TOML file into [`Config`]; every field has a
//! default so a missing file or a partial file is fine. CLI flags are merged
//! on top by the binary.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for the board service
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    /// Parse configuration from a TOML document
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::configuration(e.to_string()))
    }

    /// Reject settings the sync pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let interval = self.sync.interval();
        if interval.is_zero() {
            return Err(Error::configuration("sync.interval_secs must be > 0"));
        }
        let timeout = self.sync.commit_timeout();
        if timeout.is_zero() {
            return Err(Error::configuration("sync.commit_timeout_ms must be > 0"));
        }
        if timeout >= interval {
            return Err(Error::configuration(
                "sync.commit_timeout_ms must be shorter than sync.interval_secs",
            ));
        }
        if let Some(ttl) = self.cache.idle_ttl()
            && ttl <= interval
        {
            return Err(Error::configuration(
                "cache.idle_ttl_secs must be longer than sync.interval_secs",
            ));
        }
        Ok(())
    }
}

/// HTTP listener configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Where the redb databases live
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StoreConfig {
    /// Durable post records
    #[must_use]
    pub fn posts_path(&self) -> PathBuf {
        self.data_dir.join("posts.db")
    }

    /// Pending-sync markers
    #[must_use]
    pub fn pending_path(&self) -> PathBuf {
        self.data_dir.join("pending.db")
    }
}

/// Sync worker schedule and limits
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Period between cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Upper bound on one durable batch commit
    #[serde(default = "default_commit_timeout_ms")]
    pub commit_timeout_ms: u64,
    /// Consecutive failed cycles before the worker escalates (0 = never)
    #[serde(default = "default_alert_after_failures")]
    pub alert_after_failures: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            commit_timeout_ms: default_commit_timeout_ms(),
            alert_after_failures: default_alert_after_failures(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[must_use]
    pub const fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }
}

/// Counter cache lifetime
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entries idle for this long are dropped (0 = never)
    #[serde(default)]
    pub idle_ttl_secs: u64,
}

impl CacheConfig {
    #[must_use]
    pub const fn idle_ttl(&self) -> Option<Duration> {
        if self.idle_ttl_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_ttl_secs))
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8002".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./board-data")
}

const fn default_interval_secs() -> u64 {
    60
}

const fn default_commit_timeout_ms() -> u64 {
    5000
}

const fn default_alert_after_failures() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}
