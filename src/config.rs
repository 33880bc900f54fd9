use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use thiserror::Error;
use tracing::trace;

use crate::{Credential, Thresholds};

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Retention period in days (samples older than this are deleted)
        #[serde(default = "default_retention_days")]
        retention_days: u32,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
            retention_days: default_retention_days(),
        }
    }
}

impl StorageConfig {
    pub fn retention_days(&self) -> Option<u32> {
        match self {
            StorageConfig::None => None,
            StorageConfig::Sqlite { retention_days, .. } => Some(*retention_days),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./fleet.db")
}

fn default_retention_days() -> u32 {
    30
}

/// Timing of the collection loop
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CollectionConfig {
    /// Pause between two cycles
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Pause after a cycle that failed as a whole
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Hard deadline for one target's unit of work
    pub cycle_timeout_secs: Option<u64>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            error_backoff_secs: default_error_backoff(),
            connect_timeout_secs: default_connect_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            cycle_timeout_secs: None,
        }
    }
}

impl CollectionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Deadline for a whole unit: connect, every probe, plus some slack.
    pub fn unit_deadline(&self) -> Duration {
        let secs = self.cycle_timeout_secs.unwrap_or(
            self.connect_timeout_secs
                + self.probe_timeout_secs * crate::monitors::session::Probe::ALL.len() as u64
                + 5,
        );
        Duration::from_secs(secs)
    }
}

fn default_interval() -> u64 {
    30
}

fn default_error_backoff() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_probe_timeout() -> u64 {
    10
}

/// Registration data for one target
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub address: String,
    pub user: String,
    pub credential: Credential,
    #[serde(default = "crate::util::get_default_port")]
    pub port: u16,
    #[serde(default = "crate::util::get_default_cpu_threshold")]
    pub cpu_threshold: u8,
    #[serde(default = "crate::util::get_default_memory_threshold")]
    pub memory_threshold: u8,
    #[serde(default = "crate::util::get_default_disk_threshold")]
    pub disk_threshold: u8,
}

impl TargetConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            cpu: self.cpu_threshold,
            memory: self.memory_threshold,
            disk: self.disk_threshold,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField {
                target: self.address.clone(),
                field: "name",
            });
        }
        if self.address.trim().is_empty() {
            return Err(ConfigError::MissingField {
                target: self.name.clone(),
                field: "address",
            });
        }
        if self.user.trim().is_empty() {
            return Err(ConfigError::MissingField {
                target: self.name.clone(),
                field: "user",
            });
        }

        for (metric, value) in [
            ("cpu_threshold", self.cpu_threshold),
            ("memory_threshold", self.memory_threshold),
            ("disk_threshold", self.disk_threshold),
        ] {
            if !(1..=100).contains(&value) {
                return Err(ConfigError::InvalidThreshold {
                    target: self.name.clone(),
                    metric,
                    value,
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alert {
    Discord(Discord),
    Webhook(Webhook),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

/// Viewer API settings
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    pub token: Option<String>,
    #[serde(default = "default_cors")]
    pub cors: bool,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_cors() -> bool {
    true
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub collection: CollectionConfig,

    /// Interval of liveness pings sent to viewers
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,

    /// Window for the recent averages in fleet snapshots
    #[serde(default = "default_stats_window")]
    pub stats_window_minutes: u64,

    #[serde(default)]
    pub targets: Vec<TargetConfig>,

    /// Storage configuration (defaults to SQLite)
    #[serde(default)]
    pub storage: StorageConfig,

    /// Where newly raised alerts are sent
    pub notify: Option<Alert>,

    pub api: Option<ApiSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collection: CollectionConfig::default(),
            heartbeat_secs: default_heartbeat(),
            stats_window_minutes: default_stats_window(),
            targets: Vec::new(),
            storage: StorageConfig::default(),
            notify: None,
            api: None,
        }
    }
}

fn default_heartbeat() -> u64 {
    30
}

fn default_stats_window() -> u64 {
    60
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for target in &self.targets {
            target.validate()?;
            if !names.insert(target.name.as_str()) {
                return Err(ConfigError::DuplicateTarget(target.name.clone()));
            }
        }

        if self.collection.interval_secs == 0 {
            return Err(ConfigError::ZeroDuration("collection.interval_secs"));
        }
        if self.collection.connect_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("collection.connect_timeout_secs"));
        }
        if self.collection.probe_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("collection.probe_timeout_secs"));
        }
        if self.heartbeat_secs == 0 {
            return Err(ConfigError::ZeroDuration("heartbeat_secs"));
        }

        Ok(())
    }

    pub fn stats_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.stats_window_minutes as i64)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("target '{0}' is configured more than once")]
    DuplicateTarget(String),

    #[error("target '{target}' is missing required field '{field}'")]
    MissingField { target: String, field: &'static str },

    #[error("target '{target}': {metric} must be between 1 and 100, got {value}")]
    InvalidThreshold {
        target: String,
        metric: &'static str,
        value: u8,
    },

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    let config: Config = serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
