pub mod actors;
pub mod alerts;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod discord;
pub mod monitors;
pub mod storage;
pub mod util;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row id of a registered target
pub type TargetId = i64;

/// Health classification of a target, derived from poll outcomes only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    #[default]
    Unknown,
    Online,
    Offline,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::Unknown => "unknown",
            TargetStatus::Online => "online",
            TargetStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(TargetStatus::Unknown),
            "online" => Ok(TargetStatus::Online),
            "offline" => Ok(TargetStatus::Offline),
            other => Err(format!("unknown target status '{other}'")),
        }
    }
}

/// Login material for a target.
///
/// Treated as opaque configuration: it is handed to the session connector
/// and never shown to viewers.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credential {
    Password(String),
    KeyFile {
        path: PathBuf,
        #[serde(default)]
        passphrase: Option<String>,
    },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Password(***)"),
            Credential::KeyFile { path, .. } => f
                .debug_struct("KeyFile")
                .field("path", path)
                .field("passphrase", &"***")
                .finish(),
        }
    }
}

/// Per-metric alert thresholds in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub cpu: u8,
    pub memory: u8,
    pub disk: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu: util::DEFAULT_CPU_THRESHOLD,
            memory: util::DEFAULT_MEMORY_THRESHOLD,
            disk: util::DEFAULT_DISK_THRESHOLD,
        }
    }
}

/// Connection state embedded in every target.
///
/// Only poll outcomes move it: see [`ConnectionState::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: TargetStatus,
    pub failure_count: u32,
    pub last_success: Option<DateTime<Utc>>,
}

impl ConnectionState {
    /// Next state after one poll outcome.
    ///
    /// A success goes online, clears the failure counter and stamps the
    /// success time. A failure goes offline, bumps the counter and keeps
    /// the previous success time.
    pub fn apply(self, success: bool, now: DateTime<Utc>) -> Self {
        if success {
            Self {
                status: TargetStatus::Online,
                failure_count: 0,
                last_success: Some(now),
            }
        } else {
            Self {
                status: TargetStatus::Offline,
                failure_count: self.failure_count.saturating_add(1),
                last_success: self.last_success,
            }
        }
    }
}

/// A registered remote host
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub id: TargetId,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub user: String,
    pub credential: Credential,
    pub thresholds: Thresholds,
    pub connection: ConnectionState,
}

impl Target {
    /// `name (address:port)`, used in log lines and notifications
    pub fn display(&self) -> String {
        format!("{} ({}:{})", self.name, self.address, self.port)
    }
}

/// One set of parsed resource metrics for a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub cpu_usage: f32,
    pub memory_usage: f32,
    pub disk_usage: f32,
    pub load_average: String,
    pub process_count: u32,
    pub collected_at: DateTime<Utc>,
}

impl Sample {
    /// Whether any usage field carries data.
    ///
    /// All-zero samples come from sessions where every usage probe failed
    /// and are not persisted.
    pub fn has_usage(&self) -> bool {
        self.cpu_usage > 0.0 || self.memory_usage > 0.0 || self.disk_usage > 0.0
    }
}
