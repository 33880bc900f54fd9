//! Stored row types
//!
//! Samples and alerts are append-only rows owned by the store. The only
//! mutation an alert ever sees is being resolved; resolved rows are history
//! and take no part in deduplication.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Sample, TargetId};

/// A persisted sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    pub id: i64,
    pub target_id: TargetId,
    pub cpu_usage: f32,
    pub memory_usage: f32,
    pub disk_usage: f32,
    pub load_average: String,
    pub process_count: u32,
    pub timestamp: DateTime<Utc>,
}

impl SampleRow {
    pub fn from_sample(id: i64, target_id: TargetId, sample: &Sample) -> Self {
        Self {
            id,
            target_id,
            cpu_usage: sample.cpu_usage,
            memory_usage: sample.memory_usage,
            disk_usage: sample.disk_usage,
            load_average: sample.load_average.clone(),
            process_count: sample.process_count,
            timestamp: sample.collected_at,
        }
    }
}

/// Metric an alert is raised for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Cpu,
    Memory,
    Disk,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [MetricKind::Cpu, MetricKind::Memory, MetricKind::Disk];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Memory => "memory",
            MetricKind::Disk => "disk",
        }
    }

    /// Human readable label used in alert messages
    pub fn label(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "CPU",
            MetricKind::Memory => "Memory",
            MetricKind::Disk => "Disk",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(MetricKind::Cpu),
            "memory" => Ok(MetricKind::Memory),
            "disk" => Ok(MetricKind::Disk),
            other => Err(format!("unknown metric kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// A persisted alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRow {
    pub id: i64,
    pub target_id: TargetId,
    pub kind: MetricKind,
    pub severity: Severity,
    pub message: String,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AlertRow {
    /// Whether this row blocks a new alert with the given dedup key
    pub fn matches_open(&self, target_id: TargetId, kind: MetricKind, message: &str) -> bool {
        !self.resolved && self.target_id == target_id && self.kind == kind && self.message == message
    }
}

/// Fleet-wide aggregates shown to viewers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetStats {
    pub total_targets: usize,
    pub online_targets: usize,
    pub offline_targets: usize,
    pub unknown_targets: usize,
    pub targets_with_alerts: usize,

    /// Averages over the recent window, one decimal
    pub average_cpu: f64,
    pub average_memory: f64,
    pub average_disk: f64,

    pub open_alerts: usize,
    pub critical_alerts: usize,
    pub warning_alerts: usize,

    pub total_samples: usize,
}
