//! Message types for actor communication
//!
//! 1. **Commands**: request/response messages sent to the collector via mpsc
//! 2. **Notifications**: new alerts queued for the notifier
//! 3. **Events**: fleet snapshots and pings fanned out to every viewer
//! 4. **Reports**: what one cycle did, returned to whoever asked for it

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::monitors::resources::AlertCandidate;
use crate::monitors::status::PollOutcome;
use crate::storage::{FleetStats, SampleRow, StorageBackend, StorageResult};
use crate::{Target, TargetId, TargetStatus};

/// Commands that can be sent to the FleetCollectorActor
#[derive(Debug)]
pub enum CollectorCommand {
    /// Run one cycle now, independent of the schedule
    PollNow {
        respond_to: oneshot::Sender<anyhow::Result<CycleReport>>,
    },

    /// Change the pause between cycles; the next cycle is rescheduled
    UpdateInterval { interval_secs: u64 },

    /// Run a connection test against one target.
    ///
    /// Handled between cycles, so it never overlaps a poll of the same
    /// target. Replies `None` for an unknown target.
    TestTarget {
        target_id: TargetId,
        respond_to: oneshot::Sender<anyhow::Result<Option<TargetReport>>>,
    },

    /// Stop scheduling cycles.
    ///
    /// Commands are handled between cycles, so an in-flight cycle always
    /// finishes first.
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// A newly stored alert waiting to be sent out
#[derive(Debug, Clone)]
pub struct AlertNotification {
    pub target: Target,
    pub candidate: AlertCandidate,
}

/// Event pushed to viewers
///
/// Serialized as `{"type": "update", "targets": [...], "aggregateStats":
/// {...}, "timestamp": ...}`; `initial` has the same shape.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FleetEvent {
    /// First snapshot a viewer receives after attaching
    Initial(FleetSnapshot),

    /// Snapshot published after every completed cycle
    Update(FleetSnapshot),

    /// Liveness signal, independent of cycles
    Ping { timestamp: DateTime<Utc> },
}

/// Summary of the fleet as viewers see it
#[derive(Debug, Clone, Serialize)]
pub struct FleetSnapshot {
    pub targets: Vec<TargetSummary>,
    #[serde(rename = "aggregateStats")]
    pub stats: FleetStats,
    pub timestamp: DateTime<Utc>,
}

impl FleetSnapshot {
    /// Read the current fleet state from the store
    pub async fn capture(
        store: &dyn StorageBackend,
        stats_window: chrono::Duration,
    ) -> StorageResult<Self> {
        let now = Utc::now();
        let targets = store.list_targets().await?;
        let open_alerts = store.open_alert_counts().await?;

        let mut summaries = Vec::with_capacity(targets.len());
        for target in targets {
            let latest_sample = store.query_latest(target.id, 1).await?.pop();
            let open_alerts = open_alerts.get(&target.id).copied().unwrap_or_default();
            summaries.push(TargetSummary::new(target, latest_sample, open_alerts));
        }

        let stats = store.fleet_stats(now - stats_window).await?;

        Ok(Self {
            targets: summaries,
            stats,
            timestamp: now,
        })
    }
}

/// One target in a snapshot; credentials are never included
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetSummary {
    pub id: TargetId,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub status: TargetStatus,
    pub failure_count: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub cpu_threshold: u8,
    pub memory_threshold: u8,
    pub disk_threshold: u8,
    pub latest_sample: Option<SampleRow>,
    pub open_alerts: usize,
}

impl TargetSummary {
    pub fn new(target: Target, latest_sample: Option<SampleRow>, open_alerts: usize) -> Self {
        Self {
            id: target.id,
            name: target.name,
            address: target.address,
            port: target.port,
            status: target.connection.status,
            failure_count: target.connection.failure_count,
            last_success: target.connection.last_success,
            cpu_threshold: target.thresholds.cpu,
            memory_threshold: target.thresholds.memory,
            disk_threshold: target.thresholds.disk,
            latest_sample,
            open_alerts,
        }
    }
}

/// What happened to one target during a cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetReport {
    pub target_id: TargetId,
    pub name: String,
    pub outcome: PollOutcome,
    pub sample_stored: bool,
    pub alerts_created: usize,
}

impl TargetReport {
    pub fn new(target: &Target, outcome: PollOutcome) -> Self {
        Self {
            target_id: target.id,
            name: target.name.clone(),
            outcome,
            sample_stored: false,
            alerts_created: 0,
        }
    }
}

/// Result of one fleet-wide cycle, one report per target
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub targets: Vec<TargetReport>,
}

impl CycleReport {
    pub fn target(&self, id: TargetId) -> Option<&TargetReport> {
        self.targets.iter().find(|report| report.target_id == id)
    }

    pub fn online_count(&self) -> usize {
        self.targets
            .iter()
            .filter(|report| report.outcome.is_success())
            .count()
    }
}
