//! In-memory storage backend (no persistence)
//!
//! Everything lives behind one `RwLock`, which also gives `insert_alert`
//! its atomicity: the open-alert check and the insert happen under the
//! same write guard.
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Limited capacity**: samples per target are capped, oldest evicted first

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{AlertRow, FleetStats, MetricKind, SampleRow, Severity};
use crate::config::TargetConfig;
use crate::util::round1;
use crate::{ConnectionState, Sample, Target, TargetId, TargetStatus};

/// Maximum samples to keep in memory per target
const MAX_SAMPLES_PER_TARGET: usize = 10_000;

#[derive(Default)]
struct MemoryState {
    targets: BTreeMap<TargetId, Target>,
    samples: HashMap<TargetId, VecDeque<SampleRow>>,
    alerts: Vec<AlertRow>,
    next_target_id: TargetId,
    next_sample_id: i64,
    next_alert_id: i64,
}

impl MemoryState {
    fn next_target_id(&mut self) -> TargetId {
        self.next_target_id += 1;
        self.next_target_id
    }

    fn next_sample_id(&mut self) -> i64 {
        self.next_sample_id += 1;
        self.next_sample_id
    }

    fn next_alert_id(&mut self) -> i64 {
        self.next_alert_id += 1;
        self.next_alert_id
    }

    /// Whether a target other than `except` already uses the name
    fn name_taken(&self, name: &str, except: Option<TargetId>) -> bool {
        self.targets
            .values()
            .any(|target| target.name == name && Some(target.id) != except)
    }

    fn insert_target(&mut self, config: &TargetConfig) -> Target {
        let id = self.next_target_id();
        let target = Target {
            id,
            name: config.name.clone(),
            address: config.address.clone(),
            port: config.port,
            user: config.user.clone(),
            credential: config.credential.clone(),
            thresholds: config.thresholds(),
            connection: ConnectionState::default(),
        };
        self.targets.insert(id, target.clone());
        debug!("registered target {}", target.display());
        target
    }
}

/// In-memory storage backend
#[derive(Default)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn list_targets(&self) -> StorageResult<Vec<Target>> {
        let state = self.state.read().await;
        Ok(state.targets.values().cloned().collect())
    }

    async fn get_target(&self, id: TargetId) -> StorageResult<Option<Target>> {
        let state = self.state.read().await;
        Ok(state.targets.get(&id).cloned())
    }

    async fn register_target(&self, config: &TargetConfig) -> StorageResult<Target> {
        let mut state = self.state.write().await;

        if let Some(existing) = state
            .targets
            .values_mut()
            .find(|target| target.name == config.name)
        {
            existing.address = config.address.clone();
            existing.port = config.port;
            existing.user = config.user.clone();
            existing.credential = config.credential.clone();
            existing.thresholds = config.thresholds();
            debug!("updated target {}", existing.display());
            return Ok(existing.clone());
        }

        Ok(state.insert_target(config))
    }

    async fn create_target(&self, config: &TargetConfig) -> StorageResult<Target> {
        let mut state = self.state.write().await;
        if state.name_taken(&config.name, None) {
            return Err(StorageError::Conflict(format!("target {}", config.name)));
        }
        Ok(state.insert_target(config))
    }

    async fn update_target(&self, id: TargetId, config: &TargetConfig) -> StorageResult<Target> {
        let mut state = self.state.write().await;
        if state.name_taken(&config.name, Some(id)) {
            return Err(StorageError::Conflict(format!("target {}", config.name)));
        }

        let target = state
            .targets
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("target {id}")))?;
        target.name = config.name.clone();
        target.address = config.address.clone();
        target.port = config.port;
        target.user = config.user.clone();
        target.credential = config.credential.clone();
        target.thresholds = config.thresholds();
        debug!("updated target {}", target.display());

        Ok(target.clone())
    }

    async fn remove_target(&self, id: TargetId) -> StorageResult<bool> {
        let mut state = self.state.write().await;
        let removed = state.targets.remove(&id).is_some();
        if removed {
            state.samples.remove(&id);
            state.alerts.retain(|alert| alert.target_id != id);
        }
        Ok(removed)
    }

    async fn update_target_status(
        &self,
        id: TargetId,
        status: TargetStatus,
        success: bool,
    ) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let target = state
            .targets
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("target {id}")))?;

        let mut next = target.connection.apply(success, Utc::now());
        next.status = status;
        target.connection = next;

        Ok(())
    }

    async fn insert_sample(&self, target_id: TargetId, sample: &Sample) -> StorageResult<()> {
        let mut state = self.state.write().await;
        if !state.targets.contains_key(&target_id) {
            return Err(StorageError::NotFound(format!("target {target_id}")));
        }

        let id = state.next_sample_id();
        let samples = state.samples.entry(target_id).or_default();
        if samples.len() >= MAX_SAMPLES_PER_TARGET {
            samples.pop_front();
        }
        samples.push_back(SampleRow::from_sample(id, target_id, sample));

        Ok(())
    }

    async fn query_latest(&self, target_id: TargetId, limit: usize) -> StorageResult<Vec<SampleRow>> {
        let state = self.state.read().await;

        let mut rows: Vec<SampleRow> = state
            .samples
            .get(&target_id)
            .map(|deque| deque.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default();
        rows.reverse();

        Ok(rows)
    }

    async fn query_range(
        &self,
        target_id: Option<TargetId>,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<SampleRow>> {
        let state = self.state.read().await;

        let mut rows: Vec<SampleRow> = state
            .samples
            .iter()
            .filter(|(id, _)| target_id.is_none_or(|wanted| wanted == **id))
            .flat_map(|(_, deque)| deque.iter())
            .filter(|row| row.timestamp >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        rows.truncate(limit);

        Ok(rows)
    }

    async fn clear_samples(&self) -> StorageResult<usize> {
        let mut state = self.state.write().await;
        let deleted = state.samples.values().map(VecDeque::len).sum();
        state.samples.clear();
        debug!("cleared {deleted} samples");
        Ok(deleted)
    }

    async fn cleanup_old_samples(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut state = self.state.write().await;
        let mut deleted = 0;
        for samples in state.samples.values_mut() {
            let len = samples.len();
            samples.retain(|row| row.timestamp >= before);
            deleted += len - samples.len();
        }
        debug!("deleted {deleted} samples older than {before}");
        Ok(deleted)
    }

    async fn find_open_alert(
        &self,
        target_id: TargetId,
        kind: MetricKind,
        message: &str,
    ) -> StorageResult<Option<AlertRow>> {
        let state = self.state.read().await;
        Ok(state
            .alerts
            .iter()
            .find(|alert| alert.matches_open(target_id, kind, message))
            .cloned())
    }

    async fn insert_alert(
        &self,
        target_id: TargetId,
        kind: MetricKind,
        message: &str,
        severity: Severity,
    ) -> StorageResult<Option<AlertRow>> {
        let mut state = self.state.write().await;
        if !state.targets.contains_key(&target_id) {
            return Err(StorageError::NotFound(format!("target {target_id}")));
        }

        if state
            .alerts
            .iter()
            .any(|alert| alert.matches_open(target_id, kind, message))
        {
            return Ok(None);
        }

        let row = AlertRow {
            id: state.next_alert_id(),
            target_id,
            kind,
            severity,
            message: message.to_string(),
            resolved: false,
            created_at: Utc::now(),
            resolved_at: None,
        };
        state.alerts.push(row.clone());

        Ok(Some(row))
    }

    async fn resolve_alert(&self, id: i64) -> StorageResult<bool> {
        let mut state = self.state.write().await;
        match state
            .alerts
            .iter_mut()
            .find(|alert| alert.id == id && !alert.resolved)
        {
            Some(alert) => {
                alert.resolved = true;
                alert.resolved_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn resolve_all_open(&self) -> StorageResult<usize> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut resolved = 0;
        for alert in state.alerts.iter_mut().filter(|alert| !alert.resolved) {
            alert.resolved = true;
            alert.resolved_at = Some(now);
            resolved += 1;
        }
        Ok(resolved)
    }

    async fn list_alerts(&self, resolved: bool, limit: usize) -> StorageResult<Vec<AlertRow>> {
        let state = self.state.read().await;
        Ok(state
            .alerts
            .iter()
            .rev()
            .filter(|alert| alert.resolved == resolved)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn open_alert_counts(&self) -> StorageResult<HashMap<TargetId, usize>> {
        let state = self.state.read().await;
        let mut counts = HashMap::new();
        for alert in state.alerts.iter().filter(|alert| !alert.resolved) {
            *counts.entry(alert.target_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn fleet_stats(&self, since: DateTime<Utc>) -> StorageResult<FleetStats> {
        let state = self.state.read().await;
        let mut stats = FleetStats {
            total_targets: state.targets.len(),
            ..FleetStats::default()
        };

        for target in state.targets.values() {
            match target.connection.status {
                TargetStatus::Online => stats.online_targets += 1,
                TargetStatus::Offline => stats.offline_targets += 1,
                TargetStatus::Unknown => stats.unknown_targets += 1,
            }
        }

        let mut alerting = std::collections::HashSet::new();
        for alert in state.alerts.iter().filter(|alert| !alert.resolved) {
            stats.open_alerts += 1;
            match alert.severity {
                Severity::Critical => stats.critical_alerts += 1,
                Severity::Warning => stats.warning_alerts += 1,
            }
            alerting.insert(alert.target_id);
        }
        stats.targets_with_alerts = alerting.len();

        let (mut cpu, mut memory, mut disk, mut recent) = (0.0_f64, 0.0_f64, 0.0_f64, 0usize);
        for row in state.samples.values().flatten() {
            stats.total_samples += 1;
            if row.timestamp >= since {
                cpu += row.cpu_usage as f64;
                memory += row.memory_usage as f64;
                disk += row.disk_usage as f64;
                recent += 1;
            }
        }
        if recent > 0 {
            stats.average_cpu = round1(cpu / recent as f64);
            stats.average_memory = round1(memory / recent as f64);
            stats.average_disk = round1(disk / recent as f64);
        }

        Ok(stats)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let state = self.state.read().await;
        let total: usize = state.samples.values().map(VecDeque::len).sum();
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("total_samples".to_string(), total.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
