//! Storage backend trait definition
//!
//! `StorageBackend` is the persistence gateway of the collector: targets,
//! samples and alerts all live behind it. Every call is a single request
//! with failure reported as a `StorageError`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{AlertRow, FleetStats, MetricKind, SampleRow, Severity};
use crate::config::TargetConfig;
use crate::{Sample, Target, TargetId, TargetStatus};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Trait for persistent storage backends
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`: one instance is shared by every
/// per-target unit of a cycle, so all writes arrive concurrently.
///
/// ## Alert deduplication
///
/// `insert_alert` must be atomic with respect to the dedup key
/// `(target_id, kind, message)` among unresolved alerts. Two concurrent
/// inserts with the same key leave exactly one open row.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// All registered targets, ordered by id
    async fn list_targets(&self) -> StorageResult<Vec<Target>>;

    async fn get_target(&self, id: TargetId) -> StorageResult<Option<Target>>;

    /// Register a target, or update address/credentials/thresholds of the
    /// target with the same name. Connection state of an existing target
    /// is left alone.
    async fn register_target(&self, config: &TargetConfig) -> StorageResult<Target>;

    /// Register a new target; fails with `Conflict` if the name is taken
    async fn create_target(&self, config: &TargetConfig) -> StorageResult<Target>;

    /// Replace name, address, credentials and thresholds of a target.
    ///
    /// Fails with `NotFound` for an unknown id and `Conflict` when the new
    /// name belongs to another target. Connection state is left alone.
    async fn update_target(&self, id: TargetId, config: &TargetConfig) -> StorageResult<Target>;

    /// Delete a target together with its samples and alerts
    async fn remove_target(&self, id: TargetId) -> StorageResult<bool>;

    /// Record one poll outcome.
    ///
    /// `success` resets the failure counter and stamps the last success,
    /// otherwise the counter is incremented.
    async fn update_target_status(
        &self,
        id: TargetId,
        status: TargetStatus,
        success: bool,
    ) -> StorageResult<()>;

    async fn insert_sample(&self, target_id: TargetId, sample: &Sample) -> StorageResult<()>;

    /// The N most recent samples of a target, oldest first
    async fn query_latest(&self, target_id: TargetId, limit: usize) -> StorageResult<Vec<SampleRow>>;

    /// Samples collected at or after `since`, newest first.
    ///
    /// Covers every target when `target_id` is `None`.
    async fn query_range(
        &self,
        target_id: Option<TargetId>,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<SampleRow>>;

    /// Delete samples older than the given timestamp, returning the count
    async fn cleanup_old_samples(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    /// Delete every stored sample, returning the count
    async fn clear_samples(&self) -> StorageResult<usize>;

    async fn find_open_alert(
        &self,
        target_id: TargetId,
        kind: MetricKind,
        message: &str,
    ) -> StorageResult<Option<AlertRow>>;

    /// Insert an alert unless an unresolved one with the same key exists.
    ///
    /// Returns the new row, or `None` when the insert was suppressed.
    async fn insert_alert(
        &self,
        target_id: TargetId,
        kind: MetricKind,
        message: &str,
        severity: Severity,
    ) -> StorageResult<Option<AlertRow>>;

    /// Resolve one alert; `false` if it was unknown or already resolved
    async fn resolve_alert(&self, id: i64) -> StorageResult<bool>;

    /// Resolve every open alert, returning how many changed
    async fn resolve_all_open(&self) -> StorageResult<usize>;

    /// Alerts with the given resolved flag, newest first
    async fn list_alerts(&self, resolved: bool, limit: usize) -> StorageResult<Vec<AlertRow>>;

    /// Number of unresolved alerts per target (targets without any are absent)
    async fn open_alert_counts(&self) -> StorageResult<HashMap<TargetId, usize>>;

    /// Fleet aggregates, averaging samples collected at or after `since`
    async fn fleet_stats(&self, since: DateTime<Utc>) -> StorageResult<FleetStats>;

    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
