//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Alert deduplication is enforced by a partial unique index on
//! `(target_id, kind, message) WHERE resolved = 0`; inserts use
//! `INSERT OR IGNORE` and report suppression through `rows_affected`.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{AlertRow, FleetStats, MetricKind, SampleRow, Severity};
use crate::config::TargetConfig;
use crate::util::round1;
use crate::{ConnectionState, Credential, Sample, Target, TargetId, TargetStatus, Thresholds};

const TARGET_COLUMNS: &str = "id, name, address, port, user, credential, cpu_threshold, \
     memory_threshold, disk_threshold, status, failure_count, last_success";

const ALERT_COLUMNS: &str =
    "id, target_id, kind, severity, message, resolved, created_at, resolved_at";

const SAMPLE_COLUMNS: &str = "id, target_id, cpu_usage, memory_usage, disk_usage, \
     load_average, process_count, timestamp";

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Open (or create) the database file and run migrations.
    ///
    /// ```no_run
    /// # use fleet_monitoring::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./fleet.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn target_from_row(row: &SqliteRow) -> StorageResult<Target> {
        let credential: Credential = serde_json::from_str(row.try_get("credential")?)?;
        let status: TargetStatus = row
            .try_get::<String, _>("status")?
            .parse()
            .map_err(StorageError::SerializationError)?;

        Ok(Target {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            address: row.try_get("address")?,
            port: row.try_get::<i64, _>("port")? as u16,
            user: row.try_get("user")?,
            credential,
            thresholds: Thresholds {
                cpu: row.try_get::<i64, _>("cpu_threshold")? as u8,
                memory: row.try_get::<i64, _>("memory_threshold")? as u8,
                disk: row.try_get::<i64, _>("disk_threshold")? as u8,
            },
            connection: ConnectionState {
                status,
                failure_count: row.try_get::<i64, _>("failure_count")? as u32,
                last_success: row
                    .try_get::<Option<i64>, _>("last_success")?
                    .map(Self::millis_to_timestamp),
            },
        })
    }

    fn alert_from_row(row: &SqliteRow) -> StorageResult<AlertRow> {
        Ok(AlertRow {
            id: row.try_get("id")?,
            target_id: row.try_get("target_id")?,
            kind: row
                .try_get::<String, _>("kind")?
                .parse()
                .map_err(StorageError::SerializationError)?,
            severity: row
                .try_get::<String, _>("severity")?
                .parse()
                .map_err(StorageError::SerializationError)?,
            message: row.try_get("message")?,
            resolved: row.try_get::<i64, _>("resolved")? != 0,
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
            resolved_at: row
                .try_get::<Option<i64>, _>("resolved_at")?
                .map(Self::millis_to_timestamp),
        })
    }

    fn sample_from_row(row: &SqliteRow) -> StorageResult<SampleRow> {
        Ok(SampleRow {
            id: row.try_get("id")?,
            target_id: row.try_get("target_id")?,
            cpu_usage: row.try_get::<f64, _>("cpu_usage")? as f32,
            memory_usage: row.try_get::<f64, _>("memory_usage")? as f32,
            disk_usage: row.try_get::<f64, _>("disk_usage")? as f32,
            load_average: row.try_get("load_average")?,
            process_count: row.try_get::<i64, _>("process_count")? as u32,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?),
        })
    }

    /// Map a unique-constraint violation on the target name to `Conflict`
    fn name_conflict(err: sqlx::Error, name: &str) -> StorageError {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::Conflict(format!("target {name}"))
            }
            _ => err.into(),
        }
    }

    async fn target_by_name(&self, name: &str) -> StorageResult<Target> {
        let row = sqlx::query(&format!("SELECT {TARGET_COLUMNS} FROM targets WHERE name = ?"))
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Self::target_from_row(&row)
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self))]
    async fn list_targets(&self) -> StorageResult<Vec<Target>> {
        let rows = sqlx::query(&format!("SELECT {TARGET_COLUMNS} FROM targets ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::target_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn get_target(&self, id: TargetId) -> StorageResult<Option<Target>> {
        let row = sqlx::query(&format!("SELECT {TARGET_COLUMNS} FROM targets WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::target_from_row).transpose()
    }

    #[instrument(skip(self, config), fields(name = %config.name))]
    async fn register_target(&self, config: &TargetConfig) -> StorageResult<Target> {
        let credential = serde_json::to_string(&config.credential)?;

        sqlx::query(
            r#"
            INSERT INTO targets (
                name, address, port, user, credential,
                cpu_threshold, memory_threshold, disk_threshold, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (name) DO UPDATE SET
                address = excluded.address,
                port = excluded.port,
                user = excluded.user,
                credential = excluded.credential,
                cpu_threshold = excluded.cpu_threshold,
                memory_threshold = excluded.memory_threshold,
                disk_threshold = excluded.disk_threshold
            "#,
        )
        .bind(&config.name)
        .bind(&config.address)
        .bind(config.port as i64)
        .bind(&config.user)
        .bind(credential)
        .bind(config.cpu_threshold as i64)
        .bind(config.memory_threshold as i64)
        .bind(config.disk_threshold as i64)
        .bind(Self::timestamp_to_millis(&Utc::now()))
        .execute(&self.pool)
        .await?;

        let target = self.target_by_name(&config.name).await?;
        debug!("registered target {}", target.display());
        Ok(target)
    }

    #[instrument(skip(self, config), fields(name = %config.name))]
    async fn create_target(&self, config: &TargetConfig) -> StorageResult<Target> {
        let credential = serde_json::to_string(&config.credential)?;

        let result = sqlx::query(
            r#"
            INSERT INTO targets (
                name, address, port, user, credential,
                cpu_threshold, memory_threshold, disk_threshold, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&config.name)
        .bind(&config.address)
        .bind(config.port as i64)
        .bind(&config.user)
        .bind(credential)
        .bind(config.cpu_threshold as i64)
        .bind(config.memory_threshold as i64)
        .bind(config.disk_threshold as i64)
        .bind(Self::timestamp_to_millis(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| Self::name_conflict(e, &config.name))?;

        let id = result.last_insert_rowid();
        let target = self
            .get_target(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("target {id}")))?;
        debug!("created target {}", target.display());
        Ok(target)
    }

    #[instrument(skip(self, config), fields(name = %config.name))]
    async fn update_target(&self, id: TargetId, config: &TargetConfig) -> StorageResult<Target> {
        let credential = serde_json::to_string(&config.credential)?;

        let result = sqlx::query(
            r#"
            UPDATE targets SET
                name = ?, address = ?, port = ?, user = ?, credential = ?,
                cpu_threshold = ?, memory_threshold = ?, disk_threshold = ?
            WHERE id = ?
            "#,
        )
        .bind(&config.name)
        .bind(&config.address)
        .bind(config.port as i64)
        .bind(&config.user)
        .bind(credential)
        .bind(config.cpu_threshold as i64)
        .bind(config.memory_threshold as i64)
        .bind(config.disk_threshold as i64)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::name_conflict(e, &config.name))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("target {id}")));
        }

        self.get_target(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("target {id}")))
    }

    #[instrument(skip(self))]
    async fn remove_target(&self, id: TargetId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM targets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn update_target_status(
        &self,
        id: TargetId,
        status: TargetStatus,
        success: bool,
    ) -> StorageResult<()> {
        let result = if success {
            sqlx::query(
                "UPDATE targets SET status = ?, failure_count = 0, last_success = ? WHERE id = ?",
            )
            .bind(status.as_str())
            .bind(Self::timestamp_to_millis(&Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                "UPDATE targets SET status = ?, failure_count = failure_count + 1 WHERE id = ?",
            )
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("target {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self, sample))]
    async fn insert_sample(&self, target_id: TargetId, sample: &Sample) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO samples (
                target_id, cpu_usage, memory_usage, disk_usage,
                load_average, process_count, timestamp
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(target_id)
        .bind(sample.cpu_usage as f64)
        .bind(sample.memory_usage as f64)
        .bind(sample.disk_usage as f64)
        .bind(&sample.load_average)
        .bind(sample.process_count as i64)
        .bind(Self::timestamp_to_millis(&sample.collected_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn query_latest(&self, target_id: TargetId, limit: usize) -> StorageResult<Vec<SampleRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM samples WHERE target_id = ? \
             ORDER BY timestamp DESC, id DESC LIMIT ?"
        ))
        .bind(target_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut results = rows
            .iter()
            .map(Self::sample_from_row)
            .collect::<StorageResult<Vec<_>>>()?;
        // Reverse to get chronological order (oldest first)
        results.reverse();
        debug!("query returned {} samples", results.len());
        Ok(results)
    }

    #[instrument(skip(self), fields(since = %since))]
    async fn query_range(
        &self,
        target_id: Option<TargetId>,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<SampleRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM samples \
             WHERE timestamp >= ? AND (? IS NULL OR target_id = ?) \
             ORDER BY timestamp DESC, id DESC LIMIT ?"
        ))
        .bind(Self::timestamp_to_millis(&since))
        .bind(target_id)
        .bind(target_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::sample_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn clear_samples(&self) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM samples").execute(&self.pool).await?;
        let deleted = result.rows_affected() as usize;
        info!("cleared {} samples", deleted);
        Ok(deleted)
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_old_samples(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM samples WHERE timestamp < ?")
            .bind(Self::timestamp_to_millis(&before))
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        info!("deleted {} old samples", deleted);

        Ok(deleted)
    }

    #[instrument(skip(self, message))]
    async fn find_open_alert(
        &self,
        target_id: TargetId,
        kind: MetricKind,
        message: &str,
    ) -> StorageResult<Option<AlertRow>> {
        let row = sqlx::query(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts \
             WHERE target_id = ? AND kind = ? AND message = ? AND resolved = 0"
        ))
        .bind(target_id)
        .bind(kind.as_str())
        .bind(message)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::alert_from_row).transpose()
    }

    #[instrument(skip(self, message))]
    async fn insert_alert(
        &self,
        target_id: TargetId,
        kind: MetricKind,
        message: &str,
        severity: Severity,
    ) -> StorageResult<Option<AlertRow>> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO alerts (target_id, kind, severity, message, resolved, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(target_id)
        .bind(kind.as_str())
        .bind(severity.as_str())
        .bind(message)
        .bind(Self::timestamp_to_millis(&created_at))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!("open {kind} alert already exists for target {target_id}");
            return Ok(None);
        }

        Ok(Some(AlertRow {
            id: result.last_insert_rowid(),
            target_id,
            kind,
            severity,
            message: message.to_string(),
            resolved: false,
            created_at: Self::millis_to_timestamp(Self::timestamp_to_millis(&created_at)),
            resolved_at: None,
        }))
    }

    #[instrument(skip(self))]
    async fn resolve_alert(&self, id: i64) -> StorageResult<bool> {
        let result =
            sqlx::query("UPDATE alerts SET resolved = 1, resolved_at = ? WHERE id = ? AND resolved = 0")
                .bind(Self::timestamp_to_millis(&Utc::now()))
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn resolve_all_open(&self) -> StorageResult<usize> {
        let result = sqlx::query("UPDATE alerts SET resolved = 1, resolved_at = ? WHERE resolved = 0")
            .bind(Self::timestamp_to_millis(&Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    #[instrument(skip(self))]
    async fn list_alerts(&self, resolved: bool, limit: usize) -> StorageResult<Vec<AlertRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE resolved = ? ORDER BY id DESC LIMIT ?"
        ))
        .bind(resolved as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::alert_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn open_alert_counts(&self) -> StorageResult<HashMap<TargetId, usize>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT target_id, COUNT(*) FROM alerts WHERE resolved = 0 GROUP BY target_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(target_id, count)| (target_id, count as usize))
            .collect())
    }

    #[instrument(skip(self))]
    async fn fleet_stats(&self, since: DateTime<Utc>) -> StorageResult<FleetStats> {
        let mut stats = FleetStats::default();

        let statuses: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM targets GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        for (status, count) in statuses {
            let count = count as usize;
            stats.total_targets += count;
            match status.parse::<TargetStatus>() {
                Ok(TargetStatus::Online) => stats.online_targets += count,
                Ok(TargetStatus::Offline) => stats.offline_targets += count,
                Ok(TargetStatus::Unknown) => stats.unknown_targets += count,
                Err(e) => warn!("ignoring targets with bad status: {e}"),
            }
        }

        let severities: Vec<(String, i64)> = sqlx::query_as(
            "SELECT severity, COUNT(*) FROM alerts WHERE resolved = 0 GROUP BY severity",
        )
        .fetch_all(&self.pool)
        .await?;
        for (severity, count) in severities {
            let count = count as usize;
            stats.open_alerts += count;
            match severity.parse::<Severity>() {
                Ok(Severity::Critical) => stats.critical_alerts += count,
                Ok(Severity::Warning) => stats.warning_alerts += count,
                Err(e) => warn!("ignoring alerts with bad severity: {e}"),
            }
        }

        let (with_alerts,): (i64,) =
            sqlx::query_as("SELECT COUNT(DISTINCT target_id) FROM alerts WHERE resolved = 0")
                .fetch_one(&self.pool)
                .await?;
        stats.targets_with_alerts = with_alerts as usize;

        let (cpu, memory, disk): (Option<f64>, Option<f64>, Option<f64>) = sqlx::query_as(
            "SELECT AVG(cpu_usage), AVG(memory_usage), AVG(disk_usage) FROM samples WHERE timestamp >= ?",
        )
        .bind(Self::timestamp_to_millis(&since))
        .fetch_one(&self.pool)
        .await?;
        stats.average_cpu = round1(cpu.unwrap_or_default());
        stats.average_memory = round1(memory.unwrap_or_default());
        stats.average_disk = round1(disk.unwrap_or_default());

        let (total_samples,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM samples")
            .fetch_one(&self.pool)
            .await?;
        stats.total_samples = total_samples as usize;

        Ok(stats)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
