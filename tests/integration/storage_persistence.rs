//! Integration tests for SQLite persistence
//!
//! These tests verify that:
//! - Targets, samples and alerts survive a restart
//! - The collector deduplicates alerts against the database
//! - Removing a target removes its history
//! - Retention cleanup only deletes old samples

use std::sync::Arc;

use chrono::{Duration, Utc};
use fleet_monitoring::{
    Sample, TargetStatus,
    config::StorageConfig,
    storage::{MetricKind, Severity, StorageBackend, open_backend, sqlite::SqliteBackend},
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::helpers::{
    ProbeScript, Script, ScriptedConnector, spawn_settled_collector, target_config,
};

fn sample_at(cpu: f32, collected_at: chrono::DateTime<Utc>) -> Sample {
    Sample {
        cpu_usage: cpu,
        memory_usage: 30.0,
        disk_usage: 40.0,
        load_average: "0.10".to_string(),
        process_count: 99,
        collected_at,
    }
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("fleet.db");

    let target_id = {
        let store = SqliteBackend::new(&db_path).await.unwrap();
        let target = store.register_target(&target_config("web-1")).await.unwrap();
        store
            .insert_sample(target.id, &sample_at(42.0, Utc::now()))
            .await
            .unwrap();
        store
            .insert_alert(
                target.id,
                MetricKind::Disk,
                "Disk usage too high: 96.0% (threshold: 90%)",
                Severity::Critical,
            )
            .await
            .unwrap()
            .unwrap();
        store
            .update_target_status(target.id, TargetStatus::Offline, false)
            .await
            .unwrap();
        store.close().await.unwrap();
        target.id
    };

    let store = SqliteBackend::new(&db_path).await.unwrap();

    let target = store.get_target(target_id).await.unwrap().unwrap();
    assert_eq!(target.name, "web-1");
    assert_eq!(target.connection.status, TargetStatus::Offline);
    assert_eq!(target.connection.failure_count, 1);

    let samples = store.query_latest(target_id, 10).await.unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].cpu_usage, 42.0);

    let open = store.list_alerts(false, 10).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].severity, Severity::Critical);

    // registering again keeps the id and the connection state
    let again = store.register_target(&target_config("web-1")).await.unwrap();
    assert_eq!(again.id, target_id);
    assert_eq!(again.connection.failure_count, 1);
}

#[tokio::test]
async fn test_collector_dedups_against_database() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn StorageBackend> =
        Arc::new(SqliteBackend::new(dir.path().join("fleet.db")).await.unwrap());

    let first = store.register_target(&target_config("web-1")).await.unwrap();
    let second = store.register_target(&target_config("web-2")).await.unwrap();

    let connector = ScriptedConnector::new();
    connector.script("web-1", Script::Respond(ProbeScript::healthy().with_cpu("92")));
    connector.script("web-2", Script::Respond(ProbeScript::healthy().with_cpu("92")));

    let handle = spawn_settled_collector(store.clone(), &connector).await;
    let report = handle.poll_now().await.unwrap();

    assert_eq!(report.target(first.id).unwrap().alerts_created, 0);
    assert_eq!(report.target(second.id).unwrap().alerts_created, 0);

    // identical messages on different targets are distinct alerts
    let open = store.list_alerts(false, 10).await.unwrap();
    assert_eq!(open.len(), 2);
    assert!(
        open.iter()
            .all(|alert| alert.message == "CPU usage too high: 92.0% (threshold: 80%)")
    );

    assert_eq!(store.query_latest(first.id, 10).await.unwrap().len(), 2);

    let stats = store.fleet_stats(Utc::now() - Duration::hours(1)).await.unwrap();
    assert_eq!(stats.total_targets, 2);
    assert_eq!(stats.online_targets, 2);
    assert_eq!(stats.targets_with_alerts, 2);
    assert_eq!(stats.critical_alerts, 2);
    assert_eq!(stats.total_samples, 4);
    assert_eq!(stats.average_cpu, 92.0);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_remove_target_cascades() {
    let dir = tempdir().unwrap();
    let store = SqliteBackend::new(dir.path().join("fleet.db")).await.unwrap();

    let target = store.register_target(&target_config("old-1")).await.unwrap();
    store
        .insert_sample(target.id, &sample_at(10.0, Utc::now()))
        .await
        .unwrap();
    store
        .insert_alert(
            target.id,
            MetricKind::Cpu,
            "CPU usage too high: 99.0% (threshold: 80%)",
            Severity::Critical,
        )
        .await
        .unwrap();

    assert!(store.remove_target(target.id).await.unwrap());
    assert!(!store.remove_target(target.id).await.unwrap());

    assert!(store.get_target(target.id).await.unwrap().is_none());
    assert!(store.query_latest(target.id, 10).await.unwrap().is_empty());
    assert!(store.list_alerts(false, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_retention_cleanup() {
    let dir = tempdir().unwrap();
    let store = SqliteBackend::new(dir.path().join("fleet.db")).await.unwrap();
    let target = store.register_target(&target_config("web-1")).await.unwrap();

    let now = Utc::now();
    store
        .insert_sample(target.id, &sample_at(10.0, now - Duration::days(40)))
        .await
        .unwrap();
    store
        .insert_sample(target.id, &sample_at(20.0, now - Duration::days(31)))
        .await
        .unwrap();
    store
        .insert_sample(target.id, &sample_at(30.0, now - Duration::days(1)))
        .await
        .unwrap();

    let deleted = store
        .cleanup_old_samples(now - Duration::days(30))
        .await
        .unwrap();
    assert_eq!(deleted, 2);

    let remaining = store.query_latest(target.id, 10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].cpu_usage, 30.0);
}

#[tokio::test]
async fn test_open_backend_from_config() {
    let dir = tempdir().unwrap();
    let config = StorageConfig::Sqlite {
        path: dir.path().join("configured.db"),
        retention_days: 7,
    };

    let store = open_backend(&config).await.unwrap();
    let health = store.health_check().await.unwrap();
    assert!(health.healthy);

    let memory = open_backend(&StorageConfig::None).await.unwrap();
    assert!(memory.list_targets().await.unwrap().is_empty());
}
