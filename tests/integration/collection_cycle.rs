//! Integration tests for full collection cycles
//!
//! These tests verify that:
//! - Every target gets exactly one outcome per cycle
//! - A hanging target does not delay or affect its siblings
//! - Samples are only persisted when they carry usage data
//! - Viewers receive a snapshot after every cycle

use std::sync::Arc;

use assert_matches::assert_matches;
use fleet_monitoring::{
    TargetStatus,
    actors::{
        broadcast::Broadcaster,
        collector::CollectorHandle,
        messages::FleetEvent,
    },
    monitors::{
        session::SessionError,
        status::{FailureReason, PollOutcome},
    },
    storage::{StorageBackend, memory::MemoryBackend},
};
use pretty_assertions::assert_eq;

use crate::helpers::{
    ProbeScript, Script, ScriptedConnector, collector_settings, executor, spawn_settled_collector,
    spawn_settled_collector_on, target_config,
};

fn memory_store() -> Arc<dyn StorageBackend> {
    Arc::new(MemoryBackend::new())
}

#[tokio::test(start_paused = true)]
async fn test_hanging_target_does_not_affect_sibling() {
    let store = memory_store();
    let healthy = store.register_target(&target_config("web-1")).await.unwrap();
    let stuck = store.register_target(&target_config("web-2")).await.unwrap();

    let connector = ScriptedConnector::new();
    connector.script("web-1", Script::Respond(ProbeScript::healthy()));
    connector.script("web-2", Script::Hang);

    let broadcaster = Broadcaster::default();
    let handle = spawn_settled_collector_on(store.clone(), &connector, broadcaster.clone()).await;
    let mut events = broadcaster.subscribe();

    let report = handle.poll_now().await.unwrap();

    assert_eq!(report.targets.len(), 2);
    assert_eq!(report.online_count(), 1);

    let snapshot = assert_matches!(events.recv().await.unwrap(), FleetEvent::Update(s) => s);
    assert_eq!(snapshot.targets.len(), 2);
    let status_of = |id: fleet_monitoring::TargetId| {
        snapshot
            .targets
            .iter()
            .find(|summary| summary.id == id)
            .map(|summary| (summary.status, summary.failure_count))
            .unwrap()
    };
    assert_eq!(status_of(healthy.id), (TargetStatus::Online, 0));
    // the settled first cycle and this one both timed out
    assert_eq!(status_of(stuck.id), (TargetStatus::Offline, 2));

    let healthy_report = report.target(healthy.id).unwrap();
    assert_eq!(healthy_report.outcome, PollOutcome::Online);
    assert!(healthy_report.sample_stored);

    assert_eq!(
        report.target(stuck.id).unwrap().outcome,
        PollOutcome::Offline(FailureReason::Session(SessionError::Timeout))
    );

    let healthy = store.get_target(healthy.id).await.unwrap().unwrap();
    assert_eq!(healthy.connection.status, TargetStatus::Online);
    assert_eq!(healthy.connection.failure_count, 0);
    assert!(healthy.connection.last_success.is_some());

    let stuck = store.get_target(stuck.id).await.unwrap().unwrap();
    assert_eq!(stuck.connection.status, TargetStatus::Offline);
    assert_eq!(stuck.connection.failure_count, 2);
    assert_eq!(stuck.connection.last_success, None);

    let samples = store.query_latest(healthy.id, 10).await.unwrap();
    let latest = samples.last().unwrap();
    assert_eq!(latest.cpu_usage, 12.5);
    assert_eq!(latest.memory_usage, 40.2);
    assert_eq!(latest.disk_usage, 55.0);
    assert_eq!(latest.load_average, "0.42");
    assert_eq!(latest.process_count, 187);
    assert!(store.query_latest(stuck.id, 10).await.unwrap().is_empty());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failure_counter_accumulates_until_success() {
    let store = memory_store();
    let target = store.register_target(&target_config("db-1")).await.unwrap();

    let connector = ScriptedConnector::new();
    connector.script("db-1", Script::RejectCredentials);

    let handle = spawn_settled_collector(store.clone(), &connector).await;

    let report = handle.poll_now().await.unwrap();
    assert_eq!(
        report.target(target.id).unwrap().outcome,
        PollOutcome::Offline(FailureReason::Session(SessionError::AuthenticationFailed))
    );
    handle.poll_now().await.unwrap();

    let failing = store.get_target(target.id).await.unwrap().unwrap();
    assert_eq!(failing.connection.status, TargetStatus::Offline);
    assert_eq!(failing.connection.failure_count, 3);
    assert_eq!(connector.connects("db-1"), 3);

    connector.script("db-1", Script::Respond(ProbeScript::healthy()));
    handle.poll_now().await.unwrap();

    let recovered = store.get_target(target.id).await.unwrap().unwrap();
    assert_eq!(recovered.connection.status, TargetStatus::Online);
    assert_eq!(recovered.connection.failure_count, 0);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_empty_sample_is_not_stored_but_target_is_online() {
    let store = memory_store();
    let target = store.register_target(&target_config("edge-1")).await.unwrap();

    let connector = ScriptedConnector::new();
    connector.script("edge-1", Script::Respond(ProbeScript::unparseable()));

    let handle = spawn_settled_collector(store.clone(), &connector).await;

    let report = handle.poll_now().await.unwrap();
    let target_report = report.target(target.id).unwrap();

    assert_eq!(target_report.outcome, PollOutcome::Online);
    assert!(!target_report.sample_stored);
    assert_eq!(target_report.alerts_created, 0);
    assert!(store.query_latest(target.id, 10).await.unwrap().is_empty());

    let stored = store.get_target(target.id).await.unwrap().unwrap();
    assert_eq!(stored.connection.status, TargetStatus::Online);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cycle_publishes_update_snapshot() {
    let store = memory_store();
    let target = store.register_target(&target_config("web-1")).await.unwrap();

    let connector = ScriptedConnector::new();
    connector.script("web-1", Script::Respond(ProbeScript::healthy().with_cpu("95")));

    let broadcaster = Broadcaster::default();
    let mut events = broadcaster.subscribe();

    let handle = CollectorHandle::spawn(
        collector_settings(),
        store.clone(),
        executor(&connector),
        None,
        broadcaster,
    );

    let event = events.recv().await.unwrap();
    let snapshot = assert_matches!(event, FleetEvent::Update(snapshot) => snapshot);

    assert_eq!(snapshot.targets.len(), 1);
    let summary = &snapshot.targets[0];
    assert_eq!(summary.id, target.id);
    assert_eq!(summary.status, TargetStatus::Online);
    assert_eq!(summary.open_alerts, 1);
    assert_eq!(summary.latest_sample.as_ref().unwrap().cpu_usage, 95.0);

    assert_eq!(snapshot.stats.total_targets, 1);
    assert_eq!(snapshot.stats.online_targets, 1);
    assert_eq!(snapshot.stats.critical_alerts, 1);
    assert_eq!(snapshot.stats.average_cpu, 95.0);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cycle_without_targets_reports_nothing() {
    let connector = ScriptedConnector::new();
    let handle = CollectorHandle::spawn(
        collector_settings(),
        memory_store(),
        executor(&connector),
        None,
        Broadcaster::default(),
    );

    let report = handle.poll_now().await.unwrap();
    assert!(report.targets.is_empty());
    assert!(report.finished_at >= report.started_at);

    handle.shutdown().await.unwrap();
}
