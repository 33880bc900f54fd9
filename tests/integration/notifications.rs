//! Integration tests for outbound alert notifications
//!
//! These tests verify that:
//! - Webhook and Discord payloads carry the alert details
//! - Only newly created alert rows are sent out
//! - A failing endpoint never blocks alert storage
//! - An endpoint that never answers stalls neither units nor the cycle

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleet_monitoring::{
    Sample, Target, TargetStatus,
    actors::{
        broadcast::Broadcaster,
        collector::CollectorHandle,
        notifier::NotifierHandle,
    },
    alerts::AlertManager,
    config::{Alert, Discord, Webhook},
    monitors::resources::{AlertEvaluator, evaluate},
    storage::{StorageBackend, memory::MemoryBackend},
};
use pretty_assertions::assert_eq;
use serde_json::Value;
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{
    ProbeScript, Script, ScriptedConnector, collector_settings, executor, target_config,
};

fn sample(cpu: f32, memory: f32, disk: f32) -> Sample {
    Sample {
        cpu_usage: cpu,
        memory_usage: memory,
        disk_usage: disk,
        load_average: "1.05".to_string(),
        process_count: 212,
        collected_at: Utc::now(),
    }
}

async fn registered_target(store: &dyn StorageBackend) -> Target {
    store.register_target(&target_config("web-1")).await.unwrap()
}

fn webhook(url: String) -> AlertManager {
    AlertManager::new(Alert::Webhook(Webhook { url })).unwrap()
}

/// Wait until the mock server has seen `count` requests
async fn wait_for_requests(server: &MockServer, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.received_requests().await.unwrap().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

/// A webhook endpoint that accepts connections and never responds
async fn silent_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            open.push(socket);
        }
    });
    format!("http://{addr}/hook")
}

async fn received_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_webhook_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryBackend::new();
    let target = registered_target(&store).await;
    let manager = webhook(format!("{}/hook", server.uri()));

    let candidate = evaluate(&target.thresholds, &sample(97.0, 10.0, 10.0))
        .into_iter()
        .next()
        .unwrap();
    manager.send_alert(&target, &candidate).await;

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert_eq!(body["type"], "cpu");
    assert_eq!(body["severity"], "critical");
    assert_eq!(body["target"], "web-1 (web-1.internal:22)");
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("CPU usage too high: 97.0% (threshold: 80%)")
    );
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_discord_payload_mentions_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/webhooks/1/abc"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryBackend::new();
    let target = registered_target(&store).await;
    let manager = AlertManager::new(Alert::Discord(Discord {
        url: format!("{}/api/webhooks/1/abc", server.uri()),
        user_id: Some("4242".to_string()),
    }))
    .unwrap();

    let candidate = evaluate(&target.thresholds, &sample(10.0, 88.0, 10.0))
        .into_iter()
        .next()
        .unwrap();
    manager.send_alert(&target, &candidate).await;

    let bodies = received_bodies(&server).await;
    let body = &bodies[0];
    assert!(body["content"].as_str().unwrap().contains("<@4242>"));

    let embed = &body["embeds"][0];
    assert_eq!(embed["title"], "⚠️ Memory Warning");
    assert_eq!(embed["fields"][0]["value"], "88.0%");
    assert_eq!(embed["fields"][1]["value"], "85%");
}

#[tokio::test]
async fn test_only_new_alerts_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let target = registered_target(store.as_ref()).await;
    let notifier = NotifierHandle::spawn(webhook(format!("{}/hook", server.uri())));
    let evaluator = AlertEvaluator::new(store.clone(), Some(notifier));

    // cpu and disk breach, memory fine
    let breach = sample(92.0, 50.0, 96.0);
    assert_eq!(evaluator.apply(&target, &breach).await, 2);
    assert_eq!(evaluator.apply(&target, &breach).await, 0);

    assert_eq!(store.list_alerts(false, 10).await.unwrap().len(), 2);
    wait_for_requests(&server, 2).await;
}

#[tokio::test]
async fn test_failing_endpoint_does_not_block_storage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let target = registered_target(store.as_ref()).await;
    let notifier = NotifierHandle::spawn(webhook(format!("{}/hook", server.uri())));
    let evaluator = AlertEvaluator::new(store.clone(), Some(notifier));

    assert_eq!(evaluator.apply(&target, &sample(99.0, 0.0, 0.0)).await, 1);
    wait_for_requests(&server, 1).await;

    let open = store.list_alerts(false, 10).await.unwrap();
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn test_silent_endpoint_times_out() {
    let store = MemoryBackend::new();
    let target = registered_target(&store).await;
    let manager = AlertManager::with_timeout(
        Alert::Webhook(Webhook {
            url: silent_endpoint().await,
        }),
        Duration::from_millis(200),
    )
    .unwrap();

    let candidate = evaluate(&target.thresholds, &sample(97.0, 10.0, 10.0))
        .into_iter()
        .next()
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), manager.send_alert(&target, &candidate))
        .await
        .expect("send_alert should give up on its own");
}

#[tokio::test]
async fn test_silent_endpoint_does_not_stall_the_cycle() {
    let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let target = registered_target(store.as_ref()).await;
    let connector = ScriptedConnector::new();
    connector.script(
        "web-1",
        Script::Respond(ProbeScript::healthy().with_cpu("95.0")),
    );

    let broadcaster = Broadcaster::default();
    let mut events = broadcaster.subscribe();
    let handle = CollectorHandle::spawn(
        collector_settings(),
        store.clone(),
        executor(&connector),
        Some(webhook(silent_endpoint().await)),
        broadcaster,
    );

    // the first cycle raises the alert and still settles
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("cycle should finish while the webhook hangs")
        .unwrap();

    let stored = store.get_target(target.id).await.unwrap().unwrap();
    assert_eq!(stored.connection.status, TargetStatus::Online);
    assert_eq!(store.list_alerts(false, 10).await.unwrap().len(), 1);

    let report = tokio::time::timeout(Duration::from_secs(5), handle.poll_now())
        .await
        .expect("later cycles keep running")
        .unwrap();
    assert_eq!(report.target(target.id).unwrap().alerts_created, 0);

    tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .expect("shutdown should not wait for the webhook")
        .unwrap();
}
