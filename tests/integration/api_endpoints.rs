//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - All REST endpoints return correct responses
//! - Authentication middleware functions properly
//! - Connection tests update the target's status
//! - Targets can be registered, changed and removed at runtime
//! - Sample history can be queried by time window and cleared
//! - The WebSocket stream sends the initial snapshot, updates and pongs

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use fleet_monitoring::{
    Sample, TargetStatus,
    actors::{
        broadcast::Broadcaster,
        messages::{FleetEvent, FleetSnapshot},
    },
    api::{ApiConfig, ApiState, spawn_api_server},
    storage::{MetricKind, Severity, StorageBackend, memory::MemoryBackend},
};
use futures::{SinkExt, Stream, StreamExt};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::{Message, client::IntoClientRequest};

use crate::helpers::{
    ProbeScript, Script, ScriptedConnector, spawn_settled_collector_on, target_config,
};

const TOKEN: &str = "test-token";

struct TestApi {
    addr: SocketAddr,
    store: Arc<dyn StorageBackend>,
    broadcaster: Broadcaster,
    connector: ScriptedConnector,
    client: reqwest::Client,
}

impl TestApi {
    async fn spawn() -> Self {
        let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let broadcaster = Broadcaster::default();
        let connector = ScriptedConnector::new();
        let collector =
            spawn_settled_collector_on(store.clone(), &connector, broadcaster.clone()).await;

        let state = ApiState::new(
            store.clone(),
            broadcaster.clone(),
            collector,
            chrono::Duration::hours(1),
        );
        let config = ApiConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
            auth_token: Some(TOKEN.to_string()),
            enable_cors: true,
        };
        let addr = spawn_api_server(config, state).await.unwrap();

        Self {
            addr,
            store,
            broadcaster,
            connector,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}/api/v1{path}", self.addr)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap()
    }

    async fn post(&self, path: &str) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap()
    }

    async fn send_json(&self, method: reqwest::Method, path: &str, body: Value) -> reqwest::Response {
        self.client
            .request(method, self.url(path))
            .bearer_auth(TOKEN)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap()
    }
}

fn target_body(name: &str) -> Value {
    json!({
        "name": name,
        "address": format!("{name}.internal"),
        "user": "monitor",
        "credential": {"password": "secret"},
        "cpu_threshold": 75
    })
}

fn sample(cpu: f32) -> Sample {
    Sample {
        cpu_usage: cpu,
        memory_usage: 50.0,
        disk_usage: 60.0,
        load_average: "0.50".to_string(),
        process_count: 150,
        collected_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let api = TestApi::spawn().await;

    let response = api.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"]["healthy"], true);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_auth_is_enforced() {
    let api = TestApi::spawn().await;

    let missing = api.client.get(api.url("/health")).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let malformed = api
        .client
        .get(api.url("/health"))
        .header("Authorization", TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::UNAUTHORIZED);

    let wrong = api
        .client
        .get(api.url("/health"))
        .bearer_auth("not-the-token")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_snapshot_never_exposes_credentials() {
    let api = TestApi::spawn().await;
    let target = api.store.register_target(&target_config("web-1")).await.unwrap();
    api.store.insert_sample(target.id, &sample(33.0)).await.unwrap();

    let response = api.get("/snapshot").await;
    assert_eq!(response.status(), StatusCode::OK);

    let text = response.text().await.unwrap();
    assert!(!text.contains("secret"));

    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["targets"][0]["name"], "web-1");
    assert_eq!(body["targets"][0]["status"], "unknown");
    assert_eq!(body["targets"][0]["latest_sample"]["cpu_usage"], 33.0);
    assert_eq!(body["aggregateStats"]["total_targets"], 1);
    assert_eq!(body["aggregateStats"]["unknown_targets"], 1);
}

#[tokio::test]
async fn test_stats_endpoint() {
    let api = TestApi::spawn().await;
    let target = api.store.register_target(&target_config("web-1")).await.unwrap();
    api.store.insert_sample(target.id, &sample(20.0)).await.unwrap();
    api.store.insert_sample(target.id, &sample(30.0)).await.unwrap();

    let body: Value = api.get("/stats").await.json().await.unwrap();
    assert_eq!(body["total_samples"], 2);
    assert_eq!(body["average_cpu"], 25.0);
}

#[tokio::test]
async fn test_samples_endpoint() {
    let api = TestApi::spawn().await;
    let target = api.store.register_target(&target_config("web-1")).await.unwrap();
    for cpu in [10.0, 20.0, 30.0] {
        api.store.insert_sample(target.id, &sample(cpu)).await.unwrap();
    }

    let body: Value = api
        .get(&format!("/targets/{}/samples?limit=2", target.id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 2);
    // the two most recent, oldest first
    assert_eq!(body["samples"][0]["cpu_usage"], 20.0);
    assert_eq!(body["samples"][1]["cpu_usage"], 30.0);

    let unknown = api.get("/targets/9999/samples").await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let invalid = api
        .get(&format!("/targets/{}/samples?limit=0", target.id))
        .await;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_alert_resolution_endpoints() {
    let api = TestApi::spawn().await;
    let target = api.store.register_target(&target_config("web-1")).await.unwrap();
    let cpu = api
        .store
        .insert_alert(
            target.id,
            MetricKind::Cpu,
            "CPU usage too high: 95.0% (threshold: 80%)",
            Severity::Critical,
        )
        .await
        .unwrap()
        .unwrap();
    api.store
        .insert_alert(
            target.id,
            MetricKind::Memory,
            "Memory usage too high: 87.0% (threshold: 85%)",
            Severity::Warning,
        )
        .await
        .unwrap()
        .unwrap();

    let body: Value = api.get("/alerts").await.json().await.unwrap();
    assert_eq!(body["count"], 2);
    assert_eq!(body["alerts"][0]["kind"], "memory");

    let resolved = api.post(&format!("/alerts/{}/resolve", cpu.id)).await;
    assert_eq!(resolved.status(), StatusCode::OK);

    let again = api.post(&format!("/alerts/{}/resolve", cpu.id)).await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);

    let body: Value = api.post("/alerts/resolve-all").await.json().await.unwrap();
    assert_eq!(body["resolved"], 1);

    let body: Value = api
        .get("/alerts?resolved=true&limit=10")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 2);

    let body: Value = api.get("/alerts").await.json().await.unwrap();
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_connection_test_endpoint() {
    let api = TestApi::spawn().await;
    let reachable = api.store.register_target(&target_config("web-1")).await.unwrap();
    let refused = api.store.register_target(&target_config("web-2")).await.unwrap();
    api.connector.script("web-1", Script::Respond(ProbeScript::healthy()));
    api.connector.script("web-2", Script::Refuse);

    let body: Value = api
        .post(&format!("/targets/{}/test", reachable.id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["outcome"]["result"], "online");

    let body: Value = api
        .post(&format!("/targets/{}/test", refused.id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["outcome"]["result"], "offline");
    assert_eq!(
        body["outcome"]["reason"],
        "transport error: connection refused"
    );

    let reachable = api.store.get_target(reachable.id).await.unwrap().unwrap();
    assert_eq!(reachable.connection.status, TargetStatus::Online);
    let refused = api.store.get_target(refused.id).await.unwrap().unwrap();
    assert_eq!(refused.connection.status, TargetStatus::Offline);
    assert_eq!(refused.connection.failure_count, 1);

    let unknown = api.post("/targets/9999/test").await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_target_registration_lifecycle() {
    let api = TestApi::spawn().await;
    api.connector.script("web-3", Script::Respond(ProbeScript::healthy()));

    let created = api
        .send_json(reqwest::Method::POST, "/targets", target_body("web-3"))
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let body: Value = created.json().await.unwrap();
    let id = body["target"]["id"].as_i64().unwrap();
    assert_eq!(body["target"]["cpu_threshold"], 75);
    assert_eq!(body["target"]["status"], "online");
    assert_eq!(body["connection"]["outcome"]["result"], "online");

    let duplicate = api
        .send_json(reqwest::Method::POST, "/targets", target_body("web-3"))
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let mut invalid = target_body("web-4");
    invalid["disk_threshold"] = json!(0);
    let invalid = api.send_json(reqwest::Method::POST, "/targets", invalid).await;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let mut renamed = target_body("web-3a");
    renamed["memory_threshold"] = json!(70);
    let updated = api
        .send_json(reqwest::Method::PUT, &format!("/targets/{id}"), renamed)
        .await;
    assert_eq!(updated.status(), StatusCode::OK);
    let body: Value = updated.json().await.unwrap();
    assert_eq!(body["name"], "web-3a");
    assert_eq!(body["memory_threshold"], 70);
    assert_eq!(body["status"], "online");

    let removed = api.delete(&format!("/targets/{id}")).await;
    assert_eq!(removed.status(), StatusCode::OK);
    assert!(api.store.get_target(id).await.unwrap().is_none());

    let again = api.delete(&format!("/targets/{id}")).await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sample_history_and_clear() {
    let api = TestApi::spawn().await;
    let web = api.store.register_target(&target_config("web-1")).await.unwrap();
    let db = api.store.register_target(&target_config("db-1")).await.unwrap();

    let mut old = sample(90.0);
    old.collected_at = Utc::now() - chrono::Duration::hours(48);
    api.store.insert_sample(web.id, &old).await.unwrap();
    api.store.insert_sample(web.id, &sample(10.0)).await.unwrap();
    api.store.insert_sample(db.id, &sample(20.0)).await.unwrap();

    let body: Value = api.get("/samples").await.json().await.unwrap();
    assert_eq!(body["count"], 2);
    assert_eq!(body["samples"][0]["cpu_usage"], 20.0);

    let body: Value = api
        .get(&format!("/samples?target_id={}&hours=72", web.id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 2);
    assert_eq!(body["samples"][1]["cpu_usage"], 90.0);

    let invalid = api.get("/samples?limit=0").await;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let body: Value = api.delete("/samples").await.json().await.unwrap();
    assert_eq!(body["deleted"], 3);
    assert!(api.store.query_latest(web.id, 10).await.unwrap().is_empty());
}

async fn next_json<S>(ws: &mut S) -> Value
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    match ws.next().await.unwrap().unwrap() {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stream_sends_initial_updates_and_pongs() {
    let api = TestApi::spawn().await;
    api.store.register_target(&target_config("web-1")).await.unwrap();

    let mut request = format!("ws://{}/api/v1/stream", api.addr)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("Authorization", format!("Bearer {TOKEN}").parse().unwrap());
    let (mut ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();

    let initial = next_json(&mut ws).await;
    assert_eq!(initial["type"], "initial");
    assert_eq!(initial["targets"][0]["name"], "web-1");
    assert!(initial["aggregateStats"].is_object());

    let snapshot = FleetSnapshot::capture(api.store.as_ref(), chrono::Duration::hours(1))
        .await
        .unwrap();
    api.broadcaster.publish(FleetEvent::Update(snapshot));

    let update = next_json(&mut ws).await;
    assert_eq!(update["type"], "update");

    api.broadcaster.publish(FleetEvent::Ping {
        timestamp: Utc::now(),
    });
    assert_eq!(next_json(&mut ws).await["type"], "ping");

    ws.send(Message::Text("ping".to_string())).await.unwrap();
    match ws.next().await.unwrap().unwrap() {
        Message::Text(text) => assert_eq!(text, "pong"),
        other => panic!("expected pong, got {other:?}"),
    }

    ws.close(None).await.unwrap();
}
