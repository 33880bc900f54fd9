//! REST API and WebSocket server for fleet viewers
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check including storage health
//! - `GET /api/v1/snapshot` - Current fleet snapshot
//! - `GET /api/v1/stats` - Aggregate fleet statistics
//! - `POST /api/v1/targets` - Register a target and test its connection
//! - `PUT /api/v1/targets/:id` - Change a target's address, credentials or thresholds
//! - `DELETE /api/v1/targets/:id` - Remove a target with its samples and alerts
//! - `GET /api/v1/targets/:id/samples` - Recent samples of one target
//! - `POST /api/v1/targets/:id/test` - Run a connection test
//! - `GET /api/v1/samples` - Sample history of the last hours
//! - `DELETE /api/v1/samples` - Delete every stored sample
//! - `GET /api/v1/alerts` - Open or resolved alerts
//! - `POST /api/v1/alerts/:id/resolve` - Resolve one alert
//! - `POST /api/v1/alerts/resolve-all` - Resolve every open alert
//! - `WS /api/v1/stream` - Live fleet updates

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ApiSettings;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Optional authentication token
    pub auth_token: Option<String>,

    /// Enable CORS for browser viewers
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            auth_token: None,
            enable_cors: true,
        }
    }
}

impl From<&ApiSettings> for ApiConfig {
    fn from(settings: &ApiSettings) -> Self {
        Self {
            bind_addr: settings.bind,
            auth_token: settings.token.clone(),
            enable_cors: settings.cors,
        }
    }
}

/// Build the router with all routes and layers
pub fn router(state: ApiState, config: &ApiConfig) -> Router {
    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/snapshot", get(routes::snapshot::get_snapshot))
        .route("/api/v1/stats", get(routes::stats::get_stats))
        .route("/api/v1/targets", post(routes::targets::create_target))
        .route(
            "/api/v1/targets/:id",
            put(routes::targets::update_target).delete(routes::targets::remove_target),
        )
        .route(
            "/api/v1/targets/:id/samples",
            get(routes::targets::get_samples),
        )
        .route(
            "/api/v1/targets/:id/test",
            post(routes::targets::test_connection),
        )
        .route(
            "/api/v1/samples",
            get(routes::samples::get_history).delete(routes::samples::clear_samples),
        )
        .route("/api/v1/alerts", get(routes::alerts::list_alerts))
        .route(
            "/api/v1/alerts/resolve-all",
            post(routes::alerts::resolve_all),
        )
        .route(
            "/api/v1/alerts/:id/resolve",
            post(routes::alerts::resolve_alert),
        )
        .route("/api/v1/stream", get(websocket::websocket_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    if let Some(token) = config.auth_token.clone() {
        app = app.layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let local_addr = listener.local_addr()?;

    info!("API server listening on {local_addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {e}");
        }
    });

    Ok(local_addr)
}
