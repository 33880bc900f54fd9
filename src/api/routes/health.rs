//! Health check endpoint

use axum::{Json, extract::State};

use crate::api::state::ApiState;
use crate::api::types::{HealthResponse, StorageHealth};

/// GET /api/v1/health
///
/// Reports `ok` when storage is healthy, `degraded` otherwise
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let storage = match state.store.health_check().await {
        Ok(health) => StorageHealth {
            healthy: health.healthy,
            message: health.message,
            metadata: health.metadata,
        },
        Err(e) => StorageHealth {
            healthy: false,
            message: e.to_string(),
            metadata: Default::default(),
        },
    };

    let status = if storage.healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        storage,
        viewers: state.broadcaster.viewer_count(),
    })
}
