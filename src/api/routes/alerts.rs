//! Alert endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{AlertsQuery, AlertsResponse, ResolveResponse},
};

/// GET /api/v1/alerts?resolved=&limit=
///
/// Newest first; open alerts unless `resolved=true`
pub async fn list_alerts(
    State(state): State<ApiState>,
    Query(query): Query<AlertsQuery>,
) -> ApiResult<Json<AlertsResponse>> {
    if query.limit == 0 {
        return Err(ApiError::InvalidRequest("limit must be positive".to_string()));
    }

    let alerts = state.store.list_alerts(query.resolved, query.limit).await?;

    Ok(Json(AlertsResponse {
        count: alerts.len(),
        alerts,
    }))
}

/// POST /api/v1/alerts/:id/resolve
pub async fn resolve_alert(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ResolveResponse>> {
    if !state.store.resolve_alert(id).await? {
        return Err(ApiError::NotFound(format!("open alert {id}")));
    }

    Ok(Json(ResolveResponse { resolved: 1 }))
}

/// POST /api/v1/alerts/resolve-all
pub async fn resolve_all(State(state): State<ApiState>) -> ApiResult<Json<ResolveResponse>> {
    let resolved = state.store.resolve_all_open().await?;
    Ok(Json(ResolveResponse { resolved }))
}
