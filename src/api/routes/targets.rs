//! Target registration and per-target endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::{info, warn};

use crate::actors::messages::{TargetReport, TargetSummary};
use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{CreatedTargetResponse, RemovedTargetResponse, SamplesQuery, SamplesResponse},
};
use crate::config::TargetConfig;
use crate::{Target, TargetId};

/// Upper bound for `limit` on sample queries
pub(crate) const MAX_SAMPLE_LIMIT: usize = 10_000;

async fn summarize(state: &ApiState, target: Target) -> ApiResult<TargetSummary> {
    let latest_sample = state.store.query_latest(target.id, 1).await?.pop();
    let open_alerts = state
        .store
        .open_alert_counts()
        .await?
        .get(&target.id)
        .copied()
        .unwrap_or_default();
    Ok(TargetSummary::new(target, latest_sample, open_alerts))
}

/// POST /api/v1/targets
///
/// Registers the target, then tests the connection once
pub async fn create_target(
    State(state): State<ApiState>,
    Json(config): Json<TargetConfig>,
) -> ApiResult<(StatusCode, Json<CreatedTargetResponse>)> {
    config.validate()?;

    let target = state.store.create_target(&config).await?;
    info!("registered {} through the API", target.display());

    let connection = match state.collector.test_connection(target.id).await {
        Ok(report) => report,
        Err(e) => {
            warn!("could not test new target {}: {e:#}", target.display());
            None
        }
    };

    let target = state
        .store
        .get_target(target.id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("target {}", target.id)))?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedTargetResponse {
            target: summarize(&state, target).await?,
            connection,
        }),
    ))
}

/// PUT /api/v1/targets/:id
pub async fn update_target(
    State(state): State<ApiState>,
    Path(id): Path<TargetId>,
    Json(config): Json<TargetConfig>,
) -> ApiResult<Json<TargetSummary>> {
    config.validate()?;

    let target = state.store.update_target(id, &config).await?;
    info!("updated {} through the API", target.display());

    Ok(Json(summarize(&state, target).await?))
}

/// DELETE /api/v1/targets/:id
///
/// Samples and alerts of the target go with it
pub async fn remove_target(
    State(state): State<ApiState>,
    Path(id): Path<TargetId>,
) -> ApiResult<Json<RemovedTargetResponse>> {
    if !state.store.remove_target(id).await? {
        return Err(ApiError::NotFound(format!("target {id}")));
    }
    info!("removed target {id} through the API");

    Ok(Json(RemovedTargetResponse { removed: id }))
}

/// GET /api/v1/targets/:id/samples?limit=
///
/// Most recent samples, oldest first
pub async fn get_samples(
    State(state): State<ApiState>,
    Path(id): Path<TargetId>,
    Query(query): Query<SamplesQuery>,
) -> ApiResult<Json<SamplesResponse>> {
    if query.limit == 0 || query.limit > MAX_SAMPLE_LIMIT {
        return Err(ApiError::InvalidRequest(format!(
            "limit must be between 1 and {MAX_SAMPLE_LIMIT}"
        )));
    }

    if state.store.get_target(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("target {id}")));
    }

    let samples = state.store.query_latest(id, query.limit).await?;

    Ok(Json(SamplesResponse {
        target_id: id,
        count: samples.len(),
        samples,
    }))
}

/// POST /api/v1/targets/:id/test
///
/// Queued behind the running cycle; the outcome updates the target's status
pub async fn test_connection(
    State(state): State<ApiState>,
    Path(id): Path<TargetId>,
) -> ApiResult<Json<TargetReport>> {
    let report = state
        .collector
        .test_connection(id)
        .await
        .map_err(|e| ApiError::CollectorUnavailable(format!("{e:#}")))?
        .ok_or_else(|| ApiError::NotFound(format!("target {id}")))?;

    Ok(Json(report))
}
