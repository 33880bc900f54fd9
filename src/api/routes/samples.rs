//! Fleet-wide sample history

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;
use tracing::info;

use super::targets::MAX_SAMPLE_LIMIT;
use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{ClearSamplesResponse, SampleHistoryQuery, SampleHistoryResponse},
};

/// One year
const MAX_HISTORY_HOURS: u32 = 24 * 365;

/// GET /api/v1/samples?target_id=&hours=&limit=
///
/// Samples of the last `hours`, newest first, optionally for one target
pub async fn get_history(
    State(state): State<ApiState>,
    Query(query): Query<SampleHistoryQuery>,
) -> ApiResult<Json<SampleHistoryResponse>> {
    if query.hours == 0 || query.hours > MAX_HISTORY_HOURS {
        return Err(ApiError::InvalidRequest(format!(
            "hours must be between 1 and {MAX_HISTORY_HOURS}"
        )));
    }
    if query.limit == 0 || query.limit > MAX_SAMPLE_LIMIT {
        return Err(ApiError::InvalidRequest(format!(
            "limit must be between 1 and {MAX_SAMPLE_LIMIT}"
        )));
    }

    let since = Utc::now() - chrono::Duration::hours(query.hours as i64);
    let samples = state
        .store
        .query_range(query.target_id, since, query.limit)
        .await?;

    Ok(Json(SampleHistoryResponse {
        since,
        count: samples.len(),
        samples,
    }))
}

/// DELETE /api/v1/samples
pub async fn clear_samples(State(state): State<ApiState>) -> ApiResult<Json<ClearSamplesResponse>> {
    let deleted = state.store.clear_samples().await?;
    info!("cleared {deleted} samples through the API");
    Ok(Json(ClearSamplesResponse { deleted }))
}
