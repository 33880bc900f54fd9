//! Fleet statistics endpoint

use axum::{Json, extract::State};
use chrono::Utc;

use crate::api::{error::ApiResult, state::ApiState};
use crate::storage::FleetStats;

/// GET /api/v1/stats
///
/// Target counts, open alerts and averages over the stats window
pub async fn get_stats(State(state): State<ApiState>) -> ApiResult<Json<FleetStats>> {
    let stats = state.store.fleet_stats(Utc::now() - state.stats_window).await?;
    Ok(Json(stats))
}
