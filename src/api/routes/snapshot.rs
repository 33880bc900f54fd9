//! Fleet snapshot endpoint

use axum::{Json, extract::State};

use crate::actors::messages::FleetSnapshot;
use crate::api::{error::ApiResult, state::ApiState};

/// GET /api/v1/snapshot
///
/// Same payload viewers receive over the stream, without the `type` tag
pub async fn get_snapshot(State(state): State<ApiState>) -> ApiResult<Json<FleetSnapshot>> {
    let snapshot = FleetSnapshot::capture(state.store.as_ref(), state.stats_window).await?;
    Ok(Json(snapshot))
}
