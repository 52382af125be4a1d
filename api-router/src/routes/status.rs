use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use migration_pipeline::progress::Track;

use crate::api_state::ApiState;

/// Current per-track progress of the active (or most recent) run.
pub async fn get_status(State(state): State<ApiState>) -> impl IntoResponse {
    let tracker = state.coordinator.tracker();
    Json(json!({
        "main": tracker.status(Track::Main),
        "vector": tracker.status(Track::Vector),
    }))
}
