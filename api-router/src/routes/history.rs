use axum::{extract::State, response::IntoResponse, Json};

use crate::api_state::ApiState;

/// Terminal track snapshots of past runs, oldest first, bounded.
pub async fn get_history(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.coordinator.tracker().history())
}
