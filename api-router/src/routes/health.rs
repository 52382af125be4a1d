use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::{api_state::ApiState, error::ApiError};

/// Aggregated reachability of the chunking and embedding services.
pub async fn health(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    state.coordinator.health_check().await?;
    Ok(Json(json!({"status": "ok"})))
}
