use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api_state::ApiState;

/// Readiness probe: returns 200 if the enrichment services answer their
/// health endpoints, else 503.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    match state.coordinator.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "checks": { "enrichment_services": "ok" }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "checks": { "enrichment_services": "fail" },
                "reason": e.to_string()
            })),
        ),
    }
}
