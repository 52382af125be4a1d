use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use common::utils::config::MigrationJob;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct RegisterConfig {
    pub name: String,
    pub job: MigrationJob,
}

/// Registers (or replaces) a named job for later `POST /runs` calls.
pub async fn register_config(
    State(state): State<ApiState>,
    Json(request): Json<RegisterConfig>,
) -> Result<impl IntoResponse, ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::ValidationError("job name must not be empty".into()));
    }

    state.register_job(request.name.clone(), request.job).await;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "registered", "name": request.name })),
    ))
}
