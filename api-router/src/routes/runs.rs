use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use common::utils::config::MigrationJob;

use crate::{api_state::ApiState, error::ApiError};

/// Body of the run-start endpoint: a registered job by name, a full inline
/// job, or nothing at all (the configured default job).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RunRequest {
    Named { name: String },
    Inline(MigrationJob),
}

pub async fn start_run(
    State(state): State<ApiState>,
    body: Option<Json<RunRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let job = match body.map(|Json(request)| request) {
        None => state.config.job.clone(),
        Some(RunRequest::Named { name }) => state
            .resolve_job(&name)
            .await
            .ok_or_else(|| ApiError::NotFound(format!("no job named '{name}'")))?,
        Some(RunRequest::Inline(job)) => job,
    };

    let run_id = state.coordinator.start_run(job).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "run_id": run_id }))))
}
