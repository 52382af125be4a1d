use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};

use api_state::ApiState;
use routes::{
    configs::register_config, health::health, history::get_history, liveness::live,
    readiness::ready, runs::start_run, status::get_status,
};

pub mod api_state;
pub mod error;
mod routes;

/// Probe endpoints, mounted at the server root (for k8s/systemd probes).
pub fn probe_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live))
}

/// Router for API functionality, version 1
pub fn api_routes_v1<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    Router::new()
        .route("/runs", post(start_run))
        .route("/status", get(get_status))
        .route("/history", get(get_history))
        .route("/configs", post(register_config))
        .route("/health", get(health))
}
