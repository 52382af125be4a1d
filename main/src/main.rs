use std::sync::Arc;

use axum::Router;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

use api_router::{api_routes_v1, api_state::ApiState, probe_routes};
use common::{
    storage::{destination::SolrDestinationClient, source::SolrSourceClient},
    utils::{chunking::ChunkingClient, config::get_config, embedding::EmbeddingClient},
};
use migration_pipeline::{
    coordinator::{CoordinatorSettings, MigrationCoordinator},
    services::DefaultEnrichmentServices,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;

    let source = Arc::new(SolrSourceClient::new(Url::parse(&config.source_address)?));
    let destination = Arc::new(SolrDestinationClient::new(Url::parse(
        &config.destination_address,
    )?));
    let services = Arc::new(DefaultEnrichmentServices::new(
        ChunkingClient::new(Url::parse(&config.chunker_address)?),
        EmbeddingClient::new(Url::parse(&config.embedder_address)?),
    ));

    let coordinator = Arc::new(MigrationCoordinator::new(
        source,
        destination,
        services,
        CoordinatorSettings::from(&config),
    ));

    let api_state = ApiState::new(coordinator, config.clone());

    // Create Axum router
    let app = Router::new()
        .nest("/api/v1", api_routes_v1())
        .merge(probe_routes())
        .with_state(api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }

    Ok(())
}
