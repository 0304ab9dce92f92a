use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use csv_query_backend::api::{self, AppState};
use csv_query_backend::config::Config;
use csv_query_backend::storage::DuckDbStorage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Starting server on {}", config.server_address());

    if config.llm.api_key.is_none() {
        tracing::warn!("No LLM API key configured; natural language queries will fail until OPENAI_API_KEY is set");
    }

    // Initialize DuckDB storage
    let storage = Arc::new(DuckDbStorage::new(&config.database.path).await.map_err(|e| {
        error!("Failed to initialize database: {}", e);
        e
    })?);

    // Create router with state
    let state = AppState::new(storage, config.clone());
    let app: Router = api::routes::create_router_with_state(state);

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
