use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers::{health, query, table};
use crate::api::AppState;
use crate::config::ServerConfig;

/// Create router with application state
pub fn create_router_with_state(state: AppState) -> Router {
    let body_limit = state.config.server.max_upload_mb * 1024 * 1024;
    let cors = cors_layer(&state.config.server);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/llm", get(health::llm_health))
        .route("/upload", post(table::upload_csv))
        .route("/query", post(query::query_data))
        .route("/drop", post(table::drop_tables))
        .route("/tables", get(table::list_tables))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    if server.cors_origin.trim() == "*" {
        return CorsLayer::permissive();
    }

    match server.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([
                Method::GET,
                Method::HEAD,
                Method::PUT,
                Method::PATCH,
                Method::POST,
                Method::DELETE,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true),
        Err(e) => {
            tracing::warn!("Ignoring invalid CORS origin '{}': {}", server.cors_origin, e);
            CorsLayer::new()
        }
    }
}
