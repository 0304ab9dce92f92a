use axum::{extract::State, Json};
use serde_json::json;

use crate::api::middleware::AppError;
use crate::api::AppState;

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Round trip to the language model
pub async fn llm_health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let reply = state.llm.ping().await?;

    Ok(Json(json!({
        "ok": true,
        "model": state.llm.model(),
        "reply": reply,
    })))
}
