use axum::{extract::State, Json};

use crate::api::middleware::AppError;
use crate::api::AppState;
use crate::models::{NaturalLanguageQueryRequest, QueryResponse};
use crate::services::QueryService;

/// Answer a natural language question about an uploaded table
pub async fn query_data(
    State(state): State<AppState>,
    Json(payload): Json<NaturalLanguageQueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    let question = payload.natural_language_query.trim();
    if question.is_empty() {
        return Err(AppError::Validation(
            "Natural language query cannot be empty".to_string(),
        ));
    }

    let table = state.registry.resolve(payload.table_name.as_deref()).await?;
    tracing::info!(table = %table, "Executing natural language query: {}", question);

    let query_service = QueryService::new(state.storage.clone(), &state.config.query);
    let response = query_service.ask(&state.llm, &table, question).await?;

    Ok(Json(response))
}
