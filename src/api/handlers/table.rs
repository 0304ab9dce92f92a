use axum::{
    body::Bytes,
    extract::{Multipart, State},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::api::middleware::AppError;
use crate::api::AppState;
use crate::models::{DropRequest, IngestedTable};
use crate::services::{IngestionService, TableService};

/// Upload a CSV file (multipart field `file`) and load it into a new table
pub async fn upload_csv(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestedTable>, AppError> {
    let mut saved: Option<PathBuf> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = sanitize_file_name(field.file_name().unwrap_or("upload.csv"));
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read uploaded file: {}", e)))?;

        let upload_dir = Path::new(&state.config.ingest.upload_dir);
        tokio::fs::create_dir_all(upload_dir).await?;
        let path = upload_dir.join(format!(
            "{}-{}-{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            file_name
        ));
        tokio::fs::write(&path, &data).await?;

        tracing::info!("Received upload {} ({} bytes)", path.display(), data.len());
        saved = Some(path);
        break;
    }

    let path = saved.ok_or_else(|| AppError::Validation("No file uploaded.".to_string()))?;

    let ingestion = IngestionService::new(
        state.storage.clone(),
        state.registry.clone(),
        state.config.ingest.duplication_rounds,
    );
    let table = ingestion.ingest(&path).await?;

    Ok(Json(table))
}

/// Drop the named table, or every table when the body names none
pub async fn drop_tables(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let request: DropRequest = if body.iter().all(u8::is_ascii_whitespace) {
        DropRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("Invalid request body: {}", e)))?
    };

    let service = TableService::new(state.storage.clone(), state.registry.clone());
    match request.table_name.as_deref().map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => {
            let message = service.drop_one(name).await?;
            Ok(Json(json!({ "message": message })).into_response())
        }
        None => {
            let summary = service.drop_all().await?;
            Ok(Json(summary).into_response())
        }
    }
}

/// List tables with their columns and row counts
pub async fn list_tables(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let service = TableService::new(state.storage.clone(), state.registry.clone());
    let tables = service.list().await?;

    Ok(Json(json!({ "tables": tables })))
}

/// Final path component of `name` with anything unusual replaced by `_`
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload.csv".to_string()
    } else {
        cleaned.to_string()
    }
}
