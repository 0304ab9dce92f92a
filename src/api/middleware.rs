use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::StorageError;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Invalid SQL: {0}")]
    InvalidSql(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Ingestion(_) => "INGESTION_ERROR",
            AppError::Translation(_) => "TRANSLATION_ERROR",
            AppError::Execution(_) => "EXECUTION_ERROR",
            AppError::InvalidSql(_) => "INVALID_SQL",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Precondition(_) => "PRECONDITION_FAILED",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Ingestion(_)
            | AppError::Execution(_)
            | AppError::InvalidSql(_)
            | AppError::Precondition(_)
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Translation(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        if status.is_server_error() {
            tracing::error!(code, "Request failed: {}", self);
        } else {
            tracing::warn!(code, "Request rejected: {}", self);
        }

        let error_detail = match self {
            AppError::Ingestion(msg) => ErrorDetail::new(code, "The uploaded file could not be loaded as a table.")
                .with_details(msg),
            AppError::Translation(msg) => {
                let enhanced_msg = if msg.contains("not configured") {
                    format!("{} Set OPENAI_API_KEY (or LLM_API_KEY) to enable natural language queries.", msg)
                } else {
                    msg
                };
                ErrorDetail::new(code, "Failed to generate SQL query.").with_details(enhanced_msg)
            }
            AppError::Execution(msg) => {
                ErrorDetail::new(code, "The generated SQL query could not be executed.").with_details(msg)
            }
            AppError::InvalidSql(msg) => ErrorDetail::new(
                code,
                format!("{} Only read-only SELECT queries against the uploaded table are allowed.", msg),
            ),
            AppError::NotFound(msg)
            | AppError::Precondition(msg)
            | AppError::Timeout(msg)
            | AppError::Validation(msg) => ErrorDetail::new(code, msg),
            // Internal details stay in the log
            AppError::Internal(_) => ErrorDetail::new(code, "An internal error occurred."),
        };

        let body = Json(ErrorResponse {
            error: error_detail,
        });

        (status, body).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Storage failures surface as execution errors unless a caller maps them first
impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Query { .. } => AppError::Execution(err.to_string()),
            StorageError::Timeout(_) => AppError::Timeout(err.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_format() {
        let error = AppError::NotFound("Table \"t\" does not exist.".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_error_detail_creation() {
        let detail = ErrorDetail::new("TEST_CODE", "Test message");
        assert_eq!(detail.code, "TEST_CODE");
        assert_eq!(detail.message, "Test message");
        assert!(detail.details.is_none());
    }

    #[test]
    fn test_taxonomy_status_mapping() {
        let cases = [
            (AppError::Ingestion("x".into()), StatusCode::BAD_REQUEST, "INGESTION_ERROR"),
            (AppError::Translation("x".into()), StatusCode::BAD_GATEWAY, "TRANSLATION_ERROR"),
            (AppError::Execution("x".into()), StatusCode::BAD_REQUEST, "EXECUTION_ERROR"),
            (AppError::Precondition("x".into()), StatusCode::BAD_REQUEST, "PRECONDITION_FAILED"),
            (AppError::Timeout("x".into()), StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        ];
        for (error, status, code) in cases {
            assert_eq!(error.status(), status);
            assert_eq!(error.code(), code);
        }
    }

    #[test]
    fn test_storage_error_maps_to_execution() {
        let source = duckdb::Connection::open_in_memory()
            .unwrap()
            .execute_batch("SELEC 1")
            .unwrap_err();
        let err = StorageError::Query {
            sql: "SELEC 1".to_string(),
            source,
        };
        assert!(matches!(AppError::from(err), AppError::Execution(_)));
    }
}
