use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /query`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NaturalLanguageQueryRequest {
    #[serde(default)]
    pub natural_language_query: String,
    /// Table to query; the most recently uploaded table when omitted
    #[serde(default)]
    pub table_name: Option<String>,
}

/// Result of executing one SQL statement
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// SQL actually sent to the engine, including any appended LIMIT
    pub sql: String,
    pub rows: Vec<serde_json::Value>,
    pub row_count: usize,
    pub limit_applied: bool,
    pub execution_time_ms: u64,
}

/// Answer to a natural language question
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub id: String,
    pub table_name: String,
    /// Generated SQL
    pub query: String,
    pub result: Vec<serde_json::Value>,
    /// Number of rows in `result`
    pub length: usize,
    pub limit_applied: bool,
    pub execution_time_ms: u64,
    pub executed_at: DateTime<Utc>,
}

impl QueryResponse {
    pub fn new(table_name: String, outcome: QueryOutcome) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            table_name,
            query: outcome.sql,
            length: outcome.row_count,
            result: outcome.rows,
            limit_applied: outcome.limit_applied,
            execution_time_ms: outcome.execution_time_ms,
            executed_at: Utc::now(),
        }
    }
}
