use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::middleware::AppError;
use crate::config::QueryConfig;
use crate::models::{QueryOutcome, QueryResponse};
use crate::services::LlmService;
use crate::storage::{value, DuckDbStorage, StorageError};
use crate::validation::SqlValidator;

pub struct QueryService {
    storage: Arc<DuckDbStorage>,
    timeout: Duration,
    default_limit: Option<u64>,
    read_only: bool,
}

impl QueryService {
    pub fn new(storage: Arc<DuckDbStorage>, config: &QueryConfig) -> Self {
        Self {
            storage,
            timeout: config.timeout(),
            default_limit: config.limit(),
            read_only: config.read_only,
        }
    }

    /// Execute generated SQL against `table`.
    ///
    /// In read-only mode the statement must be a single SELECT over `table`
    /// and gets the default LIMIT when it has none. Otherwise it runs as given.
    pub async fn run_query(&self, sql: &str, table: &str) -> Result<QueryOutcome, AppError> {
        let (sql, limit_applied) = if self.read_only {
            SqlValidator::validate_and_prepare(sql, Some(table), self.default_limit).map_err(|e| {
                tracing::warn!(table, "Rejected generated SQL: {} ({})", sql, e);
                e
            })?
        } else {
            (sql.to_string(), false)
        };

        let start_time = Instant::now();
        let result = self
            .storage
            .execute_with_timeout(&sql, self.timeout)
            .await
            .map_err(execution_error)?;
        let execution_time_ms = start_time.elapsed().as_millis() as u64;

        let rows = value::rows_to_json(&result);
        Ok(QueryOutcome {
            sql,
            row_count: rows.len(),
            rows,
            limit_applied,
            execution_time_ms,
        })
    }

    /// Answer `question` about `table`: translate it to SQL, then run it
    pub async fn ask(
        &self,
        llm: &LlmService,
        table: &str,
        question: &str,
    ) -> Result<QueryResponse, AppError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::Validation(
                "Natural language query cannot be empty".to_string(),
            ));
        }

        let table = self
            .storage
            .resolve_table(table)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Table \"{}\" does not exist.", table)))?;
        let columns = self.storage.describe_table(&table).await?;

        let sql = llm.translate(&table, &columns, question).await?;
        let outcome = self.run_query(&sql, &table).await?;

        tracing::info!(
            table = %table,
            rows = outcome.row_count,
            elapsed_ms = outcome.execution_time_ms,
            "Query answered"
        );

        Ok(QueryResponse::new(table, outcome))
    }
}

/// Engine failures keep the engine's message and the statement that caused it
fn execution_error(err: StorageError) -> AppError {
    match err {
        StorageError::Query { sql, source } => {
            AppError::Execution(format!("{} (SQL: {})", source, sql))
        }
        StorageError::Timeout(timeout) => AppError::Timeout(format!(
            "Query did not finish within {} seconds.",
            timeout.as_secs()
        )),
        other => other.into(),
    }
}
