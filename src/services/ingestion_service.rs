use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::models::IngestedTable;
use crate::services::TableRegistry;
use crate::storage::{quote_identifier, quote_literal, DuckDbStorage};

static LAST_TABLE_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Fresh `uploaded_data_<unix millis>` name, strictly increasing within the process
pub fn next_table_name() -> String {
    let now = Utc::now().timestamp_millis();
    let stamp = match LAST_TABLE_MILLIS.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
        Some(now.max(last + 1))
    }) {
        Ok(last) | Err(last) => now.max(last + 1),
    };
    format!("uploaded_data_{}", stamp)
}

/// Loads CSV files into new tables
pub struct IngestionService {
    storage: Arc<DuckDbStorage>,
    registry: Arc<TableRegistry>,
    duplication_rounds: u32,
}

impl IngestionService {
    pub fn new(storage: Arc<DuckDbStorage>, registry: Arc<TableRegistry>, duplication_rounds: u32) -> Self {
        Self {
            storage,
            registry,
            duplication_rounds,
        }
    }

    /// Create a table from the CSV at `path` and make it the active table.
    ///
    /// Header, column names and types are whatever the engine detects. Each
    /// duplication round appends the table to itself, so `k` rounds leave
    /// `N * 2^k` rows. The load and every round share one transaction.
    pub async fn ingest(&self, path: &Path) -> Result<IngestedTable, AppError> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            AppError::Ingestion(format!("Cannot read {}: {}", path.display(), e))
        })?;
        if !metadata.is_file() {
            return Err(AppError::Ingestion(format!(
                "{} is not a regular file.",
                path.display()
            )));
        }
        if metadata.len() == 0 {
            return Err(AppError::Ingestion("The uploaded file is empty.".to_string()));
        }

        let table_name = next_table_name();
        let table = quote_identifier(&table_name);

        let mut statements = Vec::with_capacity(1 + self.duplication_rounds as usize);
        statements.push(format!(
            "CREATE TABLE {} AS SELECT * FROM read_csv_auto({})",
            table,
            quote_literal(&path.to_string_lossy())
        ));
        for _ in 0..self.duplication_rounds {
            statements.push(format!("INSERT INTO {table} SELECT * FROM {table}"));
        }

        tracing::debug!("Loading {} into {}", path.display(), table_name);
        self.storage
            .execute_in_transaction(statements)
            .await
            .map_err(|e| AppError::Ingestion(format!("Failed to load {}: {}", path.display(), e)))?;

        let columns = self.storage.describe_table(&table_name).await?;
        let row_count = self.storage.row_count(&table_name).await?;
        self.registry.set(&table_name).await;

        tracing::info!(
            table = %table_name,
            rows = row_count,
            columns = columns.len(),
            "CSV ingested"
        );

        Ok(IngestedTable {
            table_name,
            columns,
            row_count,
            duplication_rounds: self.duplication_rounds,
        })
    }
}
