use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::models::{DropFailure, DropSummary, TableInfo};
use crate::services::TableRegistry;
use crate::storage::DuckDbStorage;

/// Listing and dropping uploaded tables
pub struct TableService {
    storage: Arc<DuckDbStorage>,
    registry: Arc<TableRegistry>,
}

impl TableService {
    pub fn new(storage: Arc<DuckDbStorage>, registry: Arc<TableRegistry>) -> Self {
        Self { storage, registry }
    }

    /// Drop `name`, which must exist
    pub async fn drop_one(&self, name: &str) -> Result<String, AppError> {
        let table = self
            .storage
            .resolve_table(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Table \"{}\" does not exist.", name)))?;

        self.storage.drop_table(&table).await?;
        self.registry.clear_if(&table).await;

        tracing::info!(table = %table, "Table dropped");
        Ok(format!("Table \"{}\" dropped successfully.", table))
    }

    /// Drop every table, continuing past individual failures
    pub async fn drop_all(&self) -> Result<DropSummary, AppError> {
        let tables = self.storage.list_tables().await?;

        let mut dropped = Vec::with_capacity(tables.len());
        let mut failed = Vec::new();
        for table in tables {
            match self.storage.drop_table(&table).await {
                Ok(()) => dropped.push(table),
                Err(e) => {
                    tracing::warn!(table = %table, "Failed to drop table: {}", e);
                    failed.push(DropFailure {
                        table,
                        error: e.to_string(),
                    });
                }
            }
        }
        self.registry.clear().await;

        let summary = DropSummary::from_outcomes(dropped, failed);
        tracing::info!("{}", summary.message);
        Ok(summary)
    }

    pub async fn list(&self) -> Result<Vec<TableInfo>, AppError> {
        let mut tables = Vec::new();
        for name in self.storage.list_tables().await? {
            let columns = self.storage.describe_table(&name).await?;
            let row_count = self.storage.row_count(&name).await?;
            tables.push(TableInfo {
                name,
                columns,
                row_count,
            });
        }
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service_with(sql: &str) -> (TableService, Arc<DuckDbStorage>, Arc<TableRegistry>) {
        let storage = Arc::new(DuckDbStorage::in_memory().unwrap());
        if !sql.is_empty() {
            storage.execute_batch(sql).await.unwrap();
        }
        let registry = Arc::new(TableRegistry::new());
        let service = TableService::new(storage.clone(), registry.clone());
        (service, storage, registry)
    }

    #[tokio::test]
    async fn test_drop_one() {
        let (service, storage, registry) =
            service_with("CREATE TABLE uploaded_data_1 (a INTEGER); CREATE TABLE uploaded_data_2 (a INTEGER);").await;
        registry.set("uploaded_data_1").await;

        let message = service.drop_one("uploaded_data_1").await.unwrap();
        assert_eq!(message, "Table \"uploaded_data_1\" dropped successfully.");
        assert_eq!(storage.list_tables().await.unwrap(), vec!["uploaded_data_2"]);
        // The active table no longer points at a dropped table
        assert_eq!(registry.get().await, None);
    }

    #[tokio::test]
    async fn test_drop_missing_table_is_not_found() {
        let (service, _storage, _registry) = service_with("").await;
        let err = service.drop_one("nonexistent").await.unwrap_err();
        match err {
            AppError::NotFound(msg) => assert_eq!(msg, "Table \"nonexistent\" does not exist."),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_drop_all_without_tables() {
        let (service, _storage, _registry) = service_with("").await;
        let summary = service.drop_all().await.unwrap();
        assert_eq!(summary.message, "No tables exist to be dropped.");
        assert!(summary.dropped.is_empty());
        assert!(summary.failed.is_empty());
    }

    #[tokio::test]
    async fn test_drop_all() {
        let (service, storage, registry) =
            service_with("CREATE TABLE a (x INTEGER); CREATE TABLE b (y VARCHAR);").await;
        registry.set("b").await;

        let summary = service.drop_all().await.unwrap();
        assert_eq!(summary.message, "All tables dropped successfully.");
        assert_eq!(summary.dropped, vec!["a", "b"]);
        assert!(storage.list_tables().await.unwrap().is_empty());
        assert_eq!(registry.get().await, None);
    }

    #[tokio::test]
    async fn test_drop_all_continues_past_failures() {
        // A table referenced by a foreign key refuses to be dropped while the referencing table exists
        let (service, storage, registry) = service_with(
            "CREATE TABLE a_parent (id INTEGER PRIMARY KEY); \
             CREATE TABLE b_child (parent_id INTEGER REFERENCES a_parent(id));",
        )
        .await;
        registry.set("a_parent").await;

        let summary = service.drop_all().await.unwrap();
        assert_eq!(summary.message, "Dropped 1 of 2 tables.");
        assert_eq!(summary.dropped, vec!["b_child"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].table, "a_parent");
        assert!(!summary.failed[0].error.is_empty());

        assert_eq!(storage.list_tables().await.unwrap(), vec!["a_parent"]);
        assert_eq!(registry.get().await, None);
    }

    #[tokio::test]
    async fn test_list() {
        let (service, _storage, _registry) =
            service_with("CREATE TABLE t (x INTEGER, y VARCHAR); INSERT INTO t VALUES (1, 'a'), (2, 'b');").await;

        let tables = service.list().await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "t");
        assert_eq!(tables[0].row_count, 2);
        assert_eq!(tables[0].columns[1].data_type, "VARCHAR");
    }
}
