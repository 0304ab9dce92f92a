use tokio::sync::RwLock;

use crate::api::middleware::AppError;

/// Name of the most recently uploaded table.
///
/// Requests normally name their table; this is only the fallback for clients
/// that don't.
#[derive(Debug, Default)]
pub struct TableRegistry {
    active: RwLock<Option<String>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, table: impl Into<String>) {
        *self.active.write().await = Some(table.into());
    }

    pub async fn get(&self) -> Option<String> {
        self.active.read().await.clone()
    }

    /// Forget the active table if it is `table`
    pub async fn clear_if(&self, table: &str) {
        let mut active = self.active.write().await;
        if active
            .as_deref()
            .is_some_and(|current| current.eq_ignore_ascii_case(table))
        {
            *active = None;
        }
    }

    pub async fn clear(&self) {
        *self.active.write().await = None;
    }

    /// Table a request should run against: the one it names, else the active one
    pub async fn resolve(&self, requested: Option<&str>) -> Result<String, AppError> {
        if let Some(name) = requested.map(str::trim).filter(|name| !name.is_empty()) {
            return Ok(name.to_string());
        }

        self.get().await.ok_or_else(|| {
            AppError::Precondition("No table available. Please upload a CSV first.".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_prefers_requested_table() {
        let registry = TableRegistry::new();
        registry.set("uploaded_data_1").await;

        assert_eq!(registry.resolve(Some("other")).await.unwrap(), "other");
        assert_eq!(registry.resolve(None).await.unwrap(), "uploaded_data_1");
        assert_eq!(registry.resolve(Some("  ")).await.unwrap(), "uploaded_data_1");
    }

    #[tokio::test]
    async fn test_resolve_without_table_is_precondition_error() {
        let registry = TableRegistry::new();
        let err = registry.resolve(None).await.unwrap_err();
        assert!(matches!(err, AppError::Precondition(_)));
    }

    #[tokio::test]
    async fn test_clear_if_only_matches_active_table() {
        let registry = TableRegistry::new();
        registry.set("uploaded_data_2").await;

        registry.clear_if("uploaded_data_1").await;
        assert_eq!(registry.get().await.as_deref(), Some("uploaded_data_2"));

        registry.clear_if("UPLOADED_DATA_2").await;
        assert_eq!(registry.get().await, None);

        registry.set("uploaded_data_3").await;
        registry.clear().await;
        assert_eq!(registry.get().await, None);
    }
}
