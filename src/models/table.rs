use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

/// A table materialized from an uploaded CSV
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestedTable {
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
    pub row_count: u64,
    pub duplication_rounds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub row_count: u64,
}

/// Body of `POST /drop`; no table name means every table
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropRequest {
    #[serde(default)]
    pub table_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropFailure {
    pub table: String,
    pub error: String,
}

/// Outcome of dropping every table, one entry per table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropSummary {
    pub message: String,
    pub dropped: Vec<String>,
    pub failed: Vec<DropFailure>,
}

impl DropSummary {
    pub fn from_outcomes(dropped: Vec<String>, failed: Vec<DropFailure>) -> Self {
        let total = dropped.len() + failed.len();
        let message = if total == 0 {
            "No tables exist to be dropped.".to_string()
        } else if failed.is_empty() {
            "All tables dropped successfully.".to_string()
        } else {
            format!("Dropped {} of {} tables.", dropped.len(), total)
        };
        Self {
            message,
            dropped,
            failed,
        }
    }
}
