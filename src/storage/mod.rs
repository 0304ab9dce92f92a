pub mod duckdb_storage;
pub mod value;

pub use duckdb_storage::{quote_identifier, quote_literal, DuckDbStorage, ResultSet, StorageError};
