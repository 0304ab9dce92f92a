use duckdb::types::Value;
use duckdb::{params, Connection, InterruptHandle};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::ColumnInfo;

/// Errors raised by the storage adapter
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to open database {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: duckdb::Error,
    },

    /// The engine rejected a statement
    #[error("{source}")]
    Query {
        sql: String,
        #[source]
        source: duckdb::Error,
    },

    #[error("Statement did not finish within {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("Storage task failed: {0}")]
    Task(String),
}

fn query_err(sql: &str) -> impl FnOnce(duckdb::Error) -> StorageError + '_ {
    move |source| StorageError::Query {
        sql: sql.to_string(),
        source,
    }
}

/// Rows returned by a statement, with column names in select-list order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` in row `row`, if both exist
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }
}

/// Quote an identifier for interpolation into SQL text
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for interpolation into SQL text
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// DuckDB storage holding uploaded tables.
///
/// A single connection is shared by every request. Engine calls are blocking,
/// so they run on the blocking pool while holding the connection lock.
pub struct DuckDbStorage {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
    /// Ticket of the statement currently running under a deadline
    running: Arc<std::sync::Mutex<Option<u64>>>,
    next_ticket: AtomicU64,
}

impl DuckDbStorage {
    /// Open (or create) the database file at `db_path`
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        let path = db_path.as_ref().to_path_buf();
        let display = path.display().to_string();

        let conn = tokio::task::spawn_blocking(move || Connection::open(&path))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
            .map_err(|source| StorageError::Open {
                path: display,
                source,
            })?;

        Ok(Self::from_connection(conn))
    }

    /// In-memory database, used by tests
    pub fn in_memory() -> Result<Self, StorageError> {
        Connection::open_in_memory()
            .map(Self::from_connection)
            .map_err(|source| StorageError::Open {
                path: ":memory:".to_string(),
                source,
            })
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            interrupt: conn.interrupt_handle(),
            conn: Arc::new(Mutex::new(conn)),
            running: Arc::new(std::sync::Mutex::new(None)),
            next_ticket: AtomicU64::new(1),
        }
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.blocking_lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }

    /// Execute one statement and collect its rows.
    ///
    /// A transaction left open by an earlier failed statement would block
    /// this one, so any pending transaction is closed first.
    pub async fn execute(&self, sql: &str) -> Result<ResultSet, StorageError> {
        let sql = sql.to_string();
        self.with_connection(move |conn| {
            close_pending_transaction(conn);
            run_query(conn, &sql)
        })
        .await
    }

    /// Like [`execute`](Self::execute), but gives up after `timeout`.
    ///
    /// A statement still waiting for the connection is skipped; one already
    /// running is interrupted so the connection is freed for later requests.
    pub async fn execute_with_timeout(&self, sql: &str, timeout: Duration) -> Result<ResultSet, StorageError> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        let cancelled = Arc::new(AtomicBool::new(false));

        let task = {
            let sql = sql.to_string();
            let running = Arc::clone(&self.running);
            let cancelled = Arc::clone(&cancelled);
            self.with_connection(move |conn| {
                {
                    let mut current = lock_ignoring_poison(&running);
                    if cancelled.load(Ordering::SeqCst) {
                        return Err(StorageError::Timeout(timeout));
                    }
                    *current = Some(ticket);
                }
                close_pending_transaction(conn);
                let result = run_query(conn, &sql);
                *lock_ignoring_poison(&running) = None;
                result
            })
        };

        match tokio::time::timeout(timeout, task).await {
            Ok(result) => result,
            Err(_) => {
                let current = lock_ignoring_poison(&self.running);
                cancelled.store(true, Ordering::SeqCst);
                if *current == Some(ticket) {
                    tracing::warn!("Interrupting statement after {:?}: {}", timeout, sql);
                    self.interrupt.interrupt();
                }
                Err(StorageError::Timeout(timeout))
            }
        }
    }

    /// Execute statements that return no rows
    pub async fn execute_batch(&self, sql: &str) -> Result<(), StorageError> {
        let sql = sql.to_string();
        self.with_connection(move |conn| {
            close_pending_transaction(conn);
            conn.execute_batch(&sql).map_err(query_err(&sql))
        })
        .await
    }

    /// Run `statements` in one transaction; nothing is kept if any of them fails
    pub async fn execute_in_transaction(&self, statements: Vec<String>) -> Result<(), StorageError> {
        self.with_connection(move |conn| {
            close_pending_transaction(conn);
            let tx = conn.transaction().map_err(query_err("BEGIN TRANSACTION"))?;
            for sql in &statements {
                tx.execute_batch(sql).map_err(query_err(sql))?;
            }
            tx.commit().map_err(query_err("COMMIT"))
        })
        .await
    }

    /// Catalog name of `name` in schema `main`, matched case-insensitively
    pub async fn resolve_table(&self, name: &str) -> Result<Option<String>, StorageError> {
        let name = name.to_string();
        self.with_connection(move |conn| {
            let sql = "SELECT table_name FROM information_schema.tables \
                       WHERE table_schema = 'main' AND table_type = 'BASE TABLE' \
                       AND lower(table_name) = lower(?) LIMIT 1";
            let mut stmt = conn.prepare(sql).map_err(query_err(sql))?;
            let mut rows = stmt
                .query_map(params![name], |row| row.get::<_, String>(0))
                .map_err(query_err(sql))?;
            let found = rows.next().transpose().map_err(query_err(sql))?;
            Ok(found)
        })
        .await
    }

    pub async fn table_exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.resolve_table(name).await?.is_some())
    }

    /// All base tables in schema `main`, ordered by name
    pub async fn list_tables(&self) -> Result<Vec<String>, StorageError> {
        self.with_connection(|conn| {
            let sql = "SELECT table_name FROM information_schema.tables \
                       WHERE table_schema = 'main' AND table_type = 'BASE TABLE' \
                       ORDER BY table_name";
            let mut stmt = conn.prepare(sql).map_err(query_err(sql))?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(query_err(sql))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(query_err(sql))?;
            Ok(names)
        })
        .await
    }

    /// Columns of `table` in ordinal order
    pub async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>, StorageError> {
        let table = table.to_string();
        self.with_connection(move |conn| {
            let sql = "SELECT column_name, data_type FROM information_schema.columns \
                       WHERE table_schema = 'main' AND lower(table_name) = lower(?) \
                       ORDER BY ordinal_position";
            let mut stmt = conn.prepare(sql).map_err(query_err(sql))?;
            let columns = stmt
                .query_map(params![table], |row| {
                    Ok(ColumnInfo {
                        name: row.get(0)?,
                        data_type: row.get(1)?,
                    })
                })
                .map_err(query_err(sql))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(query_err(sql))?;
            Ok(columns)
        })
        .await
    }

    pub async fn row_count(&self, table: &str) -> Result<u64, StorageError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
        self.with_connection(move |conn| {
            let count: i64 = conn
                .query_row(&sql, [], |row| row.get(0))
                .map_err(query_err(&sql))?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    pub async fn drop_table(&self, table: &str) -> Result<(), StorageError> {
        self.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_identifier(table)))
            .await
    }
}

fn lock_ignoring_poison<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn close_pending_transaction(conn: &Connection) {
    if let Err(e) = conn.execute_batch("COMMIT") {
        tracing::trace!("No pending transaction to commit: {}", e);
        // An aborted transaction refuses COMMIT and has to be rolled back instead
        let _ = conn.execute_batch("ROLLBACK");
    }
}

fn run_query(conn: &Connection, sql: &str) -> Result<ResultSet, StorageError> {
    let mut stmt = conn.prepare(sql).map_err(query_err(sql))?;
    let mut rows = stmt.query([]).map_err(query_err(sql))?;
    let columns = rows
        .as_ref()
        .map(|stmt| stmt.column_names())
        .unwrap_or_default();

    let mut result = Vec::new();
    while let Some(row) = rows.next().map_err(query_err(sql))? {
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            values.push(row.get::<_, Value>(idx).map_err(query_err(sql))?);
        }
        result.push(values);
    }

    Ok(ResultSet {
        columns,
        rows: result,
    })
}
