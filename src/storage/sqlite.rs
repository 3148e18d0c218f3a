//! SQLite-backed storage engine
//!
//! A single connection guarded by a mutex. Calls run on the blocking pool so
//! the async runtime is never stalled by disk I/O. A call whose caller stops
//! waiting (a dropped future, e.g. after a timeout) is interrupted, so SQLite
//! aborts and rolls back its statement instead of finishing it unobserved.

use super::{ColumnInfo, DatabaseSchema, QueryOutcome, Row, StorageEngine};
use crate::error::{Nl2SqlError, Result};
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, InterruptHandle};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallState {
    Queued,
    Running,
    Finished,
    Abandoned,
}

fn lock_state(state: &Mutex<CallState>) -> std::sync::MutexGuard<'_, CallState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Held by the awaiting side of a call. Dropping it before the call finishes
/// cancels a queued call or interrupts a running one.
struct CallGuard {
    state: Arc<Mutex<CallState>>,
    interrupt: Arc<InterruptHandle>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        let mut state = lock_state(&self.state);
        match *state {
            CallState::Queued => *state = CallState::Abandoned,
            CallState::Running => {
                // state lock held: the statement cannot finish and hand the
                // connection to another call before the interrupt lands
                warn!("Interrupting abandoned SQLite statement");
                self.interrupt.interrupt();
                *state = CallState::Abandoned;
            }
            CallState::Finished | CallState::Abandoned => {}
        }
    }
}

impl SqliteStorage {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Nl2SqlError::Database(format!("Failed to open database {}: {}", path.display(), e)))?;
        info!("Opened SQLite database at {}", path.display());
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            interrupt: Arc::new(conn.get_interrupt_handle()),
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` against the connection on the blocking thread pool.
    ///
    /// If the returned future is dropped before `f` completes, `f` is either
    /// skipped (still waiting for the connection) or its running statement is
    /// interrupted.
    pub(crate) async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let state = Arc::new(Mutex::new(CallState::Queued));
        let _guard = CallGuard {
            state: Arc::clone(&state),
            interrupt: Arc::clone(&self.interrupt),
        };

        tokio::task::spawn_blocking(move || {
            let mut connection = conn
                .lock()
                .map_err(|_| Nl2SqlError::Database("Connection lock poisoned".to_string()))?;
            {
                let mut current = lock_state(&state);
                if *current == CallState::Abandoned {
                    return Err(Nl2SqlError::Database(
                        "Storage call abandoned before it started".to_string(),
                    ));
                }
                *current = CallState::Running;
            }
            let result = f(&mut connection);
            *lock_state(&state) = CallState::Finished;
            result
        })
        .await
        .map_err(|e| Nl2SqlError::Database(format!("Storage task failed: {}", e)))?
    }
}

#[async_trait]
impl StorageEngine for SqliteStorage {
    async fn get_schema(&self) -> Result<DatabaseSchema> {
        self.with_connection(|conn| read_schema(conn)).await
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryOutcome> {
        let sql = sql.to_string();
        self.with_connection(move |conn| run_statement(conn, &sql)).await
    }
}

fn read_schema(conn: &Connection) -> Result<DatabaseSchema> {
    let mut tables_stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let table_names = tables_stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut columns_stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
    let mut schema = DatabaseSchema::new();
    for table in table_names {
        let columns = columns_stmt
            .query_map([&table], |row| {
                Ok(ColumnInfo::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        schema.insert(table, columns);
    }
    Ok(schema)
}

fn run_statement(conn: &Connection, sql: &str) -> Result<QueryOutcome> {
    debug!("Executing SQL: {}", sql);
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    if columns.is_empty() {
        let affected = stmt.execute([])?;
        return Ok(QueryOutcome::Affected(affected));
    }

    let mut rows = stmt.query([])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (idx, name) in columns.iter().enumerate() {
            record.insert(name.clone(), value_to_json(row.get_ref(idx)?));
        }
        records.push(record);
    }

    Ok(QueryOutcome::Rows {
        columns,
        rows: records,
    })
}

fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(bytes) => serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => serde_json::Value::from(bytes.to_vec()),
    }
}
