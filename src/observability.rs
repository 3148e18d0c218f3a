//! Query Logger
//!
//! Appends one JSON line per pipeline run to a log file.

use crate::error::Result;
use crate::pipeline::QueryResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
    pub query: String,
    pub query_intent: String,
    pub generated_sql: String,
    pub sql_validated: bool,
    pub rows_returned: Option<usize>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl QueryLogEntry {
    pub fn from_result(request_id: Uuid, result: &QueryResult, elapsed: Duration) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id,
            query: result.query.clone(),
            query_intent: result.query_intent.clone(),
            generated_sql: result.generated_sql.clone(),
            sql_validated: result.sql_validated,
            rows_returned: result.row_count(),
            error: result.error.clone(),
            duration_ms: elapsed.as_millis() as u64,
        }
    }
}

pub struct QueryLogger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl QueryLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log(&self, entry: &QueryLogEntry) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}
