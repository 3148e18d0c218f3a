//! SQL Validator
//!
//! Dry-runs a candidate statement through `EXPLAIN` so syntax and unknown
//! names are caught before anything touches data.

use crate::error::{with_timeout, Nl2SqlError, Result};
use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct SqlValidator {
    storage: Arc<dyn StorageEngine>,
    timeout: Duration,
}

impl SqlValidator {
    pub fn new(storage: Arc<dyn StorageEngine>, timeout: Duration) -> Self {
        Self { storage, timeout }
    }

    /// The non-executing form of `sql`.
    pub fn dry_run_sql(sql: &str) -> String {
        format!("EXPLAIN {}", sql)
    }

    /// Run the dry run, surfacing why it failed.
    pub async fn check(&self, sql: &str) -> Result<()> {
        if sql.trim().is_empty() {
            return Err(Nl2SqlError::Database("Empty SQL statement".to_string()));
        }
        let explain = Self::dry_run_sql(sql);
        with_timeout("SQL dry run", self.timeout, self.storage.execute_query(&explain)).await?;
        Ok(())
    }

    /// `true` when the dry run succeeded. Failures are logged and collapse to `false`.
    pub async fn validate(&self, sql: &str) -> bool {
        match self.check(sql).await {
            Ok(()) => {
                debug!("SQL validated: {}", sql);
                true
            }
            Err(e) => {
                warn!("SQL validation failed: {}", e);
                false
            }
        }
    }
}
