use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Nl2SqlError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{operation} timed out after {limit:?}")]
    Timeout { operation: String, limit: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<rusqlite::Error> for Nl2SqlError {
    fn from(err: rusqlite::Error) -> Self {
        Nl2SqlError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Nl2SqlError>;

/// Awaits `fut`, failing with [`Nl2SqlError::Timeout`] once `limit` elapses.
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Nl2SqlError::Timeout {
            operation: operation.to_string(),
            limit,
        }),
    }
}
