//! Runtime configuration
//!
//! Values come from the environment (optionally seeded from a `.env` file by
//! the binary) and can be overridden by command-line flags.

use crate::error::{Nl2SqlError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub embedding_model: String,
    pub database_path: PathBuf,
    pub embeddings_path: PathBuf,
    pub retrieval_top_k: usize,
    pub retrieval_min_score: f32,
    pub llm_timeout: Duration,
    pub storage_timeout: Duration,
    pub query_log_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            database_path: PathBuf::from("database.db"),
            embeddings_path: PathBuf::from("embeddings.json"),
            retrieval_top_k: 5,
            retrieval_min_score: 0.0,
            llm_timeout: Duration::from_secs(60),
            storage_timeout: Duration::from_secs(30),
            query_log_path: None,
        }
    }
}

impl Config {
    /// Build a config from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            api_key: non_empty("OPENAI_API_KEY"),
            model: non_empty("OPENAI_MODEL").unwrap_or(defaults.model),
            base_url: non_empty("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            embedding_model: non_empty("OPENAI_EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            database_path: non_empty("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            embeddings_path: non_empty("EMBEDDINGS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.embeddings_path),
            retrieval_top_k: parse_var("RETRIEVAL_TOP_K", non_empty("RETRIEVAL_TOP_K"))?
                .unwrap_or(defaults.retrieval_top_k),
            retrieval_min_score: parse_var("RETRIEVAL_MIN_SCORE", non_empty("RETRIEVAL_MIN_SCORE"))?
                .unwrap_or(defaults.retrieval_min_score),
            llm_timeout: parse_var::<u64>("LLM_TIMEOUT_SECS", non_empty("LLM_TIMEOUT_SECS"))?
                .map(Duration::from_secs)
                .unwrap_or(defaults.llm_timeout),
            storage_timeout: parse_var::<u64>("STORAGE_TIMEOUT_SECS", non_empty("STORAGE_TIMEOUT_SECS"))?
                .map(Duration::from_secs)
                .unwrap_or(defaults.storage_timeout),
            query_log_path: non_empty("QUERY_LOG_PATH").map(PathBuf::from),
        })
    }

    /// The API key, or a configuration error naming the variable to set.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            Nl2SqlError::Config(
                "OpenAI API key not found. Please set the OPENAI_API_KEY environment variable."
                    .to_string(),
            )
        })
    }
}

fn parse_var<T: FromStr>(key: &str, raw: Option<String>) -> Result<Option<T>> {
    raw.map(|value| {
        value
            .trim()
            .parse::<T>()
            .map_err(|_| Nl2SqlError::Config(format!("Invalid value for {}: '{}'", key, value)))
    })
    .transpose()
}
