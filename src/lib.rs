pub mod config;
pub mod error;
pub mod few_shot;
pub mod intent;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod prompt;
pub mod retrieval;
pub mod storage;
pub mod synthesizer;
pub mod validator;

pub use config::Config;
pub use error::{Nl2SqlError, Result};
pub use pipeline::{Pipeline, QueryOutput, QueryResult, StageError, Timeouts};
