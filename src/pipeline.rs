//! Pipeline Orchestrator
//!
//! Sequences classification, retrieval, prompt composition, synthesis,
//! validation and execution over one [`QueryResult`] per request. Every stage
//! failure is recorded on the result; callers always get a complete record.

use crate::config::Config;
use crate::error::{with_timeout, Nl2SqlError};
use crate::few_shot::FewShotLibrary;
use crate::intent::IntentClassifier;
use crate::llm::CompletionService;
use crate::observability::{QueryLogEntry, QueryLogger};
use crate::prompt::PromptComposer;
use crate::retrieval::SchemaRetriever;
use crate::storage::{QueryOutcome, Row, SchemaSubset, StorageEngine};
use crate::synthesizer::SqlSynthesizer;
use crate::validator::SqlValidator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub const VALIDATION_FAILED_MESSAGE: &str = "SQL validation failed. Query not executed.";
pub const NO_RESULTS_MESSAGE: &str = "The query returned no results.";

/// What execution produced: rows, or a descriptive message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryOutput {
    Rows(Vec<Row>),
    Message(String),
}

/// Accumulated state of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub relevant_tables: Vec<String>,
    pub query_intent: String,
    pub generated_sql: String,
    pub sql_validated: bool,
    pub query_result: Option<QueryOutput>,
    pub error: Option<String>,
}

impl QueryResult {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            relevant_tables: Vec::new(),
            query_intent: String::new(),
            generated_sql: String::new(),
            sql_validated: false,
            query_result: None,
            error: None,
        }
    }

    /// Rows returned by execution; `None` when nothing ran.
    pub fn row_count(&self) -> Option<usize> {
        match &self.query_result {
            Some(QueryOutput::Rows(rows)) => Some(rows.len()),
            Some(QueryOutput::Message(_)) => Some(0),
            None => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error("Intent classification failed: {0}")]
    Classification(#[source] Nl2SqlError),

    #[error("Table retrieval failed: {0}")]
    Retrieval(#[source] Nl2SqlError),

    #[error("Schema lookup failed: {0}")]
    Schema(#[source] Nl2SqlError),

    #[error("SQL generation failed: {0}")]
    Synthesis(#[source] Nl2SqlError),

    #[error("SQL validation failed. Query not executed.")]
    Validation,

    #[error("Query execution failed: {0}")]
    Execution(#[source] Nl2SqlError),
}

/// Upper bounds on each kind of external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub llm: Duration,
    pub retrieval: Duration,
    pub storage: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for Timeouts {
    fn from(config: &Config) -> Self {
        // retrieval is dominated by the embeddings call
        Self {
            llm: config.llm_timeout,
            retrieval: config.llm_timeout,
            storage: config.storage_timeout,
        }
    }
}

pub struct Pipeline {
    classifier: IntentClassifier,
    retriever: Arc<dyn SchemaRetriever>,
    storage: Arc<dyn StorageEngine>,
    composer: PromptComposer,
    synthesizer: SqlSynthesizer,
    validator: SqlValidator,
    timeouts: Timeouts,
    logger: Option<QueryLogger>,
}

impl Pipeline {
    pub fn new(
        llm: Arc<dyn CompletionService>,
        retriever: Arc<dyn SchemaRetriever>,
        storage: Arc<dyn StorageEngine>,
    ) -> Self {
        let timeouts = Timeouts::default();
        Self {
            classifier: IntentClassifier::new(llm.clone()),
            retriever,
            validator: SqlValidator::new(storage.clone(), timeouts.storage),
            storage,
            composer: PromptComposer::new(FewShotLibrary::builtin()),
            synthesizer: SqlSynthesizer::new(llm),
            timeouts,
            logger: None,
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.validator = SqlValidator::new(self.storage.clone(), timeouts.storage);
        self.timeouts = timeouts;
        self
    }

    pub fn with_composer(mut self, composer: PromptComposer) -> Self {
        self.composer = composer;
        self
    }

    pub fn with_logger(mut self, logger: QueryLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Run every step up to and including validation. Nothing is executed.
    pub async fn generate_sql(&self, question: &str) -> QueryResult {
        self.run(question, false).await
    }

    /// Run every step, executing the statement only if it validated.
    pub async fn execute_query(&self, question: &str) -> QueryResult {
        self.run(question, true).await
    }

    async fn run(&self, question: &str, execute: bool) -> QueryResult {
        let request_id = Uuid::new_v4();
        let span = info_span!("pipeline", %request_id);
        self.run_recorded(question, execute, request_id).instrument(span).await
    }

    async fn run_recorded(&self, question: &str, execute: bool, request_id: Uuid) -> QueryResult {
        let started = Instant::now();
        info!("Processing query: {}", question);

        let mut result = QueryResult::new(question);
        if let Err(e) = self.run_stages(&mut result, execute).await {
            warn!("{}", e);
            result.error = Some(e.to_string());
        }

        let elapsed = started.elapsed();
        info!(
            sql_validated = result.sql_validated,
            elapsed_ms = elapsed.as_millis() as u64,
            "Query finished"
        );

        if let Some(logger) = &self.logger {
            let entry = QueryLogEntry::from_result(request_id, &result, elapsed);
            if let Err(e) = logger.log(&entry) {
                warn!("Failed to write query log {}: {}", logger.path().display(), e);
            }
        }
        result
    }

    async fn run_stages(&self, result: &mut QueryResult, execute: bool) -> Result<(), StageError> {
        let question = result.query.clone();

        result.query_intent = with_timeout(
            "Intent classification",
            self.timeouts.llm,
            self.classifier.classify(&question),
        )
        .await
        .map_err(StageError::Classification)?;
        info!("Query intent: {}", result.query_intent);

        let ranked = with_timeout("Table retrieval", self.timeouts.retrieval, self.retriever.search(&question))
            .await
            .map_err(StageError::Retrieval)?;
        result.relevant_tables = ranked.into_iter().map(|(table, _)| table).collect();
        info!("Relevant tables: {:?}", result.relevant_tables);

        let schema = with_timeout("Schema lookup", self.timeouts.storage, self.storage.get_schema())
            .await
            .map_err(StageError::Schema)?;
        let subset = SchemaSubset::select(&schema, &result.relevant_tables);

        let prompt = self.composer.compose(&question, &result.query_intent, &subset);
        result.generated_sql = with_timeout("SQL generation", self.timeouts.llm, self.synthesizer.synthesize(&prompt))
            .await
            .map_err(StageError::Synthesis)?;
        info!("Generated SQL: {}", result.generated_sql);

        if !self.validator.validate(&result.generated_sql).await {
            return Err(StageError::Validation);
        }
        result.sql_validated = true;

        if !execute {
            return Ok(());
        }

        let outcome = with_timeout(
            "Query execution",
            self.timeouts.storage,
            self.storage.execute_query(&result.generated_sql),
        )
        .await
        .map_err(StageError::Execution)?;
        info!("Query returned {} row(s)", outcome.row_count());
        result.query_result = Some(format_outcome(outcome));
        Ok(())
    }
}

pub fn format_outcome(outcome: QueryOutcome) -> QueryOutput {
    match outcome {
        QueryOutcome::Rows { rows, .. } if rows.is_empty() => QueryOutput::Message(NO_RESULTS_MESSAGE.to_string()),
        QueryOutcome::Rows { rows, .. } => QueryOutput::Rows(rows),
        QueryOutcome::Affected(count) => {
            QueryOutput::Message(format!("Statement executed successfully. Rows affected: {}", count))
        }
    }
}
