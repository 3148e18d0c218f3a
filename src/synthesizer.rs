//! SQL Synthesizer
//!
//! One completion call per prompt, followed by whitespace normalization.

use crate::error::Result;
use crate::llm::CompletionService;
use crate::prompt::ComposedPrompt;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

/// Collapse line breaks and whitespace runs into single spaces and trim the
/// ends. Nothing else about the text changes.
pub fn normalize_sql(raw: &str) -> String {
    WHITESPACE_RUN.replace_all(raw.trim(), " ").into_owned()
}

pub struct SqlSynthesizer {
    llm: Arc<dyn CompletionService>,
}

impl SqlSynthesizer {
    pub fn new(llm: Arc<dyn CompletionService>) -> Self {
        Self { llm }
    }

    pub async fn synthesize(&self, prompt: &ComposedPrompt) -> Result<String> {
        let raw = self.llm.complete(&prompt.system, &prompt.user).await?;
        let sql = normalize_sql(&raw);
        debug!("Synthesized SQL: {}", sql);
        Ok(sql)
    }
}
