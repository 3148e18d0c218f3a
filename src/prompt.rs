//! Prompt Composer
//!
//! Builds the SQL-generation prompt from the schema subset, the declared
//! intent, and freshly sampled few-shot exemplars.

use crate::few_shot::{FewShotExample, FewShotLibrary};
use crate::storage::SchemaSubset;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};

const SYSTEM_PROMPT: &str = "You are a SQL expert. Generate SQL queries based on the given schema, \
intent, and natural language query. All date-valued columns store dates as text in YYYY-MM-DD \
format, so date predicates must use date functions compatible with that format.";

const EMPTY_SCHEMA: &str = "(no relevant tables found)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub system: String,
    pub user: String,
}

pub struct PromptComposer {
    library: Arc<FewShotLibrary>,
    rng: Mutex<StdRng>,
}

impl PromptComposer {
    /// Composer over `library`, sampling with an entropy-seeded generator.
    pub fn new(library: Arc<FewShotLibrary>) -> Self {
        Self {
            library,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Composer whose exemplar draws are reproducible.
    pub fn with_seed(library: Arc<FewShotLibrary>, seed: u64) -> Self {
        Self {
            library,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn compose(&self, question: &str, intent: &str, schema: &SchemaSubset) -> ComposedPrompt {
        let examples = self.sample_examples();
        ComposedPrompt {
            system: SYSTEM_PROMPT.to_string(),
            user: user_prompt(question, intent, schema, &examples),
        }
    }

    fn sample_examples(&self) -> Vec<FewShotExample> {
        // generator state stays valid even if a holder panicked
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.library.sample(&mut *rng).into_iter().cloned().collect()
    }
}

/// One paragraph per table: `Table: <name>` then `Columns: <col> (<type>), ...`.
pub fn render_schema(schema: &SchemaSubset) -> String {
    if schema.is_empty() {
        return EMPTY_SCHEMA.to_string();
    }
    schema
        .tables()
        .iter()
        .map(|(table, columns)| {
            format!(
                "Table: {}\nColumns: {}",
                table,
                columns.iter().map(|c| format!("{} ({})", c.name, c.data_type)).join(", ")
            )
        })
        .join("\n\n")
}

fn render_examples(examples: &[FewShotExample]) -> String {
    examples
        .iter()
        .map(|e| format!("Question: {}\nSQL: {}", e.natural_language, e.sql))
        .join("\n\n")
}

fn user_prompt(question: &str, intent: &str, schema: &SchemaSubset, examples: &[FewShotExample]) -> String {
    let examples_block = if examples.is_empty() {
        String::new()
    } else {
        format!(
            "Here are some example questions and their SQL queries:\n\n{}\n\n",
            render_examples(examples)
        )
    };

    format!(
        r#"Given the following database schema:

{}

{}And the query intent: {}

Generate a SQL query for the following question:
"{}"

Please provide only the SQL query without any additional explanation. Do not enclose the generated SQL in any special quotes, code fences, or anything else. I want only the executable SQL and nothing else."#,
        render_schema(schema),
        examples_block,
        intent,
        question
    )
}
