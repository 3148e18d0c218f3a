//! Intent Classifier
//!
//! Asks the completion service for a one-word operation label. The label is
//! passed downstream verbatim; nothing here rejects out-of-set answers.

use crate::error::Result;
use crate::llm::CompletionService;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You are a SQL expert. Determine the intent of the given query.";

/// The labels the classifier is asked to choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Select,
    Insert,
    Update,
    Delete,
    Complex,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::Select,
        Intent::Insert,
        Intent::Update,
        Intent::Delete,
        Intent::Complex,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Select => "SELECT",
            Intent::Insert => "INSERT",
            Intent::Update => "UPDATE",
            Intent::Delete => "DELETE",
            Intent::Complex => "COMPLEX",
        }
    }

    /// Interpret a returned label, ignoring case and surrounding whitespace.
    /// `None` for anything outside the closed set.
    pub fn parse(label: &str) -> Option<Intent> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct IntentClassifier {
    llm: Arc<dyn CompletionService>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn CompletionService>) -> Self {
        Self { llm }
    }

    /// Classify `question`, returning the trimmed label exactly as answered.
    pub async fn classify(&self, question: &str) -> Result<String> {
        let prompt = user_prompt(question);
        let label = self.llm.complete(SYSTEM_PROMPT, &prompt).await?;
        let label = label.trim().to_string();
        if Intent::parse(&label).is_none() {
            debug!("Intent label '{}' is outside the known set", label);
        }
        Ok(label)
    }
}

fn user_prompt(question: &str) -> String {
    let labels: Vec<&str> = Intent::ALL.iter().map(Intent::as_str).collect();
    format!(
        r#"Analyze the following query and determine its main intent:
"{}"

Possible intents: {}

Respond with only the intent word."#,
        question,
        labels.join(", ")
    )
}
