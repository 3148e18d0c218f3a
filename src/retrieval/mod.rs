//! Schema retrieval
//!
//! Ranks tables by semantic similarity to a question.

pub mod embedder;
pub mod retriever;
pub mod vector_store;

pub use embedder::{Embedder, OpenAiEmbedder};
pub use retriever::{build_index, table_to_text, EmbeddingRetriever};
pub use vector_store::{Embedding, InMemoryVectorStore, SearchResult, TableDocument};

use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait SchemaRetriever: Send + Sync {
    /// Candidate tables with their relevance scores, most relevant first.
    /// An empty list is a valid answer.
    async fn search(&self, question: &str) -> Result<Vec<(String, f32)>>;
}
