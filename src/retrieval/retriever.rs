//! Schema Retriever
//!
//! Embedding-based table ranking over an [`InMemoryVectorStore`].

use super::embedder::Embedder;
use super::vector_store::{InMemoryVectorStore, TableDocument};
use super::SchemaRetriever;
use crate::error::{with_timeout, Result};
use crate::pipeline::Timeouts;
use crate::storage::{ColumnInfo, StorageEngine};
use async_trait::async_trait;
use itertools::Itertools;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct EmbeddingRetriever {
    store: InMemoryVectorStore,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    min_score: f32,
}

impl EmbeddingRetriever {
    pub fn new(store: InMemoryVectorStore, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            top_k: 5,
            min_score: 0.0,
        }
    }

    /// Load table embeddings from an embeddings file.
    pub fn load(path: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let store = InMemoryVectorStore::load(path)?;
        if let (Some(indexed), Some(current)) = (store.model(), embedder.model()) {
            if indexed != current {
                warn!(
                    "Embeddings were built with {} but questions are embedded with {}; rebuild the index",
                    indexed, current
                );
            }
        }
        Ok(Self::new(store, embedder))
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }
}

#[async_trait]
impl SchemaRetriever for EmbeddingRetriever {
    async fn search(&self, question: &str) -> Result<Vec<(String, f32)>> {
        if self.store.is_empty() {
            return Ok(Vec::new());
        }
        let query_embedding = self.embedder.embed_text(question).await?;
        let results = self.store.search(&query_embedding, self.top_k, self.min_score)?;
        debug!("Retrieved tables: {:?}", results);
        Ok(results.into_iter().map(|r| (r.table, r.score)).collect())
    }
}

/// Searchable text for one table: its name and typed columns.
pub fn table_to_text(table: &str, columns: &[ColumnInfo]) -> String {
    let mut parts = vec![format!("Table: {}", table)];
    if !columns.is_empty() {
        parts.push(format!(
            "Columns: {}",
            columns.iter().map(|c| format!("{} ({})", c.name, c.data_type)).join(", ")
        ));
    }
    parts.join(". ")
}

/// Embed every table of the storage schema. The schema read is bounded by
/// `timeouts.storage`, each embedding call by `timeouts.retrieval`.
pub async fn build_index(
    storage: &dyn StorageEngine,
    embedder: &dyn Embedder,
    timeouts: &Timeouts,
) -> Result<InMemoryVectorStore> {
    let schema = with_timeout("Schema lookup", timeouts.storage, storage.get_schema()).await?;
    let mut store = match embedder.model() {
        Some(model) => InMemoryVectorStore::with_model(model),
        None => InMemoryVectorStore::new(),
    };
    for (table, columns) in &schema {
        let text = table_to_text(table, columns);
        let embedding = with_timeout("Table embedding", timeouts.retrieval, embedder.embed_text(&text)).await?;
        store.add_document(TableDocument {
            table: table.clone(),
            text,
            embedding,
        });
    }
    info!("Indexed {} of {} tables", store.len(), schema.len());
    Ok(store)
}
