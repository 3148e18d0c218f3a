//! Vector Store
//!
//! In-memory table embeddings with exact cosine-similarity search, persisted
//! as a JSON embeddings file.

use crate::error::{Nl2SqlError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;
use tracing::{info, warn};

pub type Embedding = Vec<f32>;

/// One embedded table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDocument {
    pub table: String,
    pub text: String,
    pub embedding: Embedding,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub table: String,
    pub score: f32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EmbeddingsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    tables: Vec<TableDocument>,
}

#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    documents: Vec<TableDocument>,
    dimension: Option<usize>,
    model: Option<String>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }

    /// Add a document. The first document fixes the store dimension; later
    /// documents with a different dimension are skipped. Returns whether the
    /// document was stored.
    pub fn add_document(&mut self, document: TableDocument) -> bool {
        let dimension = document.embedding.len();
        if dimension == 0 {
            warn!("Skipping table {} with empty embedding", document.table);
            return false;
        }
        match self.dimension {
            Some(expected) if expected != dimension => {
                warn!(
                    "Skipping table {}: embedding dimension {} doesn't match store dimension {}",
                    document.table, dimension, expected
                );
                return false;
            }
            None => self.dimension = Some(dimension),
            _ => {}
        }
        self.documents.retain(|d| d.table != document.table);
        self.documents.push(document);
        true
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Top `top_k` tables scoring at least `min_score`, best first. Equal
    /// scores are ordered by table name so results are stable.
    pub fn search(&self, query: &[f32], top_k: usize, min_score: f32) -> Result<Vec<SearchResult>> {
        let Some(dimension) = self.dimension else {
            return Ok(Vec::new());
        };
        if query.len() != dimension {
            return Err(Nl2SqlError::Retrieval(format!(
                "Query embedding dimension {} doesn't match store dimension {}",
                query.len(),
                dimension
            )));
        }

        let mut results: Vec<SearchResult> = self
            .documents
            .iter()
            .map(|doc| SearchResult {
                table: doc.table.clone(),
                score: cosine_similarity(query, &doc.embedding),
            })
            .filter(|r| r.score >= min_score)
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.table.cmp(&b.table))
        });
        results.truncate(top_k);
        Ok(results)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Nl2SqlError::Retrieval(format!("Failed to read embeddings file {}: {}", path.display(), e))
        })?;
        let file: EmbeddingsFile = serde_json::from_str(&raw)?;

        let mut store = Self {
            model: file.model,
            ..Self::default()
        };
        for document in file.tables {
            store.add_document(document);
        }
        info!("Loaded {} table embeddings from {}", store.len(), path.display());
        Ok(store)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = EmbeddingsFile {
            model: self.model.clone(),
            tables: self.documents.clone(),
        };
        std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
        info!("Saved {} table embeddings to {}", self.len(), path.display());
        Ok(())
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
