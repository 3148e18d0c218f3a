//! Text Embedder
//!
//! Embeds questions and table descriptions using an OpenAI-compatible
//! embeddings API.

use crate::error::{Nl2SqlError, Result};
use crate::retrieval::vector_store::Embedding;
use async_trait::async_trait;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_text(&self, text: &str) -> Result<Embedding>;

    /// Model the vectors come from, when known.
    fn model(&self) -> Option<&str> {
        None
    }
}

pub struct OpenAiEmbedder {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String, // e.g., "text-embedding-3-small"
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }

    async fn embed_text(&self, text: &str) -> Result<Embedding> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Nl2SqlError::Llm(format!("Embedding API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Nl2SqlError::Llm(format!("Embedding API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Nl2SqlError::Llm(format!("Failed to parse embedding response: {}", e)))?;

        parse_embedding(&response_json)
    }
}

fn parse_embedding(response_json: &serde_json::Value) -> Result<Embedding> {
    let data = response_json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| Nl2SqlError::Llm("No embedding data in response".to_string()))?;

    let embedding: Embedding = data
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| Nl2SqlError::Llm("No embedding vector in response".to_string()))?
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect();

    if embedding.is_empty() {
        return Err(Nl2SqlError::Llm("Empty embedding vector in response".to_string()));
    }
    Ok(embedding)
}
