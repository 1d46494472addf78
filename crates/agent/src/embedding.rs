use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use partsage_core::config::EmbeddingConfig;
use partsage_db::{EmbeddingError, QueryEmbedder};

/// Query embedder backed by an Ollama-compatible `/api/embeddings` endpoint.
/// Must use the same model the offline pipeline used to embed the chunks.
pub struct HttpQueryEmbedder {
    client: Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

impl HttpQueryEmbedder {
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| EmbeddingError::Unavailable(format!("http client: {error}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/embeddings", config.base_url.trim().trim_end_matches('/')),
            model: config.model.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl QueryEmbedder for HttpQueryEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbeddingRequest { model: &self.model, prompt: text })
            .send()
            .await
            .map_err(|error| EmbeddingError::Unavailable(error.to_string()))?;

        if !response.status().is_success() {
            return Err(EmbeddingError::Unavailable(format!(
                "embedding endpoint returned {}",
                response.status()
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingError::InvalidResponse(error.to_string()))?;
        if body.embedding.is_empty() {
            return Err(EmbeddingError::InvalidResponse("empty embedding".to_string()));
        }
        Ok(body.embedding)
    }
}
