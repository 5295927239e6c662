//! Ollama embedding adapter (`POST /api/embed`).

use super::{EmbeddingClient, EmbeddingClientError, validate_batch};
use crate::config::Config;
use crate::remote::{RetryPolicy, build_http_client, send_with_retry};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

/// Embedding client backed by a local or remote Ollama runtime.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    dimension: usize,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingClient {
    /// Build a client from the `OLLAMA_URL`, `EMBEDDING_*` and `REMOTE_*` settings.
    pub fn from_config(config: &Config) -> Result<Self, EmbeddingClientError> {
        let http = build_http_client("docqa/embeddings", config.remote_timeout())
            .map_err(|error| EmbeddingClientError::Transport(error.to_string()))?;
        Ok(Self::with_client(
            http,
            config.ollama_url.clone(),
            config.embedding_model.clone(),
            config.embedding_dimension,
            RetryPolicy::from_config(config),
        ))
    }

    fn with_client(
        http: Client,
        base_url: String,
        model: String,
        dimension: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            base_url,
            model,
            dimension,
            retry,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        let expected = texts.len();
        let payload = json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = self.endpoint();

        tracing::debug!(model = %self.model, texts = expected, "Requesting Ollama embeddings");
        let response = send_with_retry(self.retry, "ollama-embed", || {
            self.http.post(&endpoint).json(&payload)
        })
        .await?;

        let body: EmbedResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {}",
                error.without_url()
            ))
        })?;

        validate_batch(&body.embeddings, expected, self.dimension)?;
        Ok(body.embeddings)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
