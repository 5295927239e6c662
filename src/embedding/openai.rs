//! OpenAI-compatible embedding adapter (`POST /v1/embeddings`).

use super::{EmbeddingClient, EmbeddingClientError, validate_batch};
use crate::config::Config;
use crate::remote::{RetryPolicy, build_http_client, send_with_retry};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

/// Embedding client for hosted OpenAI-compatible endpoints.
pub struct OpenAiEmbeddingClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingClient {
    /// Build a client from `OPENAI_*`, `EMBEDDING_*` and `REMOTE_*` settings.
    pub fn from_config(config: &Config) -> Result<Self, EmbeddingClientError> {
        let api_key = config.openai_api_key.clone().ok_or_else(|| {
            EmbeddingClientError::GenerationFailed("OPENAI_API_KEY is not configured".into())
        })?;
        let http = build_http_client("docqa/embeddings", config.remote_timeout())
            .map_err(|error| EmbeddingClientError::Transport(error.to_string()))?;
        Ok(Self {
            http,
            base_url: config.openai_base_url.clone(),
            api_key,
            model: config.embedding_model.clone(),
            dimension: config.embedding_dimension,
            retry: RetryPolicy::from_config(config),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
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

        tracing::debug!(model = %self.model, texts = expected, "Requesting OpenAI embeddings");
        let response = send_with_retry(self.retry, "openai-embed", || {
            self.http
                .post(&endpoint)
                .bearer_auth(&self.api_key)
                .json(&payload)
        })
        .await?;

        let mut body: EmbeddingsResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode embeddings response: {}",
                error.without_url()
            ))
        })?;

        body.data.sort_by_key(|item| item.index);
        let vectors: Vec<Vec<f32>> = body.data.into_iter().map(|item| item.embedding).collect();
        validate_batch(&vectors, expected, self.dimension)?;
        Ok(vectors)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn client_for(server: &MockServer) -> OpenAiEmbeddingClient {
        let config = Config {
            openai_api_key: Some("sk-test".into()),
            openai_base_url: server.base_url(),
            embedding_model: "text-embedding-3-small".into(),
            embedding_dimension: 2,
            remote_max_retries: 0,
            ..Config::default()
        };
        OpenAiEmbeddingClient::from_config(&config).expect("client")
    }

    #[tokio::test]
    async fn reorders_results_by_index_and_sends_bearer_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .header("authorization", "Bearer sk-test");
                then.status(200).json_body(json!({
                    "data": [
                        { "index": 1, "embedding": [0.0, 1.0] },
                        { "index": 0, "embedding": [1.0, 0.0] }
                    ]
                }));
            })
            .await;

        let vectors = client_for(&server)
            .generate_embeddings(vec!["a".into(), "b".into()])
            .await
            .expect("embeddings");

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn quota_errors_are_reported_as_rate_limits() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(429).body("insufficient_quota");
            })
            .await;

        let error = client_for(&server)
            .generate_embeddings(vec!["a".into()])
            .await
            .unwrap_err();
        assert!(matches!(error, EmbeddingClientError::RateLimited(ref body) if body == "insufficient_quota"));
    }
}
