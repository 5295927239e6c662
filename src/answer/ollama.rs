//! Ollama completion client (`POST /api/generate`, non-streaming).

use super::{GenerationError, GenerationRequest, LanguageModel};
use crate::config::Config;
use crate::remote::{RetryPolicy, build_http_client, send_with_retry};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

/// Language model served by a local Ollama runtime.
pub struct OllamaChatClient {
    http: Client,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

impl OllamaChatClient {
    /// Build a client from the `OLLAMA_URL`, `LLM_MODEL` and `REMOTE_*` settings.
    pub fn from_config(config: &Config) -> Result<Self, GenerationError> {
        let http = build_http_client("docqa/answer", config.remote_timeout())
            .map_err(|error| GenerationError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: config.ollama_url.clone(),
            model: config.llm_model.clone(),
            retry: RetryPolicy::from_config(config),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LanguageModel for OllamaChatClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let payload = json!({
            "model": self.model,
            "system": request.system,
            "prompt": request.user,
            "stream": false,
            "options": {
                "temperature": 0.1,
            }
        });
        let endpoint = self.endpoint();

        tracing::debug!(model = %self.model, "Requesting Ollama completion");
        let response = send_with_retry(self.retry, "ollama-generate", || {
            self.http.post(&endpoint).json(&payload)
        })
        .await?;

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!(
                "failed to decode Ollama response: {}",
                error.without_url()
            ))
        })?;

        if !body.done {
            return Err(GenerationError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use std::time::Duration;

    fn client_for(server: &MockServer) -> OllamaChatClient {
        OllamaChatClient {
            http: build_http_client("docqa-test", Duration::from_secs(5)).expect("client"),
            base_url: server.base_url(),
            model: "llama3.2".into(),
            retry: RetryPolicy::no_retry(),
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            system: "Answer from context.".into(),
            user: "Question: why?".into(),
        }
    }

    #[tokio::test]
    async fn returns_completion_text() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate").json_body(json!({
                    "model": "llama3.2",
                    "system": "Answer from context.",
                    "prompt": "Question: why?",
                    "stream": false,
                    "options": { "temperature": 0.1 }
                }));
                then.status(200).json_body(json!({
                    "response": "Because.",
                    "done": true
                }));
            })
            .await;

        let text = client_for(&server).generate(request()).await.expect("text");

        mock.assert_async().await;
        assert_eq!(text, "Because.");
    }

    #[tokio::test]
    async fn missing_model_is_provider_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(404).body("model 'llama3.2' not found");
            })
            .await;

        let error = client_for(&server).generate(request()).await.unwrap_err();
        assert!(matches!(error, GenerationError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn incomplete_responses_are_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({ "response": "partial", "done": false }));
            })
            .await;

        let error = client_for(&server).generate(request()).await.unwrap_err();
        assert!(matches!(error, GenerationError::InvalidResponse(_)));
    }
}
