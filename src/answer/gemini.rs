//! Gemini Generative Language API client (`models/{model}:generateContent`).

use super::{GenerationError, GenerationRequest, LanguageModel};
use crate::config::Config;
use crate::remote::{RetryPolicy, build_http_client, send_with_retry};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Language model backed by Google Gemini.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    /// Build a client from the `GEMINI_*`, `LLM_MODEL` and `REMOTE_*` settings.
    pub fn from_config(config: &Config) -> Result<Self, GenerationError> {
        let api_key = config.gemini_api_key.clone().ok_or_else(|| {
            GenerationError::ProviderUnavailable("GEMINI_API_KEY is not set".into())
        })?;
        let http = build_http_client("docqa/gemini", config.remote_timeout())
            .map_err(|error| GenerationError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: config.gemini_base_url.clone(),
            api_key,
            model: config.llm_model.clone(),
            retry: RetryPolicy::from_config(config),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let payload = json!({
            "systemInstruction": { "parts": [{ "text": request.system }] },
            "contents": [{ "role": "user", "parts": [{ "text": request.user }] }],
            "generationConfig": { "temperature": 0.1 }
        });
        let endpoint = self.endpoint();

        tracing::debug!(model = %self.model, "Requesting Gemini completion");
        let response = send_with_retry(self.retry, "gemini", || {
            self.http
                .post(&endpoint)
                .header(API_KEY_HEADER, &self.api_key)
                .json(&payload)
        })
        .await?;

        let body: GenerateContentResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!(
                "failed to decode Gemini response: {}",
                error.without_url()
            ))
        })?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().map(|part| part.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text)
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

    fn client_for(server: &MockServer) -> GeminiClient {
        GeminiClient {
            http: build_http_client("docqa-test", Duration::from_secs(5)).expect("client"),
            base_url: server.base_url(),
            api_key: "test-key".into(),
            model: "gemini-2.5-flash".into(),
            retry: RetryPolicy::no_retry(),
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            system: "Be brief.".into(),
            user: "Context:\nx\n\nQuestion: y".into(),
        }
    }

    #[tokio::test]
    async fn joins_candidate_parts() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-2.5-flash:generateContent")
                    .header("x-goog-api-key", "test-key")
                    .body_contains("Be brief.");
                then.status(200).json_body(json!({
                    "candidates": [{
                        "content": { "role": "model", "parts": [{ "text": "Hello, " }, { "text": "world" }] }
                    }]
                }));
            })
            .await;

        let text = client_for(&server).generate(request()).await.expect("text");

        mock.assert_async().await;
        assert_eq!(text, "Hello, world");
    }

    #[tokio::test]
    async fn missing_candidates_are_empty_responses() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({ "candidates": [] }));
            })
            .await;

        let error = client_for(&server).generate(request()).await.unwrap_err();
        assert!(matches!(error, GenerationError::EmptyResponse));
    }

    #[tokio::test]
    async fn rejected_key_is_a_generation_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(403).body("API key not valid");
            })
            .await;

        let error = client_for(&server).generate(request()).await.unwrap_err();
        assert!(
            matches!(error, GenerationError::GenerationFailed(ref msg) if msg.contains("API key not valid"))
        );
    }

    #[tokio::test]
    async fn unreachable_provider_errors_do_not_expose_the_key() {
        let client = GeminiClient {
            http: build_http_client("docqa-test", Duration::from_millis(500)).expect("client"),
            // Port 9 (discard) on loopback is expected to refuse connections.
            base_url: "http://127.0.0.1:9".into(),
            api_key: "SECRET-GEMINI-KEY".into(),
            model: "gemini-2.5-flash".into(),
            retry: RetryPolicy::no_retry(),
        };

        let error = client.generate(request()).await.unwrap_err();

        assert!(matches!(error, GenerationError::ProviderUnavailable(_)));
        let message = format!("Retrieval failed: {error}");
        assert!(!message.contains("SECRET-GEMINI-KEY"), "{message}");
        assert!(!message.contains("generateContent"), "{message}");
    }

    #[test]
    fn from_config_requires_key() {
        let error = GeminiClient::from_config(&Config::default()).err().expect("error");
        assert!(matches!(error, GenerationError::ProviderUnavailable(_)));
    }
}
