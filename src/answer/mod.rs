//! Answer composition from retrieved chunks.
//!
//! [`ExtractiveComposer`] returns the retrieved text under a fixed label. [`GenerativeComposer`]
//! hands the same context to a [`LanguageModel`] and returns its reply. Both report the same
//! deduplicated source labels.

mod gemini;
mod ollama;

pub use gemini::GeminiClient;
pub use ollama::OllamaChatClient;

use crate::config::{AnswerMode, Config, LlmProvider};
use crate::index::ScoredChunk;
use crate::remote::RemoteFailure;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::BTreeSet;
use thiserror::Error;

/// Label prefixed to extractive answers.
pub const EXTRACTIVE_LABEL: &str = "Retrieved context:";

const SYSTEM_PROMPT: &str = "You answer questions about a single document. Use only the \
provided context. If the context does not contain the answer, say that you could not find it \
in the document. Keep the answer concise.";

/// Errors surfaced while composing an answer.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Provider was unreachable, timed out, or the endpoint does not exist.
    #[error("Language model unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider kept answering `429 Too Many Requests`.
    #[error("Language model rate limit exceeded: {0}")]
    RateLimited(String),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed language model response: {0}")]
    InvalidResponse(String),
    /// Provider answered with no text.
    #[error("Language model returned an empty answer")]
    EmptyResponse,
}

impl From<RemoteFailure> for GenerationError {
    fn from(failure: RemoteFailure) -> Self {
        match failure {
            RemoteFailure::Transport(error) => Self::ProviderUnavailable(error.to_string()),
            RemoteFailure::Status { status, body } if status == StatusCode::TOO_MANY_REQUESTS => {
                Self::RateLimited(body)
            }
            RemoteFailure::Status { status, body } if status == StatusCode::NOT_FOUND => {
                Self::ProviderUnavailable(format!("endpoint returned 404: {body}"))
            }
            RemoteFailure::Status { status, body } => {
                Self::GenerationFailed(format!("provider returned {status}: {body}"))
            }
        }
    }
}

/// Prompt pair sent to a language model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Instructions constraining the model.
    pub system: String,
    /// Context and question.
    pub user: String,
}

/// Interface implemented by language model backends.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for `request`.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;

    /// Model identifier reported by the status endpoint.
    fn model(&self) -> &str;
}

/// Composed answer text plus the sources it was drawn from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedAnswer {
    /// Answer text.
    pub text: String,
    /// Deduplicated, sorted source labels.
    pub sources: Vec<String>,
}

/// Strategy for turning retrieved chunks into an answer.
#[async_trait]
pub trait AnswerComposer: Send + Sync {
    /// Compose an answer for `question` from `chunks`, best match first.
    async fn compose(
        &self,
        question: &str,
        chunks: &[ScoredChunk],
    ) -> Result<ComposedAnswer, GenerationError>;

    /// Mode reported by the status endpoint.
    fn mode(&self) -> AnswerMode;

    /// Language model identifier, when one is used.
    fn model(&self) -> Option<&str> {
        None
    }
}

/// Deduplicated, sorted source labels of `chunks`.
pub fn collect_sources(chunks: &[ScoredChunk]) -> Vec<String> {
    chunks
        .iter()
        .map(|scored| scored.chunk.source_label())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn join_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|scored| scored.chunk.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Returns retrieved chunk text without calling a model.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractiveComposer;

#[async_trait]
impl AnswerComposer for ExtractiveComposer {
    async fn compose(
        &self,
        _question: &str,
        chunks: &[ScoredChunk],
    ) -> Result<ComposedAnswer, GenerationError> {
        Ok(ComposedAnswer {
            text: format!("{EXTRACTIVE_LABEL}\n\n{}", join_context(chunks)),
            sources: collect_sources(chunks),
        })
    }

    fn mode(&self) -> AnswerMode {
        AnswerMode::Extractive
    }
}

/// Answers with a language model conditioned on the retrieved chunks.
pub struct GenerativeComposer<L> {
    model: L,
}

impl<L: LanguageModel> GenerativeComposer<L> {
    /// Wrap a language model.
    pub fn new(model: L) -> Self {
        Self { model }
    }

    fn prompt(question: &str, chunks: &[ScoredChunk]) -> GenerationRequest {
        GenerationRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: format!(
                "Context:\n{}\n\nQuestion: {}\n\nAnswer:",
                join_context(chunks),
                question.trim()
            ),
        }
    }
}

#[async_trait]
impl<L: LanguageModel> AnswerComposer for GenerativeComposer<L> {
    async fn compose(
        &self,
        question: &str,
        chunks: &[ScoredChunk],
    ) -> Result<ComposedAnswer, GenerationError> {
        let reply = self.model.generate(Self::prompt(question, chunks)).await?;
        let text = reply.trim();
        if text.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(ComposedAnswer {
            text: text.to_string(),
            sources: collect_sources(chunks),
        })
    }

    fn mode(&self) -> AnswerMode {
        AnswerMode::Generative
    }

    fn model(&self) -> Option<&str> {
        Some(self.model.model())
    }
}

/// Build the answer composer selected by `ANSWER_MODE` and `LLM_PROVIDER`.
pub fn build_answer_composer(config: &Config) -> Result<Box<dyn AnswerComposer>, GenerationError> {
    let composer: Box<dyn AnswerComposer> = match config.answer_mode {
        AnswerMode::Extractive => Box::new(ExtractiveComposer),
        AnswerMode::Generative => match config.llm_provider {
            LlmProvider::Gemini => Box::new(GenerativeComposer::new(GeminiClient::from_config(
                config,
            )?)),
            LlmProvider::Ollama => Box::new(GenerativeComposer::new(
                OllamaChatClient::from_config(config)?,
            )),
        },
    };
    tracing::info!(
        mode = composer.mode().as_str(),
        model = composer.model().unwrap_or("none"),
        "Answer composer initialized"
    );
    Ok(composer)
}
