//! Embedding client abstraction and adapters.
//!
//! Callers depend only on [`EmbeddingClient`]; the concrete backend is chosen once at startup by
//! [`build_embedding_client`]. The local hashing encoder runs in-process on the blocking pool,
//! while the Ollama and OpenAI adapters are remote HTTP calls with retries.

mod ollama;
mod openai;

pub use ollama::OllamaEmbeddingClient;
pub use openai::OpenAiEmbeddingClient;

use crate::config::{Config, EmbeddingProvider};
use crate::remote::RemoteFailure;
use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Local computation failed or the input was unusable.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// The remote provider could not be reached or timed out.
    #[error("Embedding provider unreachable: {0}")]
    Transport(String),
    /// The remote provider kept rejecting requests with `429 Too Many Requests`.
    #[error("Embedding provider rate limit exceeded: {0}")]
    RateLimited(String),
    /// The remote provider answered with an unexpected status code.
    #[error("Unexpected embedding provider response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The remote provider answered successfully but the payload was unusable.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

impl EmbeddingClientError {
    /// Whether the failure came from a remote provider rather than local computation.
    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::GenerationFailed(_))
    }
}

impl From<RemoteFailure> for EmbeddingClientError {
    fn from(failure: RemoteFailure) -> Self {
        match failure {
            RemoteFailure::Transport(error) => Self::Transport(error.to_string()),
            RemoteFailure::Status { status, body } if status == StatusCode::TOO_MANY_REQUESTS => {
                Self::RateLimited(body)
            }
            RemoteFailure::Status { status, body } => Self::UnexpectedStatus { status, body },
        }
    }
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text, preserving order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Embed a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
        let mut vectors = self.generate_embeddings(vec![text.to_string()]).await?;
        match vectors.pop() {
            Some(vector) if vectors.is_empty() => Ok(vector),
            _ => Err(EmbeddingClientError::InvalidResponse(
                "expected exactly one vector for the query".into(),
            )),
        }
    }

    /// Model identifier reported by the status endpoint.
    fn model(&self) -> &str;

    /// Dimensionality of every produced vector.
    fn dimension(&self) -> usize;
}

/// Check that a remote provider returned one vector of the expected size per input.
pub(crate) fn validate_batch(
    vectors: &[Vec<f32>],
    expected_count: usize,
    dimension: usize,
) -> Result<(), EmbeddingClientError> {
    if vectors.len() != expected_count {
        return Err(EmbeddingClientError::InvalidResponse(format!(
            "expected {expected_count} vectors, got {}",
            vectors.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|vector| vector.len() != dimension) {
        return Err(EmbeddingClientError::InvalidResponse(format!(
            "expected dimension {dimension}, got {}",
            bad.len()
        )));
    }
    Ok(())
}

/// Deterministic in-process encoder using signed feature hashing over lowercase word tokens.
///
/// Texts sharing vocabulary land close together under cosine similarity, which is enough for
/// per-document retrieval without a model download.
pub struct HashingEmbeddingClient {
    model: String,
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Construct a new hashing encoder producing `dimension`-sized vectors.
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            model: model.into(),
            dimension,
        }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let hash = fnv1a(&token.to_lowercase());
            let position = (hash % dimension as u64) as usize;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            embedding[position] += sign;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

fn fnv1a(token: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    token.bytes().fold(OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(PRIME)
    })
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let dimension = self.dimension;

        tracing::debug!(
            model = %self.model,
            dimension,
            texts = texts.len(),
            "Generating local embeddings"
        );

        if dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        tokio::task::spawn_blocking(move || {
            texts
                .iter()
                .map(|text| Self::encode(text, dimension))
                .collect()
        })
        .await
        .map_err(|error| {
            EmbeddingClientError::GenerationFailed(format!("embedding worker failed: {error}"))
        })
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Build an embedding client suitable for the supplied configuration.
pub fn build_embedding_client(
    config: &Config,
) -> Result<Box<dyn EmbeddingClient>, EmbeddingClientError> {
    let client: Box<dyn EmbeddingClient> = match config.embedding_provider {
        EmbeddingProvider::Local => Box::new(HashingEmbeddingClient::new(
            config.embedding_model.clone(),
            config.embedding_dimension,
        )),
        EmbeddingProvider::Ollama => Box::new(OllamaEmbeddingClient::from_config(config)?),
        EmbeddingProvider::OpenAI => Box::new(OpenAiEmbeddingClient::from_config(config)?),
    };
    tracing::info!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        dimension = config.embedding_dimension,
        "Embedding client initialized"
    );
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn hashing_client_is_deterministic_and_normalized() {
        let client = HashingEmbeddingClient::new("hashing", 64);
        let vectors = client
            .generate_embeddings(vec!["Rust ownership rules".into(), "Rust ownership rules".into()])
            .await
            .expect("embeddings");

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vectors[1]);
        assert_eq!(vectors[0].len(), 64);
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn hashing_client_scores_shared_vocabulary_higher() {
        let client = HashingEmbeddingClient::new("hashing", 384);
        let query = client.embed_query("what color is the lighthouse").await.unwrap();
        let related = client
            .embed_query("The lighthouse is painted a bright red color.")
            .await
            .unwrap();
        let unrelated = client
            .embed_query("Quarterly revenue grew by eight percent.")
            .await
            .unwrap();

        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[tokio::test]
    async fn hashing_client_rejects_empty_batch() {
        let client = HashingEmbeddingClient::new("hashing", 8);
        let error = client.generate_embeddings(Vec::new()).await.unwrap_err();
        assert!(matches!(error, EmbeddingClientError::GenerationFailed(_)));
        assert!(!error.is_remote());
    }

    #[test]
    fn empty_text_encodes_to_zero_vector() {
        let vector = HashingEmbeddingClient::encode("  ... ", 16);
        assert!(vector.iter().all(|value| *value == 0.0));
    }

    #[test]
    fn validate_batch_detects_dimension_mismatch() {
        let error = validate_batch(&[vec![0.0; 3]], 1, 4).unwrap_err();
        assert!(matches!(error, EmbeddingClientError::InvalidResponse(ref msg) if msg.contains("4")));
        assert!(validate_batch(&[vec![0.0; 4]], 1, 4).is_ok());
    }

    #[test]
    fn rate_limit_failures_map_to_dedicated_variant() {
        let error = EmbeddingClientError::from(RemoteFailure::Status {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: "quota".into(),
        });
        assert!(matches!(error, EmbeddingClientError::RateLimited(_)));
        assert!(error.is_remote());
    }
}
