//! Processing service coordinating loading, chunking, embedding, indexing, and answering.

use crate::{
    answer::{AnswerComposer, build_answer_composer},
    config::Config,
    embedding::{EmbeddingClient, build_embedding_client},
    index::VectorIndex,
    metrics::{MetricsSnapshot, ServiceMetrics},
    processing::{
        chunking::TextChunker,
        loader::get_document_loader,
        types::{
            Answer, Chunk, ChunkingError, DocumentSummary, ProcessingError, ProcessingOutcome,
            QueryError, ServiceStatus,
        },
    },
    registry::{DocumentRegistry, RegistryEntry, RegistryError},
};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

/// Errors raised while wiring the service together at startup.
#[derive(Debug, Error)]
pub enum ServiceInitError {
    /// The embedding backend could not be constructed.
    #[error("Failed to initialize embedding client: {0}")]
    Embedding(#[from] crate::embedding::EmbeddingClientError),
    /// The answer backend could not be constructed.
    #[error("Failed to initialize answer composer: {0}")]
    Answer(#[from] crate::answer::GenerationError),
    /// The chunker rejected its configuration.
    #[error("Failed to initialize text chunker: {0}")]
    Chunking(#[from] ChunkingError),
}

/// Coordinates the upload pipeline and question answering over the shared registry.
///
/// The service owns long-lived handles to the embedding client, answer composer, document
/// registry, and metrics so every HTTP request reuses the same components. Construct it once
/// near process start and share it through an `Arc`.
pub struct ProcessingService {
    embedding_client: Box<dyn EmbeddingClient>,
    composer: Box<dyn AnswerComposer>,
    registry: DocumentRegistry,
    chunker: TextChunker,
    top_k: usize,
    temp_dir: PathBuf,
    metrics: Arc<ServiceMetrics>,
}

/// Abstraction over the processing pipeline used by the HTTP surface.
#[async_trait]
pub trait ProcessingApi: Send + Sync {
    /// Load, chunk, embed, and register an uploaded file under its file name.
    async fn process_upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<ProcessingOutcome, ProcessingError>;

    /// Answer `question` from the document registered as `document_name`.
    async fn ask(&self, document_name: &str, question: &str) -> Result<Answer, QueryError>;

    /// Describe the running configuration and registered documents.
    fn status(&self) -> ServiceStatus;

    /// Metadata for every registered document, sorted by name.
    fn list_documents(&self) -> Vec<DocumentSummary>;

    /// Evict a registered document.
    fn remove_document(&self, name: &str) -> Result<DocumentSummary, RegistryError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl ProcessingService {
    /// Build a new processing service from configuration.
    pub fn new(config: &Config) -> Result<Self, ServiceInitError> {
        tracing::info!("Initializing embedding client");
        let embedding_client = build_embedding_client(config)?;
        let composer = build_answer_composer(config)?;
        let chunker = TextChunker::new(
            config.text_splitter_chunk_size,
            config.text_splitter_chunk_overlap,
            config.text_splitter_unit,
        )?;
        tracing::debug!(?chunker, top_k = config.retrieval_top_k, "Text chunker ready");

        let service = Self::with_components(
            embedding_client,
            composer,
            chunker,
            DocumentRegistry::with_capacity_limit(config.registry_max_documents),
            config.retrieval_top_k,
        );
        Ok(match &config.upload_temp_dir {
            Some(dir) => service.with_temp_dir(dir),
            None => service,
        })
    }

    /// Assemble a service from already constructed parts.
    pub fn with_components(
        embedding_client: Box<dyn EmbeddingClient>,
        composer: Box<dyn AnswerComposer>,
        chunker: TextChunker,
        registry: DocumentRegistry,
        top_k: usize,
    ) -> Self {
        Self {
            embedding_client,
            composer,
            registry,
            chunker,
            top_k: top_k.max(1),
            temp_dir: std::env::temp_dir(),
            metrics: Arc::new(ServiceMetrics::new()),
        }
    }

    /// Write upload temporaries under `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// Load, chunk, embed, and register an uploaded file.
    ///
    /// The registry is only touched after the index is fully built, so a failed upload leaves any
    /// previous index under the same name in place.
    pub async fn process_upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<ProcessingOutcome, ProcessingError> {
        let started = Instant::now();
        match self.run_upload(file_name, bytes).await {
            Ok(outcome) => {
                self.metrics.record_document(outcome.chunk_count as u64);
                tracing::info!(
                    document = %outcome.document_name,
                    chunks = outcome.chunk_count,
                    dimension = outcome.dimension,
                    replaced = outcome.replaced,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Document indexed"
                );
                Ok(outcome)
            }
            Err(error) => {
                self.metrics.record_failed_upload();
                tracing::error!(file = file_name, error = %error, "Document processing failed");
                Err(error)
            }
        }
    }

    async fn run_upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<ProcessingOutcome, ProcessingError> {
        let document_name = document_name_from(file_name)?;
        let loader = get_document_loader(Path::new(&document_name))?;
        let file_type = loader.file_type();
        tracing::info!(document = %document_name, %file_type, bytes = bytes.len(), "Processing upload");

        let chunker = self.chunker.clone();
        let source = document_name.clone();
        let temp_dir = self.temp_dir.clone();
        let (chunks, content_sha256) = tokio::task::spawn_blocking(
            move || -> Result<(Vec<Chunk>, String), ProcessingError> {
                let content_sha256 = hex::encode(Sha256::digest(&bytes));

                // Removed when dropped, on every exit path.
                let mut temp = tempfile::Builder::new()
                    .prefix(&format!("docqa-{}-", Uuid::new_v4()))
                    .suffix(&format!(".{file_type}"))
                    .tempfile_in(&temp_dir)?;
                temp.write_all(&bytes)?;
                temp.flush()?;

                let document = loader.load(temp.path(), &source)?;
                tracing::debug!(
                    document = %source,
                    segments = document.segments.len(),
                    characters = document.char_len(),
                    "Document loaded"
                );
                let chunks = chunker.split_document(&document)?;
                Ok((chunks, content_sha256))
            },
        )
        .await
        .map_err(|error| ProcessingError::Worker(error.to_string()))??;

        if chunks.is_empty() {
            return Err(ProcessingError::EmptyDocument);
        }
        tracing::debug!(document = %document_name, chunks = chunks.len(), "Document chunked");

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedding_client.generate_embeddings(texts).await?;

        let index = tokio::task::spawn_blocking(move || VectorIndex::build(chunks, vectors))
            .await
            .map_err(|error| ProcessingError::Worker(error.to_string()))??;
        let chunk_count = index.len();
        let dimension = index.dimension();

        let indexed_at = rfc3339(OffsetDateTime::now_utc())?;
        let previous = self.registry.put(
            &document_name,
            RegistryEntry::new(index, file_type, content_sha256, indexed_at),
        );
        if let Some(previous) = &previous {
            tracing::warn!(
                document = %document_name,
                previous_chunks = previous.index.len(),
                previous_indexed_at = %previous.indexed_at,
                "Replaced existing index; last completed upload wins"
            );
        }

        Ok(ProcessingOutcome {
            document_name,
            chunk_count,
            dimension,
            replaced: previous.is_some(),
        })
    }

    /// Retrieve the most relevant chunks of a registered document and compose an answer.
    pub async fn ask(&self, document_name: &str, question: &str) -> Result<Answer, QueryError> {
        let started = Instant::now();
        match self.run_query(document_name, question).await {
            Ok(answer) => {
                self.metrics.record_answer();
                tracing::info!(
                    document = document_name,
                    sources = answer.sources.len(),
                    mode = self.composer.mode().as_str(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Question answered"
                );
                Ok(answer)
            }
            Err(error) => {
                self.metrics.record_failed_question();
                tracing::error!(document = document_name, error = %error, "Question failed");
                Err(error)
            }
        }
    }

    async fn run_query(&self, document_name: &str, question: &str) -> Result<Answer, QueryError> {
        // An unknown document is reported before an empty question.
        let index = self.registry.get(document_name)?;
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuestion);
        }

        let query = self.embedding_client.embed_query(question).await?;

        let top_k = self.top_k;
        let hits = tokio::task::spawn_blocking(move || index.search(&query, top_k))
            .await
            .map_err(|error| QueryError::Worker(error.to_string()))??;
        tracing::debug!(
            document = document_name,
            hits = hits.len(),
            best_score = hits.first().map(|hit| hit.score),
            "Retrieved chunks"
        );

        let composed = self.composer.compose(question, &hits).await?;
        Ok(Answer {
            document_name: document_name.to_string(),
            text: composed.text,
            sources: composed.sources,
        })
    }

    /// Describe the running configuration and registered documents.
    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            embedding_model: self.embedding_client.model().to_string(),
            llm_model: self.composer.model().map(str::to_string),
            answer_mode: self.composer.mode().as_str(),
            active_docs: self.registry.list().into_iter().collect(),
        }
    }

    /// Metadata for every registered document, sorted by name.
    pub fn list_documents(&self) -> Vec<DocumentSummary> {
        self.registry
            .list()
            .into_iter()
            .filter_map(|name| {
                let entry = self.registry.entry(&name)?;
                Some(summarize(name, &entry))
            })
            .collect()
    }

    /// Evict a registered document.
    pub fn remove_document(&self, name: &str) -> Result<DocumentSummary, RegistryError> {
        let entry = self.registry.remove(name)?;
        tracing::info!(document = name, "Document evicted");
        Ok(summarize(name.to_string(), &entry))
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.registry.len())
    }
}

fn summarize(name: String, entry: &RegistryEntry) -> DocumentSummary {
    DocumentSummary {
        name,
        chunks: entry.index.len(),
        dimension: entry.index.dimension(),
        file_type: entry.file_type,
        content_sha256: entry.content_sha256.clone(),
        indexed_at: entry.indexed_at.clone(),
    }
}

fn rfc3339(at: OffsetDateTime) -> Result<String, ProcessingError> {
    Ok(at.format(&Rfc3339)?)
}

/// Strip any client-supplied directory components from an upload's file name.
fn document_name_from(file_name: &str) -> Result<String, ProcessingError> {
    let name = file_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() {
        return Err(ProcessingError::InvalidUpload(
            "uploaded file has no name".into(),
        ));
    }
    Ok(name.to_string())
}

#[async_trait]
impl ProcessingApi for ProcessingService {
    async fn process_upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<ProcessingOutcome, ProcessingError> {
        ProcessingService::process_upload(self, file_name, bytes).await
    }

    async fn ask(&self, document_name: &str, question: &str) -> Result<Answer, QueryError> {
        ProcessingService::ask(self, document_name, question).await
    }

    fn status(&self) -> ServiceStatus {
        ProcessingService::status(self)
    }

    fn list_documents(&self) -> Vec<DocumentSummary> {
        ProcessingService::list_documents(self)
    }

    fn remove_document(&self, name: &str) -> Result<DocumentSummary, RegistryError> {
        ProcessingService::remove_document(self, name)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        ProcessingService::metrics_snapshot(self)
    }
}
