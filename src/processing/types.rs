//! Core data types and error definitions for the processing pipeline.

use crate::{
    answer::GenerationError, embedding::EmbeddingClientError, index::IndexError,
    registry::RegistryError,
};
use anyhow::Error as TokenizerError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// File formats the loader selector understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Portable Document Format.
    Pdf,
    /// Plain UTF-8 text.
    Txt,
    /// Office Open XML word processing document.
    Docx,
}

impl FileType {
    /// Extensions accepted by the loader selector, in display order.
    pub const SUPPORTED_EXTENSIONS: [&'static str; 3] = [".pdf", ".txt", ".docx"];

    /// Resolve a file type from an extension with or without the leading dot.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.').to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Txt),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    /// Lowercase extension without the dot.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Txt => "txt",
            Self::Docx => "docx",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source metadata attached to each loaded segment and inherited by its chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMetadata {
    /// Name of the uploaded file the segment came from.
    pub source: String,
    /// One-based page number for paged formats.
    pub page: Option<u32>,
}

/// Ordered unit of loaded text (a page for PDFs, the whole body otherwise).
#[derive(Debug, Clone)]
pub struct DocumentSegment {
    /// Extracted text.
    pub text: String,
    /// Where the text came from.
    pub metadata: SegmentMetadata,
}

/// Text extracted from one uploaded file.
#[derive(Debug, Clone)]
pub struct Document {
    /// Name the document is registered under.
    pub name: String,
    /// Detected format.
    pub file_type: FileType,
    /// Ordered segments.
    pub segments: Vec<DocumentSegment>,
}

impl Document {
    /// Total number of characters across all segments.
    pub fn char_len(&self) -> usize {
        self.segments
            .iter()
            .map(|segment| segment.text.chars().count())
            .sum()
    }
}

/// Bounded window of document text; the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the chunk within its document, starting at zero.
    pub ordinal: usize,
    /// Chunk text.
    pub text: String,
    /// Name of the uploaded file.
    pub source: String,
    /// One-based page number for paged formats.
    pub page: Option<u32>,
}

impl Chunk {
    /// Human-readable source identifier returned alongside answers.
    pub fn source_label(&self) -> String {
        match self.page {
            Some(page) => format!("{} (page {page})", self.source),
            None => self.source.clone(),
        }
    }
}

/// Errors produced while turning loaded text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible window size.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave room for the window to advance.
    #[error("chunk overlap {overlap} must be smaller than chunk size {chunk_size}")]
    OverlapTooLarge {
        /// Requested overlap.
        overlap: usize,
        /// Requested chunk size.
        chunk_size: usize,
    },
    /// Tokenizer resources were unavailable or produced undecodable output.
    #[error("tokenizer failure for encoding '{encoding}': {source}")]
    Tokenizer {
        /// Encoding we attempted to use.
        encoding: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Errors raised while selecting a loader or parsing a file.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The extension has no registered loader.
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
    /// Reading the file from disk failed.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
    /// The file could not be parsed as the detected format.
    #[error("Failed to parse {format} file: {message}")]
    Parse {
        /// Format we attempted to parse.
        format: FileType,
        /// Parser diagnostic.
        message: String,
    },
}

/// Errors emitted by the upload pipeline.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// The uploaded file's extension is not supported.
    #[error("Unsupported file type: {0}. Supported types: .pdf, .txt, .docx")]
    UnsupportedFileType(String),
    /// The multipart request carried no file.
    #[error("No file was uploaded")]
    MissingFile,
    /// The upload could not be read.
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),
    /// Loading or parsing the document failed.
    #[error(transparent)]
    Loader(LoaderError),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// The document produced no text to index.
    #[error("Document contains no extractable text")]
    EmptyDocument,
    /// Embedding provider failed to produce vectors for the chunks.
    #[error("{0}")]
    Embedding(#[from] EmbeddingClientError),
    /// The vector index could not be built.
    #[error("Failed to build index: {0}")]
    Index(#[from] IndexError),
    /// Temporary storage failed.
    #[error("Temporary storage failed: {0}")]
    Io(#[from] std::io::Error),
    /// The indexing timestamp could not be rendered.
    #[error("Failed to format indexing time: {0}")]
    Timestamp(#[from] time::error::Format),
    /// A blocking worker task panicked or was cancelled.
    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl ProcessingError {
    /// Whether the failure is the caller's fault rather than the server's.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFileType(_) | Self::MissingFile | Self::InvalidUpload(_)
        )
    }
}

impl From<LoaderError> for ProcessingError {
    fn from(error: LoaderError) -> Self {
        match error {
            LoaderError::UnsupportedFileType(extension) => Self::UnsupportedFileType(extension),
            other => Self::Loader(other),
        }
    }
}

/// Errors emitted while answering a question.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The question was blank.
    #[error("Question must not be empty")]
    EmptyQuestion,
    /// No index is registered under the requested name.
    #[error("Document '{0}' not found. Upload and process it first.")]
    DocumentNotFound(String),
    /// Embedding provider failed to embed the question.
    #[error("{0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Similarity search failed.
    #[error("Search failed: {0}")]
    Index(#[from] IndexError),
    /// The answer composer failed.
    #[error("{0}")]
    Generation(#[from] GenerationError),
    /// A blocking worker task panicked or was cancelled.
    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl From<RegistryError> for QueryError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::NotFound(name) => Self::DocumentNotFound(name),
        }
    }
}

/// Summary of a completed upload produced by the processing service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingOutcome {
    /// Name the document is registered under.
    pub document_name: String,
    /// Number of chunks indexed.
    pub chunk_count: usize,
    /// Embedding dimension of the index.
    pub dimension: usize,
    /// Whether an earlier index under the same name was superseded.
    pub replaced: bool,
}

/// Answer returned to API consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// Document the question was asked against.
    pub document_name: String,
    /// Generated answer or labeled retrieved context.
    pub text: String,
    /// Deduplicated, sorted source labels of the retrieved chunks.
    pub sources: Vec<String>,
}

/// Metadata describing one registered document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    /// Registered name.
    pub name: String,
    /// Number of indexed chunks.
    pub chunks: usize,
    /// Embedding dimension.
    pub dimension: usize,
    /// Detected file type.
    pub file_type: FileType,
    /// SHA-256 digest of the uploaded bytes.
    pub content_sha256: String,
    /// RFC 3339 timestamp of the upload that produced the index.
    pub indexed_at: String,
}

/// Static description of the running configuration for the status endpoint.
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Language model identifier (generative mode only).
    pub llm_model: Option<String>,
    /// Active answer mode.
    pub answer_mode: &'static str,
    /// Names of documents currently available for questions.
    pub active_docs: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_resolution_ignores_case_and_dot() {
        assert_eq!(FileType::from_extension(".PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_extension("docx"), Some(FileType::Docx));
        assert_eq!(FileType::from_extension("csv"), None);
    }

    #[test]
    fn source_label_includes_page_when_present() {
        let chunk = Chunk {
            ordinal: 0,
            text: "body".into(),
            source: "report.pdf".into(),
            page: Some(3),
        };
        assert_eq!(chunk.source_label(), "report.pdf (page 3)");

        let plain = Chunk {
            page: None,
            source: "notes.txt".into(),
            ..chunk
        };
        assert_eq!(plain.source_label(), "notes.txt");
    }

    #[test]
    fn unsupported_loader_errors_become_client_errors() {
        let error = ProcessingError::from(LoaderError::UnsupportedFileType(".csv".into()));
        assert!(error.is_client_error());
        assert!(error.to_string().contains(".csv"));

        let parse = ProcessingError::from(LoaderError::Parse {
            format: FileType::Pdf,
            message: "bad xref".into(),
        });
        assert!(!parse.is_client_error());
    }
}
