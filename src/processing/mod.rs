//! Document processing pipeline: loading, chunking, embedding, indexing, and answering.

pub mod chunking;
pub mod loader;
mod service;
pub mod types;

pub use chunking::TextChunker;
pub use loader::{DocumentLoader, get_document_loader};
pub use service::{ProcessingApi, ProcessingService, ServiceInitError};
pub use types::{
    Answer, Chunk, ChunkingError, Document, DocumentSegment, DocumentSummary, FileType,
    LoaderError, ProcessingError, ProcessingOutcome, QueryError, SegmentMetadata, ServiceStatus,
};
