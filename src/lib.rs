#![deny(missing_docs)]

//! Core library for the docqa document question-answering server.

/// Answer composition and language model adapters.
pub mod answer;
/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Per-document similarity index.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Upload and question metrics.
pub mod metrics;
/// Document processing pipeline utilities.
pub mod processing;
/// Registry of indexed documents.
pub mod registry;
/// Shared HTTP client and retry plumbing for remote providers.
pub mod remote;
