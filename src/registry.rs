//! Process-wide map from document name to its searchable index.
//!
//! Writers replace whole entries; readers take an `Arc` clone of the index so an in-flight
//! question keeps using the index it started with even if the document is reprocessed.

use crate::index::VectorIndex;
use crate::processing::FileType;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Registry lookup failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No document is registered under the name.
    #[error("Document '{0}' not found")]
    NotFound(String),
}

/// Everything the registry keeps about one document.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    /// Searchable chunk index.
    pub index: Arc<VectorIndex>,
    /// Detected file type of the upload.
    pub file_type: FileType,
    /// Hex-encoded SHA-256 of the uploaded bytes.
    pub content_sha256: String,
    /// RFC 3339 timestamp of when the index was registered.
    pub indexed_at: String,
    sequence: u64,
}

impl RegistryEntry {
    /// Wrap a freshly built index.
    pub fn new(
        index: VectorIndex,
        file_type: FileType,
        content_sha256: String,
        indexed_at: String,
    ) -> Self {
        Self {
            index: Arc::new(index),
            file_type,
            content_sha256,
            indexed_at,
            sequence: 0,
        }
    }
}

/// Concurrent document registry with an optional size cap.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    entries: DashMap<String, RegistryEntry>,
    max_documents: Option<usize>,
    next_sequence: AtomicU64,
}

impl DocumentRegistry {
    /// Unbounded registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that evicts the oldest document once more than `max_documents` are held.
    pub fn with_capacity_limit(max_documents: Option<usize>) -> Self {
        Self {
            max_documents,
            ..Self::default()
        }
    }

    /// Register `entry` under `name`, returning the entry it replaced.
    ///
    /// When a cap is configured and exceeded, the least recently registered other document is
    /// evicted.
    pub fn put(&self, name: &str, mut entry: RegistryEntry) -> Option<RegistryEntry> {
        entry.sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let previous = self.entries.insert(name.to_string(), entry);

        if let Some(max) = self.max_documents {
            while self.entries.len() > max {
                let Some(oldest) = self.oldest_except(name) else {
                    break;
                };
                if self.entries.remove(&oldest).is_some() {
                    tracing::info!(document = %oldest, max_documents = max, "Evicted oldest document");
                }
            }
        }

        previous
    }

    fn oldest_except(&self, keep: &str) -> Option<String> {
        self.entries
            .iter()
            .filter(|item| item.key() != keep)
            .min_by_key(|item| item.value().sequence)
            .map(|item| item.key().clone())
    }

    /// Index registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<VectorIndex>, RegistryError> {
        self.entries
            .get(name)
            .map(|entry| Arc::clone(&entry.index))
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Full entry registered under `name`.
    pub fn entry(&self, name: &str) -> Option<RegistryEntry> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    /// Registered names in sorted order.
    pub fn list(&self) -> BTreeSet<String> {
        self.entries.iter().map(|item| item.key().clone()).collect()
    }

    /// Drop the document registered under `name`.
    pub fn remove(&self, name: &str) -> Result<RegistryEntry, RegistryError> {
        self.entries
            .remove(name)
            .map(|(_, entry)| entry)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Number of registered documents.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no documents are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::Chunk;

    fn entry(text: &str) -> RegistryEntry {
        let index = VectorIndex::build(
            vec![Chunk {
                ordinal: 0,
                text: text.to_string(),
                source: "doc.txt".into(),
                page: None,
            }],
            vec![vec![1.0, 0.0]],
        )
        .expect("index");
        RegistryEntry::new(
            index,
            FileType::Txt,
            "digest".into(),
            "2026-01-01T00:00:00Z".into(),
        )
    }

    fn first_text(index: &VectorIndex) -> String {
        index.chunks().next().expect("chunk").text.clone()
    }

    #[test]
    fn missing_names_are_not_found() {
        let registry = DocumentRegistry::new();
        assert_eq!(
            registry.get("nope.pdf").unwrap_err(),
            RegistryError::NotFound("nope.pdf".into())
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn put_replaces_existing_entry() {
        let registry = DocumentRegistry::new();
        assert!(registry.put("a.txt", entry("old")).is_none());
        let previous = registry.put("a.txt", entry("new"));

        assert_eq!(first_text(&previous.expect("replaced").index), "old");
        assert_eq!(first_text(&registry.get("a.txt").unwrap()), "new");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn readers_keep_their_snapshot_across_replacement() {
        let registry = DocumentRegistry::new();
        registry.put("a.txt", entry("old"));
        let held = registry.get("a.txt").unwrap();
        registry.put("a.txt", entry("new"));

        assert_eq!(first_text(&held), "old");
        assert_eq!(first_text(&registry.get("a.txt").unwrap()), "new");
    }

    #[test]
    fn list_is_sorted() {
        let registry = DocumentRegistry::new();
        registry.put("b.txt", entry("b"));
        registry.put("a.pdf", entry("a"));
        let names: Vec<String> = registry.list().into_iter().collect();
        assert_eq!(names, vec!["a.pdf", "b.txt"]);
    }

    #[test]
    fn remove_evicts_and_reports_missing() {
        let registry = DocumentRegistry::new();
        registry.put("a.txt", entry("a"));
        assert!(registry.remove("a.txt").is_ok());
        assert!(registry.get("a.txt").is_err());
        assert_eq!(
            registry.remove("a.txt").unwrap_err(),
            RegistryError::NotFound("a.txt".into())
        );
    }

    #[test]
    fn cap_evicts_least_recently_registered() {
        let registry = DocumentRegistry::with_capacity_limit(Some(2));
        registry.put("one.txt", entry("1"));
        registry.put("two.txt", entry("2"));
        registry.put("one.txt", entry("1b"));
        registry.put("three.txt", entry("3"));

        let names: Vec<String> = registry.list().into_iter().collect();
        assert_eq!(names, vec!["one.txt", "three.txt"]);
    }
}
