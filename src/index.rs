//! Exact cosine-similarity index over the chunks of one document.
//!
//! Per-document corpora are small, so search is a full scan. Results are ordered by descending
//! score with ties resolved by chunk order.

use crate::processing::Chunk;
use std::cmp::Ordering;
use thiserror::Error;

/// Errors raised while building or querying an index.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    /// No chunks were supplied.
    #[error("cannot build an index without chunks")]
    Empty,
    /// Every chunk needs exactly one vector.
    #[error("received {vectors} vectors for {chunks} chunks")]
    LengthMismatch {
        /// Number of chunks supplied.
        chunks: usize,
        /// Number of vectors supplied.
        vectors: usize,
    },
    /// A vector's dimension differs from the index dimension.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the index.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
}

/// A retrieved chunk with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

#[derive(Debug)]
struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
    norm: f32,
}

/// Immutable chunk/vector store for a single document.
#[derive(Debug)]
pub struct VectorIndex {
    entries: Vec<Entry>,
    dimension: usize,
}

impl VectorIndex {
    /// Pair each chunk with its vector. All vectors must share one non-zero dimension.
    pub fn build(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::Empty);
        }
        if chunks.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }

        let dimension = vectors[0].len();
        if dimension == 0 {
            return Err(IndexError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                if vector.len() != dimension {
                    return Err(IndexError::DimensionMismatch {
                        expected: dimension,
                        actual: vector.len(),
                    });
                }
                let norm = l2_norm(&vector);
                Ok(Entry {
                    chunk,
                    vector,
                    norm,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { entries, dimension })
    }

    /// Return up to `k` chunks most similar to `query`.
    ///
    /// Asking for more results than the index holds returns every chunk.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let query_norm = l2_norm(query);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, cosine(query, query_norm, entry)))
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(position, score)| ScoredChunk {
                chunk: self.entries[position].chunk.clone(),
                score,
            })
            .collect())
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no chunks. Always false for a built index.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimension shared by every stored vector.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Indexed chunks in document order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }
}

fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

fn cosine(query: &[f32], query_norm: f32, entry: &Entry) -> f32 {
    if query_norm == 0.0 || entry.norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = query
        .iter()
        .zip(&entry.vector)
        .map(|(a, b)| a * b)
        .sum();
    let score = dot / (query_norm * entry.norm);
    if score.is_nan() { 0.0 } else { score }
}
