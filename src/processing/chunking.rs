//! Fixed-window chunking with overlap.
//!
//! Windows are length-driven: each chunk holds at most `chunk_size` units and starts
//! `chunk_size - chunk_overlap` units after its predecessor, so neighbours share exactly
//! `chunk_overlap` units and the final window may be shorter.
//!
//! - `characters` (default) counts Unicode scalar values and never splits inside a code point.
//! - `tokens` counts `cl100k_base` tokens via `tiktoken-rs` and decodes each window back to text.

use super::types::{Chunk, ChunkingError, Document};
use crate::config::ChunkUnit;
use std::sync::Arc;
use tiktoken_rs::{CoreBPE, cl100k_base};

const TOKEN_ENCODING: &str = "cl100k_base";

/// Length-driven splitter shared by every upload.
#[derive(Clone)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    unit: ChunkUnit,
    encoding: Option<Arc<CoreBPE>>,
}

impl std::fmt::Debug for TextChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextChunker")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("unit", &self.unit)
            .finish()
    }
}

impl TextChunker {
    /// Validate the window parameters and load the tokenizer when counting tokens.
    pub fn new(
        chunk_size: usize,
        chunk_overlap: usize,
        unit: ChunkUnit,
    ) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                overlap: chunk_overlap,
                chunk_size,
            });
        }

        let encoding = match unit {
            ChunkUnit::Characters => None,
            ChunkUnit::Tokens => Some(Arc::new(cl100k_base().map_err(|source| {
                ChunkingError::Tokenizer {
                    encoding: TOKEN_ENCODING.to_string(),
                    source,
                }
            })?)),
        };

        Ok(Self {
            chunk_size,
            chunk_overlap,
            unit,
            encoding,
        })
    }

    /// Split every non-blank segment of `document`, numbering chunks across the whole document.
    pub fn split_document(&self, document: &Document) -> Result<Vec<Chunk>, ChunkingError> {
        let mut chunks = Vec::new();
        for segment in &document.segments {
            if segment.text.trim().is_empty() {
                continue;
            }
            for text in self.split_text(&segment.text)? {
                if text.trim().is_empty() {
                    continue;
                }
                chunks.push(Chunk {
                    ordinal: chunks.len(),
                    text,
                    source: segment.metadata.source.clone(),
                    page: segment.metadata.page,
                });
            }
        }
        Ok(chunks)
    }

    /// Split a single string into overlapping windows.
    pub fn split_text(&self, text: &str) -> Result<Vec<String>, ChunkingError> {
        match (&self.unit, &self.encoding) {
            (ChunkUnit::Tokens, Some(encoding)) => self.split_tokens(text, encoding),
            _ => Ok(self.split_characters(text)),
        }
    }

    fn split_characters(&self, text: &str) -> Vec<String> {
        // Byte offset of every character boundary, including the end of the string.
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect();
        let len = boundaries.len() - 1;

        window_bounds(len, self.chunk_size, self.chunk_overlap)
            .map(|(start, end)| text[boundaries[start]..boundaries[end]].to_string())
            .collect()
    }

    fn split_tokens(&self, text: &str, encoding: &CoreBPE) -> Result<Vec<String>, ChunkingError> {
        let tokens = encoding.encode_ordinary(text);
        window_bounds(tokens.len(), self.chunk_size, self.chunk_overlap)
            .map(|(start, end)| {
                encoding
                    .decode(tokens[start..end].to_vec())
                    .map_err(|source| ChunkingError::Tokenizer {
                        encoding: TOKEN_ENCODING.to_string(),
                        source,
                    })
            })
            .collect()
    }
}

/// Half-open `[start, end)` windows over `len` units.
fn window_bounds(
    len: usize,
    chunk_size: usize,
    chunk_overlap: usize,
) -> impl Iterator<Item = (usize, usize)> {
    let stride = chunk_size.saturating_sub(chunk_overlap).max(1);
    (0..len)
        .step_by(stride)
        .map(move |start| (start, (start + chunk_size).min(len)))
}
