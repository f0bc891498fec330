
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::extract::Document;

/// Configuration for splitting document text into overlapping chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Number of characters shared between consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Metadata attached to every chunk, inherited from its document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Origin identifier: URL, filename, or "manual"
    pub source: String,
    /// Page number for paginated sources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    /// Sequence index of this chunk within its document
    pub seq: usize,
}

/// A bounded, overlapping segment of document text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Lazy iterator over the chunks of a single document.
///
/// Restartable: calling [`chunk_document`] again produces an identical
/// sequence. The window advances by `chunk_size - chunk_overlap` characters,
/// so consecutive chunks share exactly `chunk_overlap` characters and the
/// final chunk ends at the end of the text.
pub struct Chunks<'a> {
    chars: Vec<char>,
    pos: usize,
    seq: usize,
    config: ChunkingConfig,
    source: &'a str,
    page: Option<i64>,
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.pos >= self.chars.len() {
            return None;
        }

        let end = (self.pos + self.config.chunk_size).min(self.chars.len());
        let content: String = self.chars[self.pos..end].iter().collect();

        let chunk = Chunk {
            content,
            metadata: ChunkMetadata {
                source: self.source.to_string(),
                page: self.page,
                seq: self.seq,
            },
        };

        self.seq += 1;
        self.pos = if end == self.chars.len() {
            self.chars.len()
        } else {
            end - self.config.chunk_overlap
        };

        Some(chunk)
    }
}

/// Split a document into overlapping chunks.
///
/// The configuration contract `chunk_overlap < chunk_size` is validated at
/// configuration time ([`crate::config::Config::validate`]); it guarantees the
/// window always advances.
#[inline]
pub fn chunk_document<'a>(document: &'a Document, config: &ChunkingConfig) -> Chunks<'a> {
    debug_assert!(config.chunk_overlap < config.chunk_size);

    Chunks {
        chars: document.text.chars().collect(),
        pos: 0,
        seq: 0,
        config: *config,
        source: &document.source,
        page: document.page,
    }
}

/// Partition chunks into the minimum number of contiguous batches of size
/// at most `max_batch_size`, preserving order. Pure; dispatch of each batch
/// is the caller's concern.
#[inline]
pub fn batch_chunks(chunks: Vec<Chunk>, max_batch_size: usize) -> Vec<Vec<Chunk>> {
    debug_assert!(max_batch_size > 0);

    let batches: Vec<Vec<Chunk>> = chunks
        .chunks(max_batch_size)
        .map(<[Chunk]>::to_vec)
        .collect();

    debug!(
        "Partitioned {} chunks into {} batches (max {})",
        batches.iter().map(Vec::len).sum::<usize>(),
        batches.len(),
        max_batch_size
    );

    batches
}
