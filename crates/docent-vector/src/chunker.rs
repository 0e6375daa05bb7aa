//! Word-window text chunker.
//!
//! Splits text on Unicode whitespace and emits overlapping windows of
//! `chunk_size` words, advancing by `chunk_size - chunk_overlap` each step.
//! Output is fully determined by the input text and the configuration.

use serde::{Deserialize, Serialize};

/// Words per chunk when the configured size is not positive.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// A chunk produced by [`Chunker::chunk_with_positions`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPiece {
    /// Zero-based position of this chunk in the output sequence.
    pub index: usize,
    /// The chunk's words joined by single spaces.
    pub content: String,
    /// Index of the first word covered (inclusive).
    pub word_start: usize,
    /// Index one past the last word covered.
    pub word_end: usize,
}

/// Overlapping word-window chunker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// Build a chunker, normalising out-of-range settings.
    ///
    /// A non-positive `chunk_size` becomes [`DEFAULT_CHUNK_SIZE`]. A negative
    /// overlap becomes 0, and an overlap that is not smaller than the chunk
    /// size is clamped to a quarter of it.
    pub fn new(chunk_size: i64, chunk_overlap: i64) -> Self {
        let chunk_size = if chunk_size <= 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size as usize
        };
        let chunk_overlap = if chunk_overlap < 0 {
            0
        } else if chunk_overlap as usize >= chunk_size {
            chunk_size / 4
        } else {
            chunk_overlap as usize
        };

        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Number of words the window advances per chunk (at least 1).
    pub fn step(&self) -> usize {
        self.chunk_size.saturating_sub(self.chunk_overlap).max(1)
    }

    /// Split `text` into chunk strings.
    ///
    /// Empty or whitespace-only input yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        self.chunk_with_positions(text)
            .into_iter()
            .map(|piece| piece.content)
            .collect()
    }

    /// Split `text` into chunks annotated with their index and word range.
    pub fn chunk_with_positions(&self, text: &str) -> Vec<ChunkPiece> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let total = words.len();
        let step = self.step();

        let mut pieces = Vec::new();
        let mut start = 0;
        while start < total {
            let end = (start + self.chunk_size).min(total);
            pieces.push(ChunkPiece {
                index: pieces.len(),
                content: words[start..end].join(" "),
                word_start: start,
                word_end: end,
            });
            if end == total {
                break;
            }
            start += step;
        }
        pieces
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE as i64, 50)
    }
}
