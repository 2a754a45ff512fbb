//! Boundary-aware text chunking.
//!
//! Long documents are split greedily from the front. Each split point prefers
//! a paragraph break, then a sentence end, inside the last 40% of the window,
//! and falls back to a hard cut. Consecutive chunks overlap so the model keeps
//! some context across the boundary.
//!
//! All positions are character offsets, not byte offsets.

use serde::{Deserialize, Serialize};

use crate::config::GenerationSettings;

/// Fraction of the window, measured from its start, before which no boundary is searched.
const BOUNDARY_SEARCH_START: f64 = 0.6;

/// A contiguous piece of the source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in the chunk sequence
    pub index: usize,
    /// Character offset where the chunk starts
    pub start: usize,
    /// Character offset one past the chunk's last character
    pub end: usize,
    pub text: String,
}

/// Splits documents into overlapping chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    threshold: usize,
    max_chunk_size: usize,
    overlap: usize,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(6_000, 6_000, 500)
    }
}

impl TextChunker {
    /// Create a chunker.
    ///
    /// `max_chunk_size` is clamped to at least 1 so splitting always advances.
    pub fn new(threshold: usize, max_chunk_size: usize, overlap: usize) -> Self {
        Self {
            threshold,
            max_chunk_size: max_chunk_size.max(1),
            overlap,
        }
    }

    pub fn from_settings(settings: &GenerationSettings) -> Self {
        Self::new(
            settings.chunk_threshold,
            settings.max_chunk_size,
            settings.chunk_overlap,
        )
    }

    /// Whether a text is long enough to need chunking.
    pub fn needs_chunking(&self, text: &str) -> bool {
        text.chars().count() > self.threshold
    }

    /// Split text into chunks.
    ///
    /// Empty text yields no chunks; text at or below the threshold yields one
    /// chunk holding the whole input.
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();

        if len == 0 {
            return Vec::new();
        }
        if len <= self.threshold {
            return vec![Chunk {
                index: 0,
                start: 0,
                end: len,
                text: text.to_string(),
            }];
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let end = self.split_point(&chars, start);
            chunks.push(Chunk {
                index: chunks.len(),
                start,
                end,
                text: chars[start..end].iter().collect(),
            });

            if end >= len {
                break;
            }

            // Step back by the overlap, but never to or behind the current start.
            let next = end.saturating_sub(self.overlap);
            start = if next > start { next } else { end };
        }

        tracing::debug!(
            chars = len,
            chunk_count = chunks.len(),
            "Split document into chunks"
        );

        chunks
    }

    /// Choose where the chunk starting at `start` ends.
    ///
    /// Always returns a position strictly after `start`.
    fn split_point(&self, chars: &[char], start: usize) -> usize {
        let end = (start + self.max_chunk_size).min(chars.len());
        if end == chars.len() {
            return end;
        }

        let window = end - start;
        let search_from = start + ((window as f64) * BOUNDARY_SEARCH_START) as usize;

        if let Some(pos) = find_paragraph_break(chars, search_from, end) {
            return pos;
        }
        if let Some(pos) = find_sentence_end(chars, search_from, end) {
            return pos;
        }
        end
    }
}

/// Position just after the last `\n\n` lying entirely within `[from, end)`.
fn find_paragraph_break(chars: &[char], from: usize, end: usize) -> Option<usize> {
    (from..end.saturating_sub(1))
        .rev()
        .find(|&i| chars[i] == '\n' && chars[i + 1] == '\n')
        .map(|i| i + 2)
}

/// Position just after the last `.`, `!` or `?` in `[from, end)` that is
/// followed by whitespace or the end of the text.
fn find_sentence_end(chars: &[char], from: usize, end: usize) -> Option<usize> {
    (from..end)
        .rev()
        .find(|&i| {
            matches!(chars[i], '.' | '!' | '?')
                && chars.get(i + 1).map_or(true, |c| c.is_whitespace())
        })
        .map(|i| i + 1)
}
