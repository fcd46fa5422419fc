//! This module splits extracted document text into fixed-size, overlapping
//! windows that serve as the unit of retrieval.
//!
//! Unlike delimiter-driven splitting, windows are cut purely by position: every
//! window holds up to `chunk_size` characters and starts `chunk_size - overlap`
//! characters after its predecessor. The overlap keeps sentences that straddle
//! a boundary visible in at least one window.
//!
//! The module defines two main items:
//! - [`WindowChunker`]: validated chunking parameters and the chunking routine.
//! - [`TextChunk`]: one window together with its character offsets.
//!
//! Offsets are counted in Unicode scalar values (`char`s), never bytes, so a
//! window never cuts through a multi-byte character.
//!
//! # Example
//!
//! ```
//! use finlens_context::window::WindowChunker;
//!
//! let chunker = WindowChunker::new(10, 3).unwrap();
//! let chunks = chunker.chunk("abcdefghijklmnopqrstuvwxyz");
//!
//! let starts: Vec<usize> = chunks.iter().map(|c| c.start).collect();
//! assert_eq!(starts, vec![0, 7, 14, 21]);
//! assert_eq!(chunks[0].text, "abcdefghij");
//! assert_eq!(chunks[1].text, "hijklmnopq");
//! // The final window is shorter than chunk_size
//! assert_eq!(chunks[3].text, "vwxyz");
//! ```
use serde::Serialize;

/// Default window length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 2000;

/// Default number of characters shared by consecutive windows.
pub const DEFAULT_OVERLAP: usize = 200;

/// Errors raised when chunking parameters cannot make progress.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    /// A zero-length window can never cover any text
    #[error("chunk_size must be greater than zero")]
    ZeroChunkSize,

    /// The stride `chunk_size - overlap` would be zero or negative
    #[error("overlap ({overlap}) must be smaller than chunk_size ({chunk_size})")]
    InvalidStride { chunk_size: usize, overlap: usize },
}

/// A single window of document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    /// Position of this window in the chunk sequence (0-indexed).
    pub sequence: usize,
    /// Character offset of the first character of the window.
    pub start: usize,
    /// Character offset one past the last character of the window.
    pub end: usize,
    /// The window's text.
    pub text: String,
}

impl TextChunk {
    /// Number of characters in this window.
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

/// Splits text into overlapping fixed-size character windows.
///
/// Construction validates the parameters, so a `WindowChunker` always has a
/// positive stride and chunking always terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowChunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for WindowChunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl WindowChunker {
    /// Creates a chunker, rejecting parameters whose stride is not positive.
    ///
    /// # Errors
    ///
    /// * [`ChunkError::ZeroChunkSize`] if `chunk_size` is zero
    /// * [`ChunkError::InvalidStride`] if `overlap >= chunk_size`
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkError> {
        if chunk_size == 0 {
            return Err(ChunkError::ZeroChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkError::InvalidStride {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between the start offsets of consecutive windows.
    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }

    /// Splits `text` into windows.
    ///
    /// Starting at offset 0, emits up to `chunk_size` characters, advances the
    /// start by [`stride`](Self::stride) and repeats until the start offset
    /// reaches the text length. Empty input yields no windows.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        // Byte offset of every char, plus the end of the string, so that
        // char offsets can be turned into slice bounds.
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_len = boundaries.len() - 1;

        (0..char_len)
            .step_by(self.stride())
            .enumerate()
            .map(|(sequence, start)| {
                let end = (start + self.chunk_size).min(char_len);
                TextChunk {
                    sequence,
                    start,
                    end,
                    text: text[boundaries[start]..boundaries[end]].to_string(),
                }
            })
            .collect()
    }

    /// Like [`chunk`](Self::chunk) but returns only the window texts.
    pub fn chunk_texts(&self, text: &str) -> Vec<String> {
        self.chunk(text).into_iter().map(|c| c.text).collect()
    }
}

/// Splits `text` into overlapping windows in one call.
///
/// ```
/// use finlens_context::chunk_text;
///
/// let chunks = chunk_text("hello world", 5, 1).unwrap();
/// assert_eq!(chunks, vec!["hello", "o wor", "rld"]);
///
/// // A non-positive stride is rejected instead of looping forever
/// assert!(chunk_text("hello", 5, 5).is_err());
/// ```
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>, ChunkError> {
    Ok(WindowChunker::new(chunk_size, overlap)?.chunk_texts(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_text(len: usize) -> String {
        (0..len)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect()
    }

    #[test]
    fn test_default_parameters() {
        let chunker = WindowChunker::default();
        assert_eq!(chunker.chunk_size(), 2000);
        assert_eq!(chunker.overlap(), 200);
        assert_eq!(chunker.stride(), 1800);
    }

    #[test]
    fn test_five_thousand_chars_give_three_windows() {
        let text = sample_text(5000);
        let chunks = WindowChunker::default().chunk(&text);

        let starts: Vec<usize> = chunks.iter().map(|c| c.start).collect();
        assert_eq!(starts, vec![0, 1800, 3600]);
        assert_eq!(chunks[0].char_len(), 2000);
        assert_eq!(chunks[1].char_len(), 2000);
        assert_eq!(chunks[2].char_len(), 1400);
        assert_eq!(chunks[2].end, 5000);
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(WindowChunker::default().chunk("").is_empty());
    }

    #[test]
    fn test_invalid_parameters_fail_fast() {
        assert_eq!(WindowChunker::new(0, 0), Err(ChunkError::ZeroChunkSize));
        assert_eq!(
            WindowChunker::new(100, 100),
            Err(ChunkError::InvalidStride {
                chunk_size: 100,
                overlap: 100
            })
        );
        assert!(WindowChunker::new(100, 250).is_err());
        assert!(WindowChunker::new(1, 0).is_ok());
    }

    #[test]
    fn test_every_character_is_covered() {
        for (len, size, overlap) in [(1, 1, 0), (37, 10, 3), (100, 7, 6), (2001, 2000, 200)] {
            let text = sample_text(len);
            let chunks = WindowChunker::new(size, overlap).unwrap().chunk(&text);

            let mut covered = vec![false; len];
            for chunk in &chunks {
                for slot in &mut covered[chunk.start..chunk.end] {
                    *slot = true;
                }
            }
            assert!(covered.iter().all(|&c| c), "gap for ({len}, {size}, {overlap})");

            // Start offsets strictly increase
            assert!(chunks.windows(2).all(|w| w[0].start < w[1].start));
        }
    }

    #[test]
    fn test_consecutive_windows_share_overlap() {
        let text = sample_text(1000);
        let chunker = WindowChunker::new(120, 30).unwrap();
        let chunks = chunker.chunk(&text);

        for pair in chunks.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            assert_eq!(next.start, prev.start + chunker.stride());

            let shared = prev.end.saturating_sub(next.start);
            assert_eq!(shared, 30.min(next.char_len()));

            let prev_tail: String = prev.text.chars().skip(prev.char_len() - shared).collect();
            let next_head: String = next.text.chars().take(shared).collect();
            assert_eq!(prev_tail, next_head);
        }
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let text = sample_text(4321);
        let chunker = WindowChunker::new(500, 50).unwrap();
        assert_eq!(chunker.chunk(&text), chunker.chunk(&text));
    }

    #[test]
    fn test_multibyte_characters_are_not_split() {
        let text = "€".repeat(25);
        let chunks = WindowChunker::new(10, 2).unwrap().chunk(&text);

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].text, "€".repeat(10));
        assert_eq!(chunks[1].start, 8);
        assert_eq!(chunks[2].text, "€".repeat(9));
        assert_eq!(chunks[3].text, "€");
    }

    #[test]
    fn test_sequence_numbers_follow_order() {
        let chunks = WindowChunker::new(4, 1).unwrap().chunk("0123456789");
        let sequences: Vec<usize> = chunks.iter().map(|c| c.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);
        assert_eq!(chunks[2].text, "6789");
        // The last start offset is still inside the text, so a one-char tail is emitted
        assert_eq!(chunks[3].text, "9");
    }
}
