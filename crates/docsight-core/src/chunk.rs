//! Fixed word-count text chunker.
//!
//! Splits page text into [`Chunk`]s of at most `chunk_size` whitespace-delimited
//! words. Chunks are consecutive and non-overlapping, rejoined with single
//! spaces. There is no sentence-boundary awareness: a chunk may end
//! mid-sentence.
//!
//! # Algorithm
//!
//! 1. Split the text on any run of whitespace.
//! 2. Take consecutive groups of `chunk_size` words.
//! 3. Join each group with a single space.
//! 4. The final group holds the `r` leftover words when the count is not a
//!    multiple of `chunk_size`.
//!
//! Empty (or whitespace-only) text yields no chunks.
//!
//! # Example
//!
//! ```rust
//! use docsight_core::chunk::split_text;
//!
//! let parts = split_text("one two three four five", 2);
//! assert_eq!(parts, vec!["one two", "three four", "five"]);
//! ```

use crate::models::Chunk;

/// Default words per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 400;

/// Split text into consecutive groups of `chunk_size` words.
///
/// A `chunk_size` of zero is treated as one word per chunk.
pub fn split_text(text: &str, chunk_size: usize) -> Vec<String> {
    let size = chunk_size.max(1);
    let words: Vec<&str> = text.split_whitespace().collect();
    words.chunks(size).map(|group| group.join(" ")).collect()
}

/// Chunk one page of a document, tagging each piece with its provenance.
pub fn chunk_page(
    text: &str,
    role: &str,
    source_document: &str,
    page_number: u32,
    chunk_size: usize,
) -> Vec<Chunk> {
    split_text(text, chunk_size)
        .into_iter()
        .map(|text| Chunk {
            text,
            role: role.to_string(),
            source_document: source_document.to_string(),
            page_number,
        })
        .collect()
}
