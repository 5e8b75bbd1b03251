//! Fixed-window text chunker.
//!
//! Splits normalized text into overlapping windows of `size` characters,
//! advancing by `size - overlap` each step. Windows are measured in
//! characters, not bytes, so multi-byte text never splits inside a code
//! point. Each window is trimmed; windows that are blank after trimming are
//! dropped.
//!
//! Chunking is a pure function of its inputs: the same text and settings
//! always produce the same boundaries and hashes.

use sha2::{Digest, Sha256};

use crate::models::Chunk;

/// Split `text` into overlapping windows.
///
/// `first_index` is the index given to the first produced chunk, so chunks
/// from successive ingests keep contiguous indices.
pub fn chunk_text(text: &str, first_index: usize, size: usize, overlap: usize) -> Vec<Chunk> {
    if text.is_empty() || size == 0 {
        return Vec::new();
    }

    let step = size.saturating_sub(overlap).max(1);
    let offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let n = offsets.len();

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < n {
        let end = (start + size).min(n);
        let byte_start = offsets[start];
        let byte_end = if end == n { text.len() } else { offsets[end] };
        let window = &text[byte_start..byte_end];

        let trimmed = window.trim();
        if !trimmed.is_empty() {
            let lead = window.chars().take_while(|c| c.is_whitespace()).count();
            chunks.push(make_chunk(first_index + chunks.len(), start + lead, trimmed));
        }

        // The window that reaches the end covers the tail; another step would
        // only repeat its suffix.
        if end == n {
            break;
        }
        start += step;
    }

    chunks
}

fn make_chunk(index: usize, start: usize, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        index,
        start,
        text: text.to_string(),
        hash,
    }
}
