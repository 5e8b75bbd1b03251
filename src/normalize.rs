//! Text normalization applied before any text is chunked, scanned, or
//! embedded in a model prompt.
//!
//! [`normalize`] keeps line structure (the structure extractor needs headers
//! at line starts) while [`sanitize_inline`] flattens everything to a single
//! line for prompts, claims and evidence passages.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

/// Line cap used when sanitizing short inline fragments.
pub const DEFAULT_MAX_LINES: usize = 300;

/// Lines that open with a conversational role marker, e.g. `assistant: ...`.
static ROLE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(system|assistant|user)\s*:").unwrap());

/// Normalize raw text.
///
/// Keeps the first `max_lines` lines, applies NFC composition, drops lines
/// that start with a role marker, collapses whitespace runs inside each line
/// to a single space, drops lines left empty, and truncates the result to
/// `max_length` characters.
pub fn normalize(raw: &str, max_lines: usize, max_length: usize) -> String {
    let composed: String = raw.nfc().collect();
    let mut out = String::with_capacity(composed.len().min(max_length));

    for line in composed.lines().take(max_lines) {
        if ROLE_MARKER.is_match(line) {
            continue;
        }
        let collapsed = collapse_whitespace(line);
        if collapsed.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&collapsed);
    }

    truncate_chars(&out, max_length).to_string()
}

/// Normalize bytes that are expected to be UTF-8 text.
///
/// Anything that is not valid UTF-8 yields an empty string.
pub fn normalize_bytes(bytes: &[u8], max_lines: usize, max_length: usize) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => normalize(text, max_lines, max_length),
        Err(_) => String::new(),
    }
}

/// Normalize and flatten a fragment onto one line.
pub fn sanitize_inline(text: &str, max_length: usize) -> String {
    let normalized = normalize(text, DEFAULT_MAX_LINES, usize::MAX);
    let flat = collapse_whitespace(&normalized);
    truncate_chars(&flat, max_length).to_string()
}

/// Replace every whitespace run (newlines included) with one space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Longest prefix of `text` with at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
