//! Structure extraction: split document text into the fixed sections.
//!
//! The heuristic takes the first non-empty line as the title and then cuts
//! the text at section-header words found at line starts (`Abstract`,
//! `Method(s)`, `Result(s)`, `Conclusion(s)`, `Discussion`, optionally
//! numbered like `2.` or `3.1`). Everything between two headers is appended
//! to the section named by the first one, so repeated headers accumulate.
//! Text with no recognizable header lands in `abstract` (first 5000
//! characters) rather than disappearing.

use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};

use crate::config::ModelConfig;
use crate::model::{CallOptions, Model};
use crate::models::StructuredDocument;
use crate::normalize::truncate_chars;
use crate::resolver::{parse_payload, Resolved, Resolver, StageError};

pub const STAGE: &str = "structure";

const TITLE_MAX_CHARS: usize = 200;
const UNSTRUCTURED_ABSTRACT_CHARS: usize = 5000;

static SECTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?mi)^[ \t]*(?:\d+(?:\.\d+)*\.?[ \t]+)?(abstract|methods?|results?|conclusions?|discussion)\b",
    )
    .unwrap()
});

/// Section fields a model may return. Absent keys keep their defaults.
#[derive(Debug, Deserialize)]
struct StructurePayload {
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    methods: Option<String>,
    results: Option<String>,
    conclusion: Option<String>,
}

pub struct StructureExtractor {
    model: Option<Arc<dyn Model>>,
    opts: CallOptions,
    prompt_chars: usize,
}

impl StructureExtractor {
    pub fn new(model: Option<Arc<dyn Model>>, prompt_chars: usize) -> Self {
        Self {
            model,
            prompt_chars,
            opts: call_options(&ModelConfig::default()),
        }
    }

    /// Take the token budget and temperature from `config`.
    pub fn with_model_config(mut self, config: &ModelConfig) -> Self {
        self.opts = call_options(config);
        self
    }

    pub fn extract(&self, text: &str) -> StructuredDocument {
        self.resolve(text).value
    }

    pub fn resolve(&self, text: &str) -> Resolved<StructuredDocument> {
        let resolver = Resolver::new(STAGE, self.model.as_deref());

        resolver.resolve(
            &self.opts,
            || {
                format!(
                    "Extract structure from this text. Return STRICT JSON.\n\
                     Keys: title, abstract, methods, results, conclusion.\n\
                     If a section is missing, leave it an empty string.\n\n\
                     Text: {}",
                    truncate_chars(text, self.prompt_chars)
                )
            },
            |reply| merge_payload(reply, text),
            || extract_heuristic(text),
        )
    }
}

fn call_options(config: &ModelConfig) -> CallOptions {
    CallOptions::from_config(STAGE, config)
}

fn merge_payload(reply: &str, text: &str) -> Result<StructuredDocument, StageError> {
    let payload: StructurePayload = parse_payload(reply)?;
    let mut doc = StructuredDocument::with_full_text(text);

    for (slot, value) in [
        (&mut doc.title, payload.title),
        (&mut doc.abstract_text, payload.abstract_text),
        (&mut doc.methods, payload.methods),
        (&mut doc.results, payload.results),
        (&mut doc.conclusion, payload.conclusion),
    ] {
        if let Some(v) = value {
            *slot = v.trim().to_string();
        }
    }

    if doc.is_blank() {
        return Err(StageError::Empty);
    }
    Ok(doc)
}

/// Deterministic header-based section split.
pub fn extract_heuristic(text: &str) -> StructuredDocument {
    let mut doc = StructuredDocument::with_full_text(text);

    if let Some(first) = text.lines().map(str::trim).find(|l| !l.is_empty()) {
        doc.title = truncate_chars(first, TITLE_MAX_CHARS).to_string();
    }

    let headers: Vec<(usize, usize, &'static str)> = SECTION_HEADER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let key = section_key(caps.get(1)?.as_str());
            Some((whole.start(), whole.end(), key))
        })
        .collect();

    if headers.is_empty() {
        doc.abstract_text = truncate_chars(text.trim(), UNSTRUCTURED_ABSTRACT_CHARS).to_string();
        return doc;
    }

    for (i, &(_, content_start, key)) in headers.iter().enumerate() {
        let content_end = headers.get(i + 1).map_or(text.len(), |next| next.0);
        let content = text[content_start..content_end]
            .trim_start_matches(|c: char| c == ':' || c == '-' || c == '.' || c.is_whitespace())
            .trim_end();
        if content.is_empty() {
            continue;
        }
        if let Some(slot) = doc.section_mut(key) {
            if !slot.is_empty() {
                slot.push('\n');
            }
            slot.push_str(content);
        }
    }

    doc
}

fn section_key(header: &str) -> &'static str {
    let lower = header.to_lowercase();
    if lower.starts_with("abstract") {
        "abstract"
    } else if lower.starts_with("method") {
        "methods"
    } else if lower.starts_with("result") {
        "results"
    } else {
        "conclusion"
    }
}
