//! Claim extraction.
//!
//! The heuristic scans sentences for finding-indicative keywords. It first
//! reads only the results, conclusion and abstract sections; when those
//! yield nothing it scans the full text. Output keeps first-occurrence order,
//! has no exact duplicates, and holds at most [`MAX_CLAIMS`] claims.

use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use crate::config::ModelConfig;
use crate::model::{CallOptions, Model};
use crate::models::{Claim, StructuredDocument};
use crate::normalize::{collapse_whitespace, normalize};
use crate::resolver::{parse_payload, Resolved, Resolver, StageError};

pub const STAGE: &str = "claims";

pub const MAX_CLAIMS: usize = 10;

/// Exclusive bounds on a heuristic claim's length, in characters.
const MIN_CLAIM_CHARS: usize = 20;
const MAX_CLAIM_CHARS: usize = 500;

/// Lines scanned per pass.
const SCAN_MAX_LINES: usize = 1000;

static FINDING_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(show|suggest|found|observ\w*|demonstrat\w*|increas\w*|decreas\w*|significan\w*|result|conclud\w*)\b",
    )
    .unwrap()
});

/// Accepts both `{"claims": [...]}` and a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClaimsPayload {
    Wrapped { claims: Vec<String> },
    Bare(Vec<String>),
}

pub struct ClaimExtractor {
    model: Option<Arc<dyn Model>>,
    opts: CallOptions,
}

impl ClaimExtractor {
    pub fn new(model: Option<Arc<dyn Model>>) -> Self {
        Self {
            model,
            opts: call_options(&ModelConfig::default()),
        }
    }

    pub fn with_model_config(mut self, config: &ModelConfig) -> Self {
        self.opts = call_options(config);
        self
    }

    pub fn extract(&self, doc: &StructuredDocument) -> Vec<Claim> {
        self.resolve(doc).value
    }

    pub fn resolve(&self, doc: &StructuredDocument) -> Resolved<Vec<Claim>> {
        let resolver = Resolver::new(STAGE, self.model.as_deref());

        resolver.resolve(
            &self.opts,
            || {
                let sections = serde_json::json!({
                    "title": doc.title,
                    "abstract": doc.abstract_text,
                    "methods": doc.methods,
                    "results": doc.results,
                    "conclusion": doc.conclusion,
                });
                format!(
                    "Extract 3-5 core scientific claims from this data. \
                     Return STRICT JSON: {{\"claims\": [\"string\"]}}\nData: {}",
                    sections
                )
            },
            parse_claims,
            || extract_heuristic(doc),
        )
    }
}

fn call_options(config: &ModelConfig) -> CallOptions {
    CallOptions::from_config(STAGE, config)
}

fn parse_claims(reply: &str) -> Result<Vec<Claim>, StageError> {
    let raw = match parse_payload::<ClaimsPayload>(reply)? {
        ClaimsPayload::Wrapped { claims } | ClaimsPayload::Bare(claims) => claims,
    };
    let claims = dedup_capped(raw.iter().map(|c| collapse_whitespace(c)));
    if claims.is_empty() {
        return Err(StageError::Empty);
    }
    Ok(claims)
}

/// Two-tier sentence scan over the structured sections, then the full text.
pub fn extract_heuristic(doc: &StructuredDocument) -> Vec<Claim> {
    let priority = format!("{} {} {}", doc.results, doc.conclusion, doc.abstract_text);
    let claims = scan_claims(&priority);
    if !claims.is_empty() {
        return claims;
    }
    scan_claims(&doc.full_text)
}

/// Keyword-bearing sentences of `text` within the length bounds.
pub fn scan_claims(text: &str) -> Vec<Claim> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let clean = collapse_whitespace(&normalize(text, SCAN_MAX_LINES, usize::MAX));

    dedup_capped(
        split_sentences(&clean)
            .into_iter()
            .map(str::trim)
            .filter(|s| {
                let len = s.chars().count();
                len > MIN_CLAIM_CHARS && len < MAX_CLAIM_CHARS && FINDING_KEYWORD.is_match(s)
            })
            .map(str::to_string),
    )
}

/// Split after `.`, `?` or `!` when followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut prev_terminal = false;

    for (i, c) in text.char_indices() {
        if prev_terminal && c.is_whitespace() {
            sentences.push(&text[start..i]);
            start = i;
        }
        prev_terminal = matches!(c, '.' | '?' | '!');
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

fn dedup_capped(items: impl Iterator<Item = String>) -> Vec<Claim> {
    let mut seen = HashSet::new();
    items
        .filter(|c| !c.is_empty())
        .filter(|c| seen.insert(c.clone()))
        .take(MAX_CLAIMS)
        .collect()
}
