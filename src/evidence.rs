//! Evidence linking: retrieve passages for each claim and classify every
//! (claim, passage) pair as supporting, contradicting, or insufficient.
//!
//! Classification is resolved per pair. A model failure on one pair only
//! sends that pair to the keyword heuristic; the rest of the batch is
//! unaffected. Claims keep their input order and evidence keeps retrieval
//! rank order.

use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use crate::config::ModelConfig;
use crate::context::ContextEngine;
use crate::model::{CallOptions, Model};
use crate::models::{Claim, ClaimEvidenceLink, Classification, EvidenceEntry, Provenance};
use crate::normalize::sanitize_inline;
use crate::resolver::{Resolved, Resolver, StageError};

pub const STAGE: &str = "evidence";

/// Longest claim or passage text carried into prompts and results.
const MAX_TEXT_CHARS: usize = 4000;

static CONTRADICTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(no evidence|not significant|contradict|did not|failed to|no effect|inconsistent|reversed|null effect|no difference)\b",
    )
    .unwrap()
});

static SUPPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(significant|support|consistent|increase|decrease|improve|improves|benefit|better|show|reduction|reduced|associate|associated|suggest)\b",
    )
    .unwrap()
});

static LONG_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w{4,}\b").unwrap());

/// Shared long words needed for an overlap-based `supports`.
const MIN_SHARED_TOKENS: usize = 3;

/// A verdict is one word.
const VERDICT_MAX_TOKENS: u32 = 16;

pub struct EvidenceLinker {
    model: Option<Arc<dyn Model>>,
    opts: CallOptions,
}

impl EvidenceLinker {
    pub fn new(model: Option<Arc<dyn Model>>) -> Self {
        Self {
            model,
            opts: call_options(&ModelConfig::default()),
        }
    }

    /// Take the temperature and token budget from `config`. The budget never
    /// exceeds what a one-word verdict needs.
    pub fn with_model_config(mut self, config: &ModelConfig) -> Self {
        self.opts = call_options(config);
        self
    }

    pub fn link(&self, claims: &[Claim], engine: &ContextEngine) -> Vec<ClaimEvidenceLink> {
        self.resolve(claims, engine).value
    }

    /// Link every claim.
    ///
    /// The result counts as model-resolved only when every pair was
    /// classified by the model; otherwise the first fallback reason is kept.
    pub fn resolve(&self, claims: &[Claim], engine: &ContextEngine) -> Resolved<Vec<ClaimEvidenceLink>> {
        let mut first_fallback: Option<StageError> = None;
        let mut pairs = 0usize;

        let links = claims
            .iter()
            .map(|claim| {
                let safe_claim = sanitize_inline(claim, MAX_TEXT_CHARS);
                let evidence = engine
                    .search(&safe_claim)
                    .into_iter()
                    .enumerate()
                    .map(|(rank, hit)| {
                        pairs += 1;
                        let chunk = sanitize_inline(&hit.text, MAX_TEXT_CHARS);
                        let resolved = self.classify(&safe_claim, &chunk);
                        if first_fallback.is_none() {
                            first_fallback = resolved.fallback;
                        }
                        EvidenceEntry {
                            chunk,
                            classification: resolved.value,
                            provenance: Provenance {
                                source: "context".to_string(),
                                chunk_index: hit.chunk_index,
                                rank,
                                retrieval: hit.mode,
                                score: hit.score,
                            },
                        }
                    })
                    .collect();
                ClaimEvidenceLink {
                    claim: claim.clone(),
                    evidence,
                }
            })
            .collect();

        match first_fallback {
            Some(reason) => Resolved::from_heuristic(links, reason),
            None if self.model.is_none() => Resolved::from_heuristic(links, StageError::NoModel),
            None if pairs == 0 => Resolved::from_heuristic(links, StageError::Empty),
            None => Resolved::from_model(links),
        }
    }

    /// Classify one pair, model first.
    pub fn classify(&self, claim: &str, chunk: &str) -> Resolved<Classification> {
        let resolver = Resolver::new(STAGE, self.model.as_deref());

        resolver.resolve(
            &self.opts,
            || {
                format!(
                    "Classify if the Evidence supports, contradicts, or is insufficient for the Claim.\n\
                     Return ONE word: supports / contradicts / insufficient.\n\n\
                     Claim: {}\nEvidence: {}",
                    claim, chunk
                )
            },
            parse_verdict,
            || classify_heuristic(claim, chunk),
        )
    }
}

fn call_options(config: &ModelConfig) -> CallOptions {
    CallOptions::from_config(STAGE, config).cap_output_tokens(VERDICT_MAX_TOKENS)
}

fn parse_verdict(reply: &str) -> Result<Classification, StageError> {
    let text = reply.trim().to_lowercase();
    if text.is_empty() {
        return Err(StageError::Empty);
    }
    Ok(if text.contains("contrad") {
        Classification::Contradicts
    } else if text.contains("support") {
        Classification::Supports
    } else {
        Classification::Insufficient
    })
}

/// Keyword classification of a passage against a claim.
///
/// Contradiction keywords win over support keywords, which win over plain
/// word overlap. An empty claim or passage is `insufficient`.
pub fn classify_heuristic(claim: &str, chunk: &str) -> Classification {
    if claim.trim().is_empty() || chunk.trim().is_empty() {
        return Classification::Insufficient;
    }
    if CONTRADICTION.is_match(chunk) {
        return Classification::Contradicts;
    }
    if SUPPORT.is_match(chunk) {
        return Classification::Supports;
    }

    let claim_tokens = long_words(claim);
    let chunk_tokens = long_words(chunk);
    if claim_tokens.intersection(&chunk_tokens).count() >= MIN_SHARED_TOKENS {
        Classification::Supports
    } else {
        Classification::Insufficient
    }
}

fn long_words(text: &str) -> HashSet<String> {
    let lower = text.to_lowercase();
    LONG_WORD
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}
