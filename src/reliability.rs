//! Reliability scoring.
//!
//! The heuristic score is built from fixed rules, each of which appends one
//! entry to the explanation trail:
//!
//! | Rule                                     | Points    |
//! |------------------------------------------|-----------|
//! | Methods section non-empty                | +30       |
//! | Results section non-empty                | +20       |
//! | Claims with supporting evidence          | up to +30 |
//! | Any claim with contradicting evidence    | -20       |
//! | Title over 5 and abstract over 50 chars  | +10       |
//!
//! The alignment bonus is `30 * supporting / claims` rounded half up; with no
//! claims it is 0. The total is clamped to `0..=100`. The score and trail are
//! a pure function of the inputs.

use serde::Deserialize;
use std::sync::Arc;

use crate::config::ModelConfig;
use crate::model::{CallOptions, Model};
use crate::models::{Claim, ClaimEvidenceLink, Classification, ReliabilityResult, StructuredDocument};
use crate::normalize::{collapse_whitespace, truncate_chars};
use crate::resolver::{parse_payload, Resolved, Resolver, StageError};

pub const STAGE: &str = "reliability";

const MAX_ALIGNMENT_BONUS: usize = 30;

const SCORE_MAX_TOKENS: u32 = 350;

#[derive(Debug, Deserialize)]
struct ScorePayload {
    score: f64,
    #[serde(default)]
    explanation: String,
}

pub struct ReliabilityScorer {
    model: Option<Arc<dyn Model>>,
    opts: CallOptions,
}

impl ReliabilityScorer {
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

    pub fn score(
        &self,
        doc: &StructuredDocument,
        claims: &[Claim],
        links: &[ClaimEvidenceLink],
    ) -> ReliabilityResult {
        self.resolve(doc, claims, links).value
    }

    pub fn resolve(
        &self,
        doc: &StructuredDocument,
        claims: &[Claim],
        links: &[ClaimEvidenceLink],
    ) -> Resolved<ReliabilityResult> {
        let resolver = Resolver::new(STAGE, self.model.as_deref());

        resolver.resolve(
            &self.opts,
            || build_prompt(doc, links),
            parse_score,
            || score_heuristic(doc, claims, links),
        )
    }
}

fn call_options(config: &ModelConfig) -> CallOptions {
    CallOptions::from_config(STAGE, config).cap_output_tokens(SCORE_MAX_TOKENS)
}

fn build_prompt(doc: &StructuredDocument, links: &[ClaimEvidenceLink]) -> String {
    let summary = serde_json::json!({
        "title": truncate_chars(&doc.title, 300),
        "abstract": truncate_chars(&doc.abstract_text, 800),
        "methods": truncate_chars(&doc.methods, 800),
        "results": truncate_chars(&doc.results, 800),
    });
    let alignment: Vec<serde_json::Value> = links
        .iter()
        .map(|link| {
            serde_json::json!({
                "claim": truncate_chars(&link.claim, 200),
                "evidence_count": link.evidence.len(),
                "top_classification": link
                    .evidence
                    .first()
                    .map_or("none", |e| e.classification.as_str()),
            })
        })
        .collect();

    format!(
        "Evaluate the reliability of the scientific document. \
         Provide a score (0-100) and a short explanation. \
         Return STRICT JSON ONLY: {{\"score\": NUMBER, \"explanation\": \"text\"}}\n\
         Structured summary: {}\nClaims alignment data: {}",
        summary,
        serde_json::Value::Array(alignment)
    )
}

fn parse_score(reply: &str) -> Result<ReliabilityResult, StageError> {
    let payload: ScorePayload = parse_payload(reply)?;
    if !payload.score.is_finite() {
        return Err(StageError::Parse(format!("score is not finite: {}", payload.score)));
    }
    Ok(ReliabilityResult {
        score: payload.score.round().clamp(0.0, 100.0) as u8,
        explanation: payload.explanation.trim().to_string(),
    })
}

/// Deterministic rule-based score.
pub fn score_heuristic(
    doc: &StructuredDocument,
    claims: &[Claim],
    links: &[ClaimEvidenceLink],
) -> ReliabilityResult {
    let mut score: i32 = 0;
    let mut trail: Vec<String> = Vec::with_capacity(5);

    if doc.methods.trim().is_empty() {
        trail.push("Methods section missing (0)".to_string());
    } else {
        score += 30;
        trail.push("Methods section present (+30)".to_string());
    }

    if doc.results.trim().is_empty() {
        trail.push("Results section missing (0)".to_string());
    } else {
        score += 20;
        trail.push("Results section present (+20)".to_string());
    }

    let total = claims.len();
    let supporting = links.iter().filter(|l| l.has(Classification::Supports)).count();
    let bonus = alignment_bonus(supporting, total);
    score += bonus as i32;
    trail.push(format!(
        "Claim-evidence alignment: {}/{} (+{})",
        supporting,
        total.max(1),
        bonus
    ));

    if links.iter().any(|l| l.has(Classification::Contradicts)) {
        score -= 20;
        trail.push("Contradictory evidence found (-20)".to_string());
    }

    let title_len = collapse_whitespace(&doc.title).chars().count();
    let abstract_len = collapse_whitespace(&doc.abstract_text).chars().count();
    if title_len > 5 && abstract_len > 50 {
        score += 10;
        trail.push("Title + abstract adequate (+10)".to_string());
    } else {
        trail.push("Title/abstract insufficient (0)".to_string());
    }

    ReliabilityResult {
        score: score.clamp(0, 100) as u8,
        explanation: trail.join("; "),
    }
}

/// `round(30 * supporting / total)` with halves rounded up; 0 when `total`
/// is 0. `supporting` is capped at `total`.
pub fn alignment_bonus(supporting: usize, total: usize) -> usize {
    if total == 0 {
        return 0;
    }
    let supporting = supporting.min(total);
    (2 * MAX_ALIGNMENT_BONUS * supporting + total) / (2 * total)
}
