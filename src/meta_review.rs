//! Final report composition.
//!
//! The summary fields always start from fixed defaults. A model reply may
//! replace any of them, but a failed or empty reply leaves all three
//! untouched.

use serde::Deserialize;
use std::sync::Arc;

use crate::config::ModelConfig;
use crate::model::{CallOptions, Model};
use crate::models::{Claim, ClaimEvidenceLink, ReliabilityResult, ReviewResult, StageReport, StructuredDocument};
use crate::resolver::{parse_payload, Resolved, Resolver, StageError};

pub const STAGE: &str = "meta_review";

pub const DEFAULT_SUMMARY: &str = "Automated Review: Analysis complete.";
pub const DEFAULT_LIMITATIONS: &str = "None detected.";
pub const DEFAULT_RECOMMENDATION: &str = "Review manually.";

/// Claims quoted in the prompt.
const PROMPT_CLAIMS: usize = 5;

/// The prose part of a review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewText {
    pub executive_summary: String,
    pub limitations: String,
    pub recommendation: String,
}

impl Default for ReviewText {
    fn default() -> Self {
        Self {
            executive_summary: DEFAULT_SUMMARY.to_string(),
            limitations: DEFAULT_LIMITATIONS.to_string(),
            recommendation: DEFAULT_RECOMMENDATION.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReviewPayload {
    executive_summary: Option<String>,
    limitations: Option<String>,
    recommendation: Option<String>,
}

/// Everything the earlier stages produced for one run.
pub struct StageOutputs<'a> {
    pub session_id: &'a str,
    pub structured: &'a StructuredDocument,
    pub claims: &'a [Claim],
    pub links: &'a [ClaimEvidenceLink],
    pub reliability: &'a ReliabilityResult,
}

pub struct MetaReviewer {
    model: Option<Arc<dyn Model>>,
    opts: CallOptions,
}

impl MetaReviewer {
    pub fn new(model: Option<Arc<dyn Model>>) -> Self {
        Self {
            model,
            opts: call_options(&ModelConfig::default()),
        }
    }

    /// Take the token budget and temperature from `config`.
    pub fn with_model_config(mut self, config: &ModelConfig) -> Self {
        self.opts = call_options(config);
        self
    }

    /// Assemble the final review. `stages` is the audit trail so far; this
    /// stage appends its own entry.
    pub fn review(&self, outputs: StageOutputs<'_>, mut stages: Vec<StageReport>) -> ReviewResult {
        let text = self.resolve_text(outputs.claims, outputs.reliability);
        stages.push(text.report(STAGE));

        ReviewResult {
            session_id: outputs.session_id.to_string(),
            executive_summary: text.value.executive_summary,
            structured_data: outputs.structured.clone(),
            claims: outputs.claims.to_vec(),
            evidence_links: outputs.links.to_vec(),
            reliability_score: outputs.reliability.score,
            reliability: outputs.reliability.clone(),
            limitations: text.value.limitations,
            recommendation: text.value.recommendation,
            stages,
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn resolve_text(&self, claims: &[Claim], reliability: &ReliabilityResult) -> Resolved<ReviewText> {
        let resolver = Resolver::new(STAGE, self.model.as_deref());

        resolver.resolve(
            &self.opts,
            || {
                let quoted = &claims[..claims.len().min(PROMPT_CLAIMS)];
                format!(
                    "Generate a scientific meta-review JSON.\n\
                     Fields: executive_summary, limitations, recommendation.\n\
                     No Markdown.\n\nScore: {}\nClaims: {}",
                    reliability.score,
                    serde_json::json!(quoted)
                )
            },
            merge_payload,
            ReviewText::default,
        )
    }
}

fn call_options(config: &ModelConfig) -> CallOptions {
    CallOptions::from_config(STAGE, config)
}

fn merge_payload(reply: &str) -> Result<ReviewText, StageError> {
    let payload: ReviewPayload = parse_payload(reply)?;
    let mut text = ReviewText::default();
    let mut replaced = false;

    for (slot, value) in [
        (&mut text.executive_summary, payload.executive_summary),
        (&mut text.limitations, payload.limitations),
        (&mut text.recommendation, payload.recommendation),
    ] {
        if let Some(v) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            *slot = v;
            replaced = true;
        }
    }

    if !replaced {
        return Err(StageError::Empty);
    }
    Ok(text)
}
