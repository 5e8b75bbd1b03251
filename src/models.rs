//! Core data types that flow through one review run.
//!
//! Every value here is scoped to a single pipeline invocation: built by one
//! stage, read by the later ones, and returned to the caller inside a
//! [`ReviewResult`]. Nothing is persisted.

use serde::{Deserialize, Serialize};

/// A source document: the text as received and its normalized form.
#[derive(Debug, Clone)]
pub struct Document<'a> {
    pub raw: &'a str,
    pub normalized: String,
}

/// A contiguous window of normalized text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position in the engine's chunk list.
    pub index: usize,
    /// Character offset of the window start in the ingested text.
    pub start: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// Names of the fixed sections, in document order.
pub const SECTION_KEYS: [&str; 5] = ["title", "abstract", "methods", "results", "conclusion"];

/// A document split into its fixed sections.
///
/// All five sections are always present; a section that could not be found
/// is an empty string. `full_text` keeps the unstructured input so later
/// stages can fall back to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredDocument {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub methods: String,
    pub results: String,
    pub conclusion: String,
    pub full_text: String,
}

impl StructuredDocument {
    /// An empty document that retains `full_text`.
    pub fn with_full_text(full_text: impl Into<String>) -> Self {
        Self {
            full_text: full_text.into(),
            ..Self::default()
        }
    }

    pub fn section(&self, key: &str) -> Option<&str> {
        match key {
            "title" => Some(&self.title),
            "abstract" => Some(&self.abstract_text),
            "methods" => Some(&self.methods),
            "results" => Some(&self.results),
            "conclusion" => Some(&self.conclusion),
            "full_text" => Some(&self.full_text),
            _ => None,
        }
    }

    pub fn section_mut(&mut self, key: &str) -> Option<&mut String> {
        match key {
            "title" => Some(&mut self.title),
            "abstract" => Some(&mut self.abstract_text),
            "methods" => Some(&mut self.methods),
            "results" => Some(&mut self.results),
            "conclusion" => Some(&mut self.conclusion),
            _ => None,
        }
    }

    /// True when none of the five sections has non-whitespace content.
    pub fn is_blank(&self) -> bool {
        SECTION_KEYS
            .iter()
            .filter_map(|k| self.section(k))
            .all(|s| s.trim().is_empty())
    }
}

/// A short text assertion taken from the document.
pub type Claim = String;

/// Verdict for one (claim, passage) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Supports,
    Contradicts,
    Insufficient,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Supports => "supports",
            Classification::Contradicts => "contradicts",
            Classification::Insufficient => "insufficient",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which index answered a retrieval query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Semantic,
    Lexical,
}

/// Where an evidence passage came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provenance {
    pub source: String,
    pub chunk_index: usize,
    /// 0-based rank in the retrieval result.
    pub rank: usize,
    pub retrieval: RetrievalMode,
    /// Cosine similarity (semantic) or shared-token count (lexical).
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceEntry {
    pub chunk: String,
    pub classification: Classification,
    pub provenance: Provenance,
}

/// All evidence gathered for one claim, in retrieval-rank order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimEvidenceLink {
    pub claim: Claim,
    pub evidence: Vec<EvidenceEntry>,
}

impl ClaimEvidenceLink {
    pub fn has(&self, classification: Classification) -> bool {
        self.evidence
            .iter()
            .any(|e| e.classification == classification)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReliabilityResult {
    /// Always within `0..=100`.
    pub score: u8,
    pub explanation: String,
}

/// How a stage produced its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPath {
    Model,
    Heuristic,
}

/// Audit record for one stage of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub path: ResolutionPath,
    /// Why the model path was not used, when it was not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

/// The terminal artifact of a run.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewResult {
    pub session_id: String,
    pub executive_summary: String,
    pub structured_data: StructuredDocument,
    pub claims: Vec<Claim>,
    pub evidence_links: Vec<ClaimEvidenceLink>,
    pub reliability_score: u8,
    pub reliability: ReliabilityResult,
    pub limitations: String,
    pub recommendation: String,
    pub stages: Vec<StageReport>,
    pub generated_at: String,
}

/// What the orchestrator hands back: a review, or an error object.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReviewOutcome {
    Review(Box<ReviewResult>),
    Failed { error: String },
}

impl ReviewOutcome {
    pub fn review(&self) -> Option<&ReviewResult> {
        match self {
            ReviewOutcome::Review(r) => Some(r),
            ReviewOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ReviewOutcome::Review(_) => None,
            ReviewOutcome::Failed { error } => Some(error),
        }
    }
}
