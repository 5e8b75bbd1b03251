//! Review orchestration.
//!
//! Runs the stages strictly in sequence over one document:
//!
//! ```text
//! normalize ─► context ingest ─► structure ─► claims ─► evidence ─► reliability ─► meta review
//! ```
//!
//! Each run gets its own session id and a fresh [`ContextEngine`]; the
//! orchestrator holds only configuration and the optional model and
//! embedder handles. A panic inside a model call is absorbed by the stage
//! that made it; any other panic inside a run is caught by
//! [`Orchestrator::run`] and becomes [`ReviewOutcome::Failed`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::claims::{self, ClaimExtractor};
use crate::config::Config;
use crate::context::ContextEngine;
use crate::embedding::{create_embedder, Embedder};
use crate::evidence::{self, EvidenceLinker};
use crate::meta_review::{self, MetaReviewer, StageOutputs};
use crate::model::{create_model, Model, ModelError};
use crate::models::{Document, ReviewOutcome, ReviewResult};
use crate::normalize::normalize;
use crate::reliability::{self, ReliabilityScorer};
use crate::resolver::{panic_message, Resolved};
use crate::structure::{self, StructureExtractor};

pub struct Orchestrator {
    config: Config,
    model: Option<Arc<dyn Model>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl Orchestrator {
    /// Heuristic-only orchestrator with lexical retrieval.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            model: None,
            embedder: None,
        }
    }

    /// Build from configuration.
    ///
    /// With `use_llm` the configured model is constructed and any failure is
    /// returned. An embedder that cannot be built is logged and retrieval
    /// stays lexical.
    pub fn from_config(
        config: Config,
        use_llm: bool,
        model_name: Option<&str>,
    ) -> Result<Self, ModelError> {
        let model = if use_llm {
            Some(create_model(&config.model, model_name)?)
        } else {
            None
        };

        let embedder = match create_embedder(&config.embedding) {
            Ok(embedder) => embedder.map(Arc::from),
            Err(e) => {
                tracing::warn!(error = %e, "embedder unavailable; retrieval will be lexical");
                None
            }
        };

        Ok(Self {
            config,
            model,
            embedder,
        })
    }

    pub fn with_model(mut self, model: Arc<dyn Model>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model.as_deref().map(|m| m.name())
    }

    /// Review one document. Never panics and never returns an `Err`.
    pub fn run(&self, raw: &str) -> ReviewOutcome {
        let session_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("review", session_id = %session_id);
        let _guard = span.enter();

        let started = Instant::now();
        match catch_unwind(AssertUnwindSafe(|| self.run_stages(raw, &session_id))) {
            Ok(review) => {
                tracing::info!(
                    session_id = %session_id,
                    score = review.reliability_score,
                    claims = review.claims.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "review complete"
                );
                ReviewOutcome::Review(Box::new(review))
            }
            Err(payload) => {
                let error = panic_message(payload.as_ref());
                tracing::error!(session_id = %session_id, error = %error, "review failed");
                ReviewOutcome::Failed { error }
            }
        }
    }

    fn run_stages(&self, raw: &str, session_id: &str) -> ReviewResult {
        let limits = &self.config.limits;
        let document = Document {
            raw,
            normalized: normalize(raw, limits.max_lines, limits.max_length),
        };

        let mut engine = ContextEngine::new(
            &self.config.chunking,
            &self.config.retrieval,
            self.embedder.clone(),
        );
        engine.ingest(&document.normalized);
        tracing::debug!(
            session_id,
            raw_chars = document.raw.chars().count(),
            normalized_chars = document.normalized.chars().count(),
            chunks = engine.len(),
            index = ?engine.index_kind(),
            "document ingested"
        );

        let model = self.model.clone();
        let model_config = &self.config.model;
        let mut stages = Vec::with_capacity(5);

        let structured = run_stage(session_id, structure::STAGE, || {
            StructureExtractor::new(model.clone(), limits.structure_prompt_chars)
                .with_model_config(model_config)
                .resolve(&document.normalized)
        });
        stages.push(structured.report(structure::STAGE));

        let claims = run_stage(session_id, claims::STAGE, || {
            ClaimExtractor::new(model.clone())
                .with_model_config(model_config)
                .resolve(&structured.value)
        });
        stages.push(claims.report(claims::STAGE));

        let links = run_stage(session_id, evidence::STAGE, || {
            EvidenceLinker::new(model.clone())
                .with_model_config(model_config)
                .resolve(&claims.value, &engine)
        });
        stages.push(links.report(evidence::STAGE));

        let reliability = run_stage(session_id, reliability::STAGE, || {
            ReliabilityScorer::new(model.clone())
                .with_model_config(model_config)
                .resolve(&structured.value, &claims.value, &links.value)
        });
        stages.push(reliability.report(reliability::STAGE));

        tracing::info!(session_id, stage = meta_review::STAGE, "stage start");
        let review = MetaReviewer::new(model).with_model_config(model_config).review(
            StageOutputs {
                session_id,
                structured: &structured.value,
                claims: &claims.value,
                links: &links.value,
                reliability: &reliability.value,
            },
            stages,
        );
        tracing::info!(session_id, stage = meta_review::STAGE, "stage end");

        review
    }
}

fn run_stage<T>(session_id: &str, stage: &'static str, f: impl FnOnce() -> Resolved<T>) -> Resolved<T> {
    tracing::info!(session_id, stage, "stage start");
    let started = Instant::now();
    let resolved = f();
    tracing::info!(
        session_id,
        stage,
        path = ?resolved.path,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "stage end"
    );
    resolved
}
