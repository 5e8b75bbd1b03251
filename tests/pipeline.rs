//! End-to-end review scenarios against the library API with scripted models.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hypothesi::claims::{extract_heuristic as extract_claims, MAX_CLAIMS};
use hypothesi::config::Config;
use hypothesi::context::ContextEngine;
use hypothesi::embedding::Embedder;
use hypothesi::evidence::classify_heuristic;
use hypothesi::model::{CallOptions, FnModel, ModelError};
use hypothesi::models::{Classification, ResolutionPath, RetrievalMode, StructuredDocument};
use hypothesi::pipeline::Orchestrator;
use hypothesi::reliability::score_heuristic;
use hypothesi::structure::extract_heuristic as extract_structure;

const PAPER: &str = "Mindfulness Training for Exam Anxiety

Abstract
We evaluate a four-week mindfulness course as a way to reduce exam anxiety in first-year students.

Methods
Eighty students were randomly assigned to the course or to a waitlist. Anxiety was measured before and after.

Results
Significant improvements were observed in self-reported anxiety scores after the course.

Conclusion
Our findings support the hypothesis that brief mindfulness training lowers exam anxiety.";

fn orchestrator() -> Orchestrator {
    Orchestrator::new(Config::default())
}

#[test]
fn test_heuristic_pipeline_scenario() {
    let outcome = orchestrator().run(PAPER);
    let review = outcome.review().expect("review");

    let claim = review
        .claims
        .iter()
        .find(|c| {
            let lower = c.to_lowercase();
            lower.contains("significant") || lower.contains("improvements")
        })
        .expect("a claim about the improvement");

    let link = review
        .evidence_links
        .iter()
        .find(|l| &l.claim == claim)
        .expect("link for the claim");
    assert!(!link.evidence.is_empty());

    assert!(review.reliability_score >= 50);
    assert!(review
        .reliability
        .explanation
        .starts_with("Methods section present (+30); Results section present (+20)"));
}

#[test]
fn test_always_failing_model_falls_back_everywhere() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let model = FnModel::new("down", move |_: &str, _: &CallOptions| {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(ModelError::Transport("connection refused".to_string()))
    });

    let with_model = orchestrator().with_model(Arc::new(model)).run(PAPER);
    let without_model = orchestrator().run(PAPER);

    let review = with_model.review().expect("complete review");
    assert!(calls.load(Ordering::SeqCst) >= 4);
    assert!(review
        .stages
        .iter()
        .all(|s| s.path == ResolutionPath::Heuristic && s.fallback_reason.is_some()));

    let baseline = without_model.review().expect("baseline review");
    assert_eq!(review.claims, baseline.claims);
    assert_eq!(review.reliability, baseline.reliability);
    assert_eq!(review.executive_summary, baseline.executive_summary);
}

#[test]
fn test_canned_model_answers_are_used() {
    let model = FnModel::new("canned", |prompt: &str, opts: &CallOptions| {
        let reply = match opts.stage {
            "structure" => r#"{"title": "Mindfulness", "abstract": "Short course.", "methods": "RCT", "results": "Lower anxiety", "conclusion": "Works"}"#,
            "claims" => r#"```json
{"claims": ["Mindfulness lowers exam anxiety"]}
```"#,
            "evidence" => "supports",
            "reliability" => r#"{"score": 77, "explanation": "Randomized design"}"#,
            "meta_review" => r#"{"executive_summary": "Promising.", "limitations": "Small sample.", "recommendation": "Replicate."}"#,
            other => panic!("unexpected stage {} for prompt {}", other, prompt),
        };
        Ok(reply.to_string())
    });

    let outcome = orchestrator().with_model(Arc::new(model)).run(PAPER);
    let review = outcome.review().expect("review");

    assert_eq!(review.structured_data.title, "Mindfulness");
    assert_eq!(review.structured_data.full_text.lines().next(), Some("Mindfulness Training for Exam Anxiety"));
    assert_eq!(review.claims, vec!["Mindfulness lowers exam anxiety".to_string()]);
    assert!(review.evidence_links[0]
        .evidence
        .iter()
        .all(|e| e.classification == Classification::Supports));
    assert_eq!(review.reliability_score, 77);
    assert_eq!(review.reliability.explanation, "Randomized design");
    assert_eq!(review.executive_summary, "Promising.");
    assert_eq!(review.limitations, "Small sample.");
    assert_eq!(review.recommendation, "Replicate.");
    assert!(review.stages.iter().all(|s| s.path == ResolutionPath::Model));
}

fn recorded_options(config: Config) -> Vec<(String, f32, u32)> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let model = FnModel::new("recorder", move |_: &str, opts: &CallOptions| {
        log.lock()
            .unwrap()
            .push((opts.stage.to_string(), opts.temperature, opts.max_output_tokens));
        Err(ModelError::EmptyResponse)
    });
    Orchestrator::new(config).with_model(Arc::new(model)).run(PAPER);
    let mut calls = seen.lock().unwrap().clone();
    calls.dedup();
    calls
}

#[test]
fn test_model_settings_reach_every_stage() {
    let mut config = Config::default();
    config.model.temperature = 1.5;
    config.model.max_output_tokens = 77;

    let calls = recorded_options(config);
    let stages: Vec<&str> = calls.iter().map(|(s, _, _)| s.as_str()).collect();
    assert_eq!(stages, vec!["structure", "claims", "evidence", "reliability", "meta_review"]);
    assert!(calls.iter().all(|(_, t, n)| *t == 1.5 && *n == 77));
}

#[test]
fn test_stage_token_caps_bound_the_configured_budget() {
    let mut config = Config::default();
    config.model.max_output_tokens = 5000;

    let calls = recorded_options(config);
    let budget = |stage: &str| calls.iter().find(|(s, _, _)| s == stage).map(|c| c.2);
    assert_eq!(budget("structure"), Some(5000));
    assert_eq!(budget("claims"), Some(5000));
    assert_eq!(budget("evidence"), Some(16));
    assert_eq!(budget("reliability"), Some(350));
    assert_eq!(budget("meta_review"), Some(5000));
}

#[test]
fn test_panicking_model_falls_back_per_call() {
    let model = FnModel::new("boom", |_: &str, _: &CallOptions| -> Result<String, ModelError> {
        panic!("model exploded")
    });
    let outcome = orchestrator().with_model(Arc::new(model)).run(PAPER);
    let review = outcome.review().expect("review despite panics");
    let baseline = orchestrator().run(PAPER);
    let baseline = baseline.review().expect("baseline review");

    assert_eq!(review.claims, baseline.claims);
    assert_eq!(review.reliability, baseline.reliability);
    for stage in &review.stages {
        assert_eq!(stage.path, ResolutionPath::Heuristic);
        assert_eq!(stage.fallback_reason.as_deref(), Some("model panicked: model exploded"));
    }
}

#[test]
fn test_one_panicking_evidence_call_keeps_other_pairs() {
    let evidence_calls = Arc::new(AtomicUsize::new(0));
    let counter = evidence_calls.clone();
    let model = FnModel::new("flaky", move |_: &str, opts: &CallOptions| {
        if opts.stage == "evidence" && counter.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("one evidence call blew up");
        }
        Err(ModelError::EmptyResponse)
    });

    let outcome = orchestrator().with_model(Arc::new(model)).run(PAPER);
    let review = outcome.review().expect("review");
    let baseline = orchestrator().run(PAPER);
    let baseline = baseline.review().expect("baseline review");

    assert!(evidence_calls.load(Ordering::SeqCst) > 1);
    assert_eq!(review.evidence_links, baseline.evidence_links);
    let evidence = review.stages.iter().find(|s| s.stage == "evidence").unwrap();
    assert_eq!(
        evidence.fallback_reason.as_deref(),
        Some("model panicked: one evidence call blew up")
    );
}

struct PanickingEmbedder;

impl Embedder for PanickingEmbedder {
    fn model_name(&self) -> &str {
        "panicking"
    }

    fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        panic!("embedder exploded")
    }
}

#[test]
fn test_panic_outside_model_calls_yields_error_outcome() {
    let outcome = orchestrator().with_embedder(Arc::new(PanickingEmbedder)).run(PAPER);
    assert!(outcome.review().is_none());
    assert_eq!(outcome.error(), Some("embedder exploded"));

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json, serde_json::json!({ "error": "embedder exploded" }));
}

#[test]
fn test_zero_claims_alignment_is_zero() {
    let text = "Field Notes\nMethods\nWe walked the transect daily.\nResults\nBirds were counted.";
    let outcome = orchestrator().run(text);
    let review = outcome.review().expect("review");

    assert!(review.claims.is_empty());
    assert!(review.evidence_links.is_empty());
    assert_eq!(review.reliability_score, 50);
    assert!(review
        .reliability
        .explanation
        .contains("Claim-evidence alignment: 0/1 (+0)"));
}

#[test]
fn test_reliability_is_reproducible() {
    let structured = extract_structure(PAPER);
    let claims = extract_claims(&structured);
    let mut engine = ContextEngine::lexical();
    engine.ingest(PAPER);
    let links = hypothesi::evidence::EvidenceLinker::new(None).link(&claims, &engine);

    let first = score_heuristic(&structured, &claims, &links);
    for _ in 0..5 {
        let again = score_heuristic(&structured, &claims, &links);
        assert_eq!(again, first);
    }
    assert!(first.score <= 100);
}

#[test]
fn test_claim_cap_and_uniqueness() {
    let mut results = String::new();
    for i in 0..30 {
        results.push_str(&format!("Group {} showed increased retention after training. ", i % 15));
    }
    let doc = StructuredDocument {
        results,
        ..StructuredDocument::default()
    };
    let claims = extract_claims(&doc);
    assert_eq!(claims.len(), MAX_CLAIMS);
    let mut unique = claims.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), claims.len());
}

#[test]
fn test_contradiction_beats_support() {
    assert_eq!(
        classify_heuristic(
            "Training improves retention",
            "Retention did not change, although a significant trend was reported."
        ),
        Classification::Contradicts
    );
}

#[test]
fn test_structure_always_has_every_section() {
    for input in ["", "   \n\n", "just one line", PAPER] {
        let json = serde_json::to_value(extract_structure(input)).unwrap();
        for key in ["title", "abstract", "methods", "results", "conclusion", "full_text"] {
            assert!(json[key].is_string(), "{} missing for {:?}", key, input);
        }
    }
}

#[test]
fn test_fresh_engines_chunk_identically() {
    let text = PAPER.repeat(4);
    let mut a = ContextEngine::lexical();
    let mut b = ContextEngine::lexical();
    a.ingest(&text);
    b.ingest(&text);
    assert!(a.len() > 1);
    assert_eq!(a.chunks(), b.chunks());
    assert!(a.search("").is_empty());
    assert!(ContextEngine::lexical().search("anxiety").is_empty());
}

struct UnitEmbedder;

impl Embedder for UnitEmbedder {
    fn model_name(&self) -> &str {
        "unit"
    }

    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                if t.to_lowercase().contains("anxiety") {
                    vec![1.0, 0.0]
                } else {
                    vec![0.0, 1.0]
                }
            })
            .collect())
    }
}

#[test]
fn test_semantic_retrieval_provenance() {
    let outcome = orchestrator().with_embedder(Arc::new(UnitEmbedder)).run(PAPER);
    let review = outcome.review().expect("review");
    let entry = review
        .evidence_links
        .iter()
        .flat_map(|l| l.evidence.iter())
        .next()
        .expect("some evidence");
    assert_eq!(entry.provenance.retrieval, RetrievalMode::Semantic);
    assert_eq!(entry.provenance.source, "context");
}
