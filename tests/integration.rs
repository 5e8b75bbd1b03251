use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const PAPER: &str = "Sleep Duration and Working Memory in Adolescents

Abstract
We examine whether extended sleep improves working memory performance in adolescents aged 13 to 17.

Methods
One hundred twenty students were randomized to extended or habitual sleep for three weeks.
Working memory was assessed with an n-back task.

Results
Significant improvements were observed in n-back accuracy for the extended sleep group.
Reaction times decreased modestly.

Conclusion
These findings support the hypothesis that sleep extension benefits working memory.
";

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_hypothesi"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::write(root.join("paper.txt"), PAPER).unwrap();

    let config_path = root.join("hypothesi.toml");
    fs::write(
        &config_path,
        r#"[chunking]
size = 400
overlap = 50

[retrieval]
k = 3
"#,
    )
    .unwrap();

    (tmp, config_path)
}

fn run(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn parse(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("stdout is not JSON ({}): {}", e, stdout))
}

#[test]
fn test_review_text_file() {
    let (tmp, config) = setup_test_env();
    let paper = tmp.path().join("paper.txt");
    let (stdout, stderr, success) = run(&config, &["review", paper.to_str().unwrap()]);
    assert!(success, "review failed: {}", stderr);

    let review = parse(&stdout);
    assert_eq!(
        review["structured_data"]["title"],
        "Sleep Duration and Working Memory in Adolescents"
    );
    let claims = review["claims"].as_array().unwrap();
    assert!(!claims.is_empty());
    assert!(claims.len() <= 10);
    assert!(review["reliability_score"].as_u64().unwrap() >= 50);
    assert_eq!(review["reliability_score"], review["reliability"]["score"]);
    assert_eq!(review["limitations"], "None detected.");
    assert_eq!(review["stages"].as_array().unwrap().len(), 5);

    for link in review["evidence_links"].as_array().unwrap() {
        let evidence = link["evidence"].as_array().unwrap();
        assert!(evidence.len() <= 3);
        for entry in evidence {
            assert_eq!(entry["provenance"]["source"], "context");
            assert_eq!(entry["provenance"]["retrieval"], "lexical");
        }
    }
}

#[test]
fn test_review_is_deterministic() {
    let (tmp, config) = setup_test_env();
    let paper = tmp.path().join("paper.txt");
    let (a, _, _) = run(&config, &["review", paper.to_str().unwrap(), "--compact"]);
    let (b, _, _) = run(&config, &["review", paper.to_str().unwrap(), "--compact"]);
    let (a, b) = (parse(&a), parse(&b));
    assert_eq!(a["reliability"], b["reliability"]);
    assert_eq!(a["claims"], b["claims"]);
    assert_eq!(a["evidence_links"], b["evidence_links"]);
    assert_ne!(a["session_id"], b["session_id"]);
}

#[test]
fn test_compact_output_is_one_line() {
    let (tmp, config) = setup_test_env();
    let paper = tmp.path().join("paper.txt");
    let (stdout, _, success) = run(&config, &["review", paper.to_str().unwrap(), "--compact"]);
    assert!(success);
    assert_eq!(stdout.trim_end().lines().count(), 1);
}

#[test]
fn test_review_raw_text_argument() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run(
        &config,
        &["review", "Tiny note\nResults\nYield increased by a third in treated plots."],
    );
    assert!(success);
    let review = parse(&stdout);
    assert_eq!(review["structured_data"]["results"], "Yield increased by a third in treated plots.");
}

#[test]
fn test_missing_file_prints_error_object() {
    let (tmp, config) = setup_test_env();
    let missing = tmp.path().join("nope.pdf");
    let (stdout, _, success) = run(&config, &["review", missing.to_str().unwrap()]);
    assert!(!success);
    let error = parse(&stdout);
    assert_eq!(error["error"], true);
    assert!(error["message"].as_str().unwrap().starts_with("Ingestion failed"));
}

#[test]
fn test_use_llm_without_model_config() {
    let (tmp, config) = setup_test_env();
    let paper = tmp.path().join("paper.txt");
    let (stdout, _, success) = run(&config, &["review", paper.to_str().unwrap(), "--use-llm"]);
    assert!(!success);
    let error = parse(&stdout);
    assert_eq!(error["error"], "LLM requested but configuration failed");
    assert_eq!(error["details"], "model provider is disabled");
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("bad.toml");
    fs::write(&config, "[chunking]\nsize = 100\noverlap = 100\n").unwrap();
    let (_, stderr, success) = run(&config, &["review", "some text"]);
    assert!(!success);
    assert!(stderr.contains("chunking.overlap"));
}

#[test]
fn test_search_ranks_passages() {
    let (tmp, config) = setup_test_env();
    let paper = tmp.path().join("paper.txt");
    let (stdout, stderr, success) = run(
        &config,
        &["search", paper.to_str().unwrap(), "n-back accuracy", "--k", "2"],
    );
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("Lexical index"));
    assert!(stdout.contains("1. ["));
    assert!(stdout.contains("2. ["));
}
