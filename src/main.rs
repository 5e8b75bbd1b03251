//! # hypothesi CLI
//!
//! Reviews a scientific document from the command line or serves the review
//! pipeline over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! hypothesi [--config ./config/hypothesi.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hypothesi review <source>` | Print the review of a file, URL, arXiv id or raw text as JSON |
//! | `hypothesi search <source> "<query>"` | Show the passages retrieval would return for a query |
//! | `hypothesi serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Heuristic-only review of a local PDF
//! hypothesi review ./paper.pdf
//!
//! # Model-backed review of an arXiv entry
//! GEMINI_API_KEY=... hypothesi --config ./config/hypothesi.toml review 2310.06825 --use-llm
//!
//! # Inspect retrieval
//! hypothesi search ./paper.txt "reaction time" --k 3
//! ```
//!
//! Logs go to stderr (`RUST_LOG` overrides the default filter); stdout only
//! carries results.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use hypothesi::config::{self, Config};
use hypothesi::context::ContextEngine;
use hypothesi::embedding::create_embedder;
use hypothesi::ingest::load_source;
use hypothesi::models::ReviewOutcome;
use hypothesi::pipeline::Orchestrator;
use hypothesi::server;

/// Structured reviews of scientific documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/hypothesi.example.toml` for a full example. Without
/// one, built-in defaults are used: no model, lexical retrieval.
#[derive(Parser)]
#[command(
    name = "hypothesi",
    about = "Structured reviews of scientific documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Review a document and print the result as JSON.
    ///
    /// SOURCE may be a local file (PDF or text), an http(s) URL, an arXiv
    /// identifier such as 2310.06825, or the document text itself.
    Review {
        source: String,
        /// Resolve stages with the configured model, falling back to the
        /// heuristics on any failure.
        #[arg(long)]
        use_llm: bool,
        /// Override `[model].name` for this run.
        #[arg(long)]
        model: Option<String>,
        /// Print compact JSON instead of pretty-printed JSON.
        #[arg(long)]
        compact: bool,
    },

    /// Ingest a source and print the passages returned for a query.
    Search {
        source: String,
        query: String,
        /// Number of passages (defaults to `[retrieval].k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hypothesi=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Review {
            source,
            use_llm,
            model,
            compact,
        } => review(cfg, &source, use_llm, model.as_deref(), compact),
        Commands::Search { source, query, k } => {
            search(&cfg, &source, &query, k)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Serve => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::run_server(cfg))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn review(
    cfg: Config,
    source: &str,
    use_llm: bool,
    model: Option<&str>,
    compact: bool,
) -> anyhow::Result<ExitCode> {
    let text = match load_source(source, &cfg) {
        Ok(text) => text,
        Err(e) => {
            print_json(&e.to_json(), compact)?;
            return Ok(ExitCode::FAILURE);
        }
    };

    let orchestrator = match Orchestrator::from_config(cfg, use_llm, model) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            print_json(
                &serde_json::json!({
                    "error": "LLM requested but configuration failed",
                    "details": e.to_string(),
                }),
                compact,
            )?;
            return Ok(ExitCode::FAILURE);
        }
    };

    let outcome = orchestrator.run(&text);
    print_json(&serde_json::to_value(&outcome)?, compact)?;

    Ok(match outcome {
        ReviewOutcome::Review(_) => ExitCode::SUCCESS,
        ReviewOutcome::Failed { .. } => ExitCode::FAILURE,
    })
}

fn search(cfg: &Config, source: &str, query: &str, k: Option<usize>) -> anyhow::Result<()> {
    let text = load_source(source, cfg)?;
    let embedder = create_embedder(&cfg.embedding)?.map(Arc::from);

    let mut engine = ContextEngine::new(&cfg.chunking, &cfg.retrieval, embedder);
    engine.ingest_labeled(&text, source);
    let hits = engine.search_k(query, k.unwrap_or(cfg.retrieval.k));

    println!(
        "{} chunks indexed ({:?} index)",
        engine.len(),
        engine.index_kind()
    );
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] chunk #{} ({:?})",
            rank + 1,
            hit.score,
            hit.chunk_index,
            hit.mode
        );
        let preview: String = hit.text.chars().take(200).collect();
        println!("    {}", preview.replace('\n', " "));
    }
    Ok(())
}

fn print_json(value: &serde_json::Value, compact: bool) -> anyhow::Result<()> {
    let rendered = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", rendered);
    Ok(())
}
