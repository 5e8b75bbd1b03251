//! # hypothesi
//!
//! Structured reviews of scientific documents.
//!
//! A document (local file, URL, arXiv entry or raw text) is normalized and
//! run through a fixed sequence of stages: section extraction, claim
//! extraction, evidence linking, reliability scoring and meta review. Every
//! stage can be answered by a generative model and always has a
//! deterministic heuristic to fall back on, so a review is produced with or
//! without a model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌────────────────────────────────────────┐
//! │ Ingest   │──▶│ Normalize │──▶│ Orchestrator                           │
//! │ file/URL │   └───────────┘   │  structure → claims → evidence →       │
//! │ arXiv    │                   │  reliability → meta review             │
//! └──────────┘                   └───────┬──────────────────┬─────────────┘
//!                                        │                  │
//!                                 ┌──────▼──────┐    ┌──────▼──────┐
//!                                 │ Context     │    │ Model       │
//!                                 │ chunk+index │    │ (optional)  │
//!                                 └─────────────┘    └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! hypothesi review ./paper.pdf            # heuristic review
//! hypothesi review 2310.06825 --use-llm   # model-backed review of an arXiv entry
//! hypothesi search ./paper.txt "dose"     # inspect retrieval
//! hypothesi serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`normalize`] | Text normalization |
//! | [`chunk`] | Overlapping character windows |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`context`] | Chunk store with semantic or lexical retrieval |
//! | [`model`] | Generative-model boundary |
//! | [`resolver`] | Model-then-heuristic stage resolution |
//! | [`structure`] | Section extraction |
//! | [`claims`] | Claim extraction |
//! | [`evidence`] | Evidence retrieval and classification |
//! | [`reliability`] | Reliability scoring |
//! | [`meta_review`] | Final report composition |
//! | [`pipeline`] | Stage orchestration |
//! | [`extract`] | PDF, HTML and arXiv feed text extraction |
//! | [`ingest`] | Source dispatch |
//! | [`server`] | HTTP server |

pub mod chunk;
pub mod claims;
pub mod config;
pub mod context;
pub mod embedding;
pub mod evidence;
pub mod extract;
pub mod ingest;
pub mod meta_review;
pub mod model;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod reliability;
pub mod resolver;
pub mod server;
pub mod structure;
