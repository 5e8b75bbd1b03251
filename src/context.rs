//! Context engine: chunk ingested text and answer top-k similarity queries.
//!
//! # Index selection
//!
//! Every [`ContextEngine::ingest`] appends chunks and rebuilds the index over
//! the whole chunk list:
//!
//! 1. With an [`Embedder`] configured, all chunks are encoded and the index is
//!    **semantic**; queries are encoded too and ranked by cosine similarity.
//! 2. Without one, or when encoding the chunks fails, the index is
//!    **lexical**: each chunk is reduced to its set of lowercase word tokens
//!    and queries are ranked by the size of the intersection.
//!
//! A semantic query whose own encoding fails is answered lexically. Both
//! rankings are stable sorts, so ties keep chunk order.
//!
//! Each pipeline run owns a fresh engine; nothing is shared between runs.

use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::chunk::chunk_text;
use crate::config::{ChunkingConfig, RetrievalConfig};
use crate::embedding::{cosine_similarity, embed_query, Embedder};
use crate::models::{Chunk, RetrievalMode};

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").unwrap());

/// One retrieved passage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub chunk_index: usize,
    pub text: String,
    pub score: f64,
    pub mode: RetrievalMode,
}

/// Bookkeeping for one `ingest` call.
#[derive(Debug, Clone, Serialize)]
pub struct IngestRecord {
    pub label: String,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

enum Index {
    Lexical,
    Semantic(Vec<Vec<f32>>),
}

pub struct ContextEngine {
    chunking: ChunkingConfig,
    k: usize,
    embedder: Option<Arc<dyn Embedder>>,
    chunks: Vec<Chunk>,
    tokens: Vec<HashSet<String>>,
    index: Index,
    ingests: Vec<IngestRecord>,
}

impl ContextEngine {
    pub fn new(
        chunking: &ChunkingConfig,
        retrieval: &RetrievalConfig,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Self {
        Self {
            chunking: chunking.clone(),
            k: retrieval.k,
            embedder,
            chunks: Vec::new(),
            tokens: Vec::new(),
            index: Index::Lexical,
            ingests: Vec::new(),
        }
    }

    /// Lexical-only engine with default settings.
    pub fn lexical() -> Self {
        Self::new(&ChunkingConfig::default(), &RetrievalConfig::default(), None)
    }

    pub fn ingest(&mut self, text: &str) {
        self.ingest_labeled(text, "document");
    }

    /// Chunk `text`, append the chunks and rebuild the index.
    pub fn ingest_labeled(&mut self, text: &str, label: &str) {
        let new_chunks = chunk_text(
            text,
            self.chunks.len(),
            self.chunking.size,
            self.chunking.overlap,
        );
        let added = new_chunks.len();
        self.chunks.extend(new_chunks);
        self.ingests.push(IngestRecord {
            label: label.to_string(),
            chunk_count: added,
            ingested_at: Utc::now(),
        });
        self.rebuild_index();
    }

    fn rebuild_index(&mut self) {
        self.tokens = self.chunks.iter().map(|c| tokenize(&c.text)).collect();
        self.index = Index::Lexical;

        if let Some(embedder) = &self.embedder {
            if !self.chunks.is_empty() {
                let texts: Vec<String> = self.chunks.iter().map(|c| c.text.clone()).collect();
                match embedder.embed(&texts) {
                    Ok(vectors) if vectors.len() == texts.len() => {
                        self.index = Index::Semantic(vectors);
                    }
                    Ok(vectors) => {
                        tracing::warn!(
                            expected = texts.len(),
                            got = vectors.len(),
                            "embedder returned wrong vector count; using lexical ranking"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            model = embedder.model_name(),
                            error = %e,
                            "semantic index build failed; using lexical ranking"
                        );
                    }
                }
            }
        }

        tracing::debug!(
            chunks = self.chunks.len(),
            index = ?self.index_kind(),
            "retrieval index rebuilt"
        );
    }

    /// Top-k passages for `query` using the configured `k`.
    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        self.search_k(query, self.k)
    }

    /// Top-`k` passages for `query`, best first.
    ///
    /// An empty query or an empty engine yields no hits.
    pub fn search_k(&self, query: &str, k: usize) -> Vec<SearchHit> {
        if query.trim().is_empty() || self.chunks.is_empty() || k == 0 {
            return Vec::new();
        }

        if let (Index::Semantic(vectors), Some(embedder)) = (&self.index, &self.embedder) {
            match embed_query(embedder.as_ref(), query) {
                Ok(qv) => return self.rank_semantic(vectors, &qv, k),
                Err(e) => {
                    tracing::warn!(error = %e, "query embedding failed; using lexical ranking");
                }
            }
        }

        self.rank_lexical(query, k)
    }

    fn rank_semantic(&self, vectors: &[Vec<f32>], query_vec: &[f32], k: usize) -> Vec<SearchHit> {
        let mut scored: Vec<(usize, f32)> = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query_vec, v)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| SearchHit {
                chunk_index: self.chunks[i].index,
                text: self.chunks[i].text.clone(),
                score: f64::from(score),
                mode: RetrievalMode::Semantic,
            })
            .collect()
    }

    fn rank_lexical(&self, query: &str, k: usize) -> Vec<SearchHit> {
        let query_tokens = tokenize(query);
        let mut scored: Vec<(usize, usize)> = self
            .tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (i, t.intersection(&query_tokens).count()))
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1));

        scored
            .into_iter()
            .take(k)
            .map(|(i, overlap)| SearchHit {
                chunk_index: self.chunks[i].index,
                text: self.chunks[i].text.clone(),
                score: overlap as f64,
                mode: RetrievalMode::Lexical,
            })
            .collect()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn index_kind(&self) -> RetrievalMode {
        match self.index {
            Index::Lexical => RetrievalMode::Lexical,
            Index::Semantic(_) => RetrievalMode::Semantic,
        }
    }

    pub fn ingests(&self) -> &[IngestRecord] {
        &self.ingests
    }
}

/// Lowercase word tokens of `text`.
pub fn tokenize(text: &str) -> HashSet<String> {
    WORD.find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn small_engine(size: usize, overlap: usize, k: usize) -> ContextEngine {
        ContextEngine::new(
            &ChunkingConfig { size, overlap },
            &RetrievalConfig { k },
            None,
        )
    }

    /// Maps each text to a one-hot vector by its first letter.
    struct LetterEmbedder;

    impl Embedder for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 26];
                    if let Some(c) = t.to_lowercase().chars().find(|c| c.is_ascii_lowercase()) {
                        v[(c as u8 - b'a') as usize] = 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    struct BrokenEmbedder;

    impl Embedder for BrokenEmbedder {
        fn model_name(&self) -> &str {
            "broken"
        }
        fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("model not loaded")
        }
    }

    /// Embeds the index build, then fails every later call.
    struct OneShotEmbedder {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl Embedder for OneShotEmbedder {
        fn model_name(&self) -> &str {
            "one-shot"
        }
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) > 0 {
                anyhow::bail!("embedding server went away");
            }
            LetterEmbedder.embed(texts)
        }
    }

    #[test]
    fn test_empty_query_and_empty_engine() {
        let mut engine = ContextEngine::lexical();
        assert!(engine.search("anything").is_empty());
        engine.ingest("Some text about proteins.");
        assert!(engine.search("").is_empty());
        assert!(engine.search("   ").is_empty());
    }

    #[test]
    fn test_lexical_ranking_by_overlap() {
        let mut engine = small_engine(30, 0, 5);
        engine.ingest("alpha beta gamma delta epsilo protein folding rates measured here");
        let hits = engine.search("protein folding");
        assert!(!hits.is_empty());
        assert!(hits[0].text.contains("protein"));
        assert_eq!(hits[0].mode, RetrievalMode::Lexical);
        assert_eq!(hits[0].score, 2.0);
    }

    #[test]
    fn test_lexical_ties_keep_chunk_order() {
        let mut engine = small_engine(10, 0, 5);
        engine.ingest("aaaa bbbb cccc dddd eeee ffff");
        let hits = engine.search("zzzz");
        let indices: Vec<usize> = hits.iter().map(|h| h.chunk_index).collect();
        let mut sorted = indices.clone();
        sorted.sort();
        assert_eq!(indices, sorted);
        assert!(hits.iter().all(|h| h.score == 0.0));
    }

    #[test]
    fn test_k_limits_results() {
        let mut engine = small_engine(10, 0, 2);
        engine.ingest(&"word ".repeat(40));
        assert_eq!(engine.search("word").len(), 2);
        assert_eq!(engine.search_k("word", 3).len(), 3);
    }

    #[test]
    fn test_incremental_ingest_rebuilds() {
        let mut engine = small_engine(800, 100, 5);
        engine.ingest("first document about cells");
        engine.ingest("second document about stars");
        assert_eq!(engine.len(), 2);
        assert_eq!(engine.chunks()[1].index, 1);
        assert_eq!(engine.ingests().len(), 2);
        let hits = engine.search("stars");
        assert_eq!(hits[0].chunk_index, 1);
    }

    #[test]
    fn test_semantic_index_used_when_embedder_works() {
        let mut engine = ContextEngine::new(
            &ChunkingConfig { size: 12, overlap: 0 },
            &RetrievalConfig { k: 1 },
            Some(Arc::new(LetterEmbedder)),
        );
        engine.ingest("apples rock bananas roll cherries ripe");
        assert_eq!(engine.index_kind(), RetrievalMode::Semantic);
        let hits = engine.search("banana");
        assert_eq!(hits.len(), 1);
        assert!(hits[0].text.starts_with('b'), "{:?}", hits);
        assert_eq!(hits[0].mode, RetrievalMode::Semantic);
    }

    #[test]
    fn test_broken_embedder_falls_back_to_lexical() {
        let mut engine = ContextEngine::new(
            &ChunkingConfig::default(),
            &RetrievalConfig::default(),
            Some(Arc::new(BrokenEmbedder)),
        );
        engine.ingest("gene expression increased");
        assert_eq!(engine.index_kind(), RetrievalMode::Lexical);
        let hits = engine.search("gene");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].mode, RetrievalMode::Lexical);
    }

    #[test]
    fn test_query_embedding_failure_ranks_lexically() {
        let mut engine = ContextEngine::new(
            &ChunkingConfig { size: 12, overlap: 0 },
            &RetrievalConfig { k: 2 },
            Some(Arc::new(OneShotEmbedder {
                calls: std::sync::atomic::AtomicUsize::new(0),
            })),
        );
        engine.ingest("apples rock bananas roll cherries ripe");
        assert_eq!(engine.index_kind(), RetrievalMode::Semantic);

        let hits = engine.search("bananas roll");
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.mode == RetrievalMode::Lexical));
        assert!(hits[0].text.contains("bananas"), "{:?}", hits);
        assert_eq!(engine.index_kind(), RetrievalMode::Semantic);
    }

    #[test]
    fn test_fresh_engines_chunk_identically() {
        let text = "Sentence about methods and results. ".repeat(60);
        let mut a = ContextEngine::lexical();
        let mut b = ContextEngine::lexical();
        a.ingest(&text);
        b.ingest(&text);
        assert_eq!(a.chunks(), b.chunks());
    }

    #[test]
    fn test_tokenize_lowercases() {
        let tokens = tokenize("The RESULTS, the results!");
        assert_eq!(tokens.len(), 2);
        assert!(tokens.contains("results"));
    }
}
