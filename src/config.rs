//! TOML configuration.
//!
//! Every section and every field is optional; a missing file section falls
//! back to [`Default`] and a missing field to its `default_*` function. The
//! resulting [`Config`] is passed explicitly to the pipeline, the ingestion
//! adapters and the server. Nothing is cached process-wide.
//!
//! ```toml
//! [chunking]
//! size = 800
//! overlap = 100
//!
//! [retrieval]
//! k = 5
//!
//! [embedding]
//! provider = "disabled"   # disabled | ollama | local
//!
//! [model]
//! provider = "gemini"     # disabled | gemini | ollama
//! name = "gemini-2.0-flash"
//! api_key_env = "GEMINI_API_KEY"
//! timeout_secs = 60
//!
//! [server]
//! bind = "127.0.0.1:8080"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window size in characters.
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    /// Characters shared by consecutive windows.
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}
fn default_chunk_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Maximum passages returned per query.
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

fn default_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            url: None,
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Base URL override. Gemini defaults to the public endpoint, Ollama to localhost.
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            name: default_model_name(),
            url: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_model_timeout_secs(),
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl ModelConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_model_name() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_model_timeout_secs() -> u64 {
    60
}
fn default_max_output_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.2
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Lines kept from an ingested source.
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    /// Characters kept from an ingested source.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    /// Characters of document text embedded in the structure prompt.
    #[serde(default = "default_structure_prompt_chars")]
    pub structure_prompt_chars: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_max_fetch_bytes")]
    pub max_fetch_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
            max_length: default_max_length(),
            structure_prompt_chars: default_structure_prompt_chars(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_fetch_bytes: default_max_fetch_bytes(),
        }
    }
}

fn default_max_lines() -> usize {
    5000
}
fn default_max_length() -> usize {
    200_000
}
fn default_structure_prompt_chars() -> usize {
    15_000
}
fn default_fetch_timeout_secs() -> u64 {
    15
}
fn default_max_fetch_bytes() -> u64 {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// Read, parse and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Check cross-field constraints that serde defaults cannot express.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.size == 0 {
        anyhow::bail!("chunking.size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.size {
        anyhow::bail!(
            "chunking.overlap ({}) must be smaller than chunking.size ({})",
            config.chunking.overlap,
            config.chunking.size
        );
    }

    if config.retrieval.k < 1 {
        anyhow::bail!("retrieval.k must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, or local.",
            other
        ),
    }
    if config.embedding.provider == "ollama" && config.embedding.model.is_none() {
        anyhow::bail!("embedding.model must be specified when provider is 'ollama'");
    }

    match config.model.provider.as_str() {
        "disabled" | "gemini" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown model provider: '{}'. Must be disabled, gemini, or ollama.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.model.temperature) {
        anyhow::bail!("model.temperature must be in [0.0, 2.0]");
    }

    if config.limits.max_lines == 0 || config.limits.max_length == 0 {
        anyhow::bail!("limits.max_lines and limits.max_length must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(validate(&config).is_ok());
        assert_eq!(config.chunking.size, 800);
        assert_eq!(config.chunking.overlap, 100);
        assert_eq!(config.retrieval.k, 5);
        assert!(!config.model.is_enabled());
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn test_partial_file_uses_field_defaults() {
        let config: Config = toml::from_str(
            r#"
[model]
provider = "gemini"

[retrieval]
k = 3
"#,
        )
        .unwrap();
        assert_eq!(config.retrieval.k, 3);
        assert_eq!(config.model.name, "gemini-2.0-flash");
        assert_eq!(config.model.api_key_env, "GEMINI_API_KEY");
        assert_eq!(config.chunking.size, 800);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let config: Config = toml::from_str("[chunking]\nsize = 100\noverlap = 100\n").unwrap();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("overlap"), "{}", err);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config: Config = toml::from_str("[model]\nprovider = \"davinci\"\n").unwrap();
        assert!(validate(&config).is_err());

        let config: Config = toml::from_str("[embedding]\nprovider = \"openai\"\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_load_config_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("hypothesi.toml");
        std::fs::write(&path, "[server]\nbind = \"0.0.0.0:9000\"\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");

        assert!(load_config(&dir.path().join("missing.toml")).is_err());
    }
}
