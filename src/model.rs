//! Generative-model boundary.
//!
//! Stages see a model only through the [`Model`] trait: a prompt goes in, a
//! string comes out, or a typed [`ModelError`] explains why not. Two HTTP
//! clients are provided:
//! - **[`GeminiModel`]**: Google Generative Language `generateContent`.
//! - **[`OllamaModel`]**: a local Ollama instance's `/api/generate`.
//!
//! [`FnModel`] adapts a closure, which is how tests and embedders supply
//! scripted models.
//!
//! Clients never retry. A failed call is reported immediately so the calling
//! stage can take its heuristic path.

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::config::ModelConfig;
use crate::normalize::{collapse_whitespace, truncate_chars};

/// Longest prompt sent to a model, in characters.
pub const MAX_PROMPT_CHARS: usize = 90_000;

/// Why a model call produced no usable text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("model provider is disabled")]
    Disabled,
    #[error("environment variable {0} is not set")]
    MissingApiKey(String),
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("model rejected credentials (HTTP {0})")]
    Auth(u16),
    #[error("model API error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("model transport error: {0}")]
    Transport(String),
    #[error("model returned no text")]
    EmptyResponse,
    #[error("malformed model response: {0}")]
    Malformed(String),
}

/// Per-call settings.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Name of the calling stage, for logs.
    pub stage: &'static str,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl CallOptions {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            max_output_tokens: 1024,
            temperature: 0.2,
        }
    }

    /// Options carrying the configured token budget and temperature.
    pub fn from_config(stage: &'static str, config: &ModelConfig) -> Self {
        Self {
            stage,
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
        }
    }

    /// Lower the token budget to `cap` if it is larger.
    pub fn cap_output_tokens(mut self, cap: u32) -> Self {
        self.max_output_tokens = self.max_output_tokens.min(cap);
        self
    }

}

/// A generative model: text in, text out, may fail.
///
/// Implementations must be safe to call repeatedly; any cached client handle
/// is reused across calls.
pub trait Model: Send + Sync {
    fn name(&self) -> &str;

    fn complete(&self, prompt: &str, opts: &CallOptions) -> Result<String, ModelError>;
}

/// Closure-backed [`Model`].
pub struct FnModel<F> {
    name: String,
    f: F,
}

impl<F> FnModel<F>
where
    F: Fn(&str, &CallOptions) -> Result<String, ModelError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Model for FnModel<F>
where
    F: Fn(&str, &CallOptions) -> Result<String, ModelError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn complete(&self, prompt: &str, opts: &CallOptions) -> Result<String, ModelError> {
        (self.f)(prompt, opts)
    }
}

/// Flatten and bound a prompt before it leaves the process.
pub fn prepare_prompt(prompt: &str) -> String {
    let flat = collapse_whitespace(prompt);
    truncate_chars(&flat, MAX_PROMPT_CHARS).to_string()
}

/// Cut the JSON payload out of a model reply.
///
/// Strips Markdown code fences and any prose before the first `{`/`[` or
/// after the last `}`/`]`. The returned slice is not validated.
pub fn extract_json(reply: &str) -> String {
    let unfenced = reply.replace("```json", "").replace("```", "");
    let trimmed = unfenced.trim();

    let start = trimmed.find(['{', '[']);
    let end = trimmed.rfind(['}', ']']);
    match (start, end) {
        (Some(s), Some(e)) if e >= s => trimmed[s..=e].to_string(),
        _ => trimmed.to_string(),
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::blocking::Client, ModelError> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ModelError::Transport(e.to_string()))
}

fn map_send_error(e: reqwest::Error, timeout: Duration) -> ModelError {
    if e.is_timeout() {
        ModelError::Timeout(timeout)
    } else {
        ModelError::Transport(e.to_string())
    }
}

fn check_status(response: reqwest::blocking::Response) -> Result<Value, ModelError> {
    let status = response.status();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(ModelError::Auth(status.as_u16()));
    }
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(ModelError::Http {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<Value>()
        .map_err(|e| ModelError::Malformed(e.to_string()))
}

// ============ Gemini ============

pub struct GeminiModel {
    name: String,
    base_url: String,
    api_key: String,
    timeout: Duration,
    client: reqwest::blocking::Client,
}

impl GeminiModel {
    /// Build a client; the API key is read from `config.api_key_env`.
    pub fn new(config: &ModelConfig) -> Result<Self, ModelError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ModelError::MissingApiKey(config.api_key_env.clone()))?;
        let timeout = Duration::from_secs(config.timeout_secs);

        Ok(Self {
            name: config.name.clone(),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            api_key,
            timeout,
            client: http_client(timeout)?,
        })
    }
}

impl Model for GeminiModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn complete(&self, prompt: &str, opts: &CallOptions) -> Result<String, ModelError> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prepare_prompt(prompt) }] }],
            "generationConfig": {
                "maxOutputTokens": opts.max_output_tokens,
                "temperature": opts.temperature,
            },
        });

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url.trim_end_matches('/'),
                self.name
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| map_send_error(e, self.timeout))?;

        parse_gemini_response(&check_status(response)?)
    }
}

fn parse_gemini_response(json: &Value) -> Result<String, ModelError> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| ModelError::Malformed("missing candidates[0].content.parts".to_string()))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.trim().is_empty() {
        return Err(ModelError::EmptyResponse);
    }
    Ok(text)
}

// ============ Ollama ============

pub struct OllamaModel {
    name: String,
    url: String,
    timeout: Duration,
    client: reqwest::blocking::Client,
}

impl OllamaModel {
    pub fn new(config: &ModelConfig) -> Result<Self, ModelError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            name: config.name.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            timeout,
            client: http_client(timeout)?,
        })
    }
}

impl Model for OllamaModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn complete(&self, prompt: &str, opts: &CallOptions) -> Result<String, ModelError> {
        let body = serde_json::json!({
            "model": self.name,
            "prompt": prepare_prompt(prompt),
            "stream": false,
            "options": {
                "temperature": opts.temperature,
                "num_predict": opts.max_output_tokens,
            },
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.url.trim_end_matches('/')))
            .json(&body)
            .send()
            .map_err(|e| map_send_error(e, self.timeout))?;

        let json = check_status(response)?;
        match json.get("response").and_then(|r| r.as_str()) {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            Some(_) => Err(ModelError::EmptyResponse),
            None => Err(ModelError::Malformed("missing response field".to_string())),
        }
    }
}

/// Create the configured model client.
///
/// `name_override` replaces `config.name` (the per-request model identifier).
/// A disabled provider is reported as [`ModelError::Disabled`].
pub fn create_model(
    config: &ModelConfig,
    name_override: Option<&str>,
) -> Result<std::sync::Arc<dyn Model>, ModelError> {
    let mut config = config.clone();
    if let Some(name) = name_override.filter(|n| !n.trim().is_empty()) {
        config.name = name.to_string();
    }

    match config.provider.as_str() {
        "gemini" => Ok(std::sync::Arc::new(GeminiModel::new(&config)?)),
        "ollama" => Ok(std::sync::Arc::new(OllamaModel::new(&config)?)),
        _ => Err(ModelError::Disabled),
    }
}
