//! Source ingestion: turn a source identifier into normalized text.
//!
//! Dispatch order:
//!
//! 1. An existing local file: `.pdf` goes through PDF extraction, anything
//!    else is read as UTF-8 text.
//! 2. An arXiv identifier such as `2310.06825` or `2310.06825v2`: the entry's
//!    title and abstract are fetched from the arXiv Atom API.
//! 3. An `http`/`https` URL: PDFs (by content type or `.pdf` path) are
//!    extracted, everything else is treated as HTML.
//! 4. Anything else is the document text itself.
//!
//! The result is normalized with the configured limits. Failures are typed
//! [`IngestError`]s; callers that speak JSON render them with
//! [`IngestError::to_json`].

use regex::Regex;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use thiserror::Error;

use crate::config::{Config, LimitsConfig};
use crate::extract::{extract_html, extract_pdf, is_pdf_content_type, parse_arxiv_feed, ExtractError};
use crate::normalize::{normalize, normalize_bytes};

const ARXIV_API: &str = "http://export.arxiv.org/api/query";

const USER_AGENT: &str = concat!("hypothesi/", env!("CARGO_PKG_VERSION"));

static ARXIV_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}\.\d{4,5}(v\d+)?$").unwrap());

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("unsupported source: {0}")]
    Unsupported(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("source produced no text")]
    Empty,
}

impl IngestError {
    /// The `{ "error": true, "message": ... }` object returned to callers.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": true,
            "message": format!("Ingestion failed: {}", self),
        })
    }
}

/// Load and normalize the text behind `source`.
pub fn load_source(source: &str, config: &Config) -> Result<String, IngestError> {
    let limits = &config.limits;
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err(IngestError::Empty);
    }

    let single_token = !trimmed.contains(char::is_whitespace);
    let text = if single_token && Path::new(trimmed).is_file() {
        tracing::debug!(path = trimmed, "ingesting local file");
        read_local(Path::new(trimmed), limits)?
    } else if ARXIV_ID.is_match(trimmed) {
        tracing::debug!(id = trimmed, "ingesting arXiv entry");
        fetch_arxiv(trimmed, limits)?
    } else if let Some(scheme) = single_token.then(|| url_scheme(trimmed)).flatten() {
        match scheme.to_ascii_lowercase().as_str() {
            "http" | "https" => {
                tracing::debug!(url = trimmed, "ingesting URL");
                fetch_url(trimmed, limits)?
            }
            other => return Err(IngestError::Unsupported(format!("{} URL", other))),
        }
    } else if single_token && looks_like_file(trimmed) {
        return Err(IngestError::NotFound(trimmed.to_string()));
    } else {
        tracing::debug!(chars = trimmed.chars().count(), "ingesting raw text");
        source.to_string()
    };

    let normalized = normalize(&text, limits.max_lines, limits.max_length);
    if normalized.is_empty() {
        return Err(IngestError::Empty);
    }
    Ok(normalized)
}

fn read_local(path: &Path, limits: &LimitsConfig) -> Result<String, IngestError> {
    let bytes = std::fs::read(path)
        .map_err(|e| IngestError::NotFound(format!("{}: {}", path.display(), e)))?;
    if has_pdf_extension(&path.to_string_lossy()) {
        return Ok(extract_pdf(&bytes)?);
    }
    Ok(normalize_bytes(&bytes, limits.max_lines, limits.max_length))
}

fn fetch_arxiv(id: &str, limits: &LimitsConfig) -> Result<String, IngestError> {
    let url = format!("{}?search_query=id:{}&max_results=1", ARXIV_API, id);
    let (_, body) = fetch(&url, limits)?;
    let xml = String::from_utf8(body).map_err(|e| IngestError::Fetch(e.to_string()))?;
    Ok(parse_arxiv_feed(&xml)?)
}

fn fetch_url(url: &str, limits: &LimitsConfig) -> Result<String, IngestError> {
    let (content_type, body) = fetch(url, limits)?;
    let path = url.split(['?', '#']).next().unwrap_or(url);

    if is_pdf_content_type(&content_type) || has_pdf_extension(path) {
        return Ok(extract_pdf(&body)?);
    }
    Ok(extract_html(&String::from_utf8_lossy(&body)))
}

/// GET `url` and return its content type and body, bounded by the limits.
fn fetch(url: &str, limits: &LimitsConfig) -> Result<(String, Vec<u8>), IngestError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(limits.fetch_timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| IngestError::Fetch(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| IngestError::Fetch(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(IngestError::Fetch(format!("HTTP {} for {}", status.as_u16(), url)));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let max = limits.max_fetch_bytes;
    let mut body = Vec::new();
    response
        .take(max + 1)
        .read_to_end(&mut body)
        .map_err(|e| IngestError::Fetch(e.to_string()))?;
    if body.len() as u64 > max {
        return Err(IngestError::Fetch(format!("response exceeds {} bytes", max)));
    }

    tracing::debug!(url, bytes = body.len(), content_type = %content_type, "fetched");
    Ok((content_type, body))
}

/// The scheme of `scheme://rest`, if `source` has that shape.
fn url_scheme(source: &str) -> Option<&str> {
    let (scheme, rest) = source.split_once("://")?;
    let valid = !scheme.is_empty()
        && !rest.is_empty()
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

fn has_pdf_extension(path: &str) -> bool {
    path.to_ascii_lowercase().ends_with(".pdf")
}

/// A single token naming a document file that does not exist.
fn looks_like_file(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    [".pdf", ".txt", ".md", ".html", ".htm"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}
