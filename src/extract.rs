//! Text extraction for the formats a review source can arrive in.
//!
//! Callers supply bytes or markup; this module returns plain UTF-8 text with
//! one line per text block so section headers stay at line starts.

use quick_xml::events::Event;
use quick_xml::Reader;
use scraper::{Html, Node};
use thiserror::Error;

use crate::normalize::collapse_whitespace;

pub const MIME_PDF: &str = "application/pdf";

/// Elements whose text never reaches the review.
const HTML_SKIP: [&str; 8] = [
    "script", "style", "nav", "footer", "header", "aside", "form", "svg",
];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("feed parsing failed: {0}")]
    Feed(String),
}

/// Whether `content_type` (as sent in an HTTP header) denotes a PDF.
pub fn is_pdf_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(MIME_PDF))
}

pub fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Visible text of an HTML page, one line per text node.
pub fn extract_html(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();

    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| HTML_SKIP.contains(&e.name()))
        });
        if hidden {
            continue;
        }
        let line = collapse_whitespace(text);
        if line.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&line);
    }

    out
}

/// Title and summary of every entry in an arXiv Atom feed.
///
/// Each entry becomes a title line, an `Abstract` header line and the
/// summary; entries are separated by a blank line.
pub fn parse_arxiv_feed(xml: &str) -> Result<String, ExtractError> {
    #[derive(Clone, Copy)]
    enum Field {
        Title,
        Summary,
    }

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut in_entry = false;
    let mut field: Option<Field> = None;
    let mut title = String::new();
    let mut summary = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"entry" => {
                    in_entry = true;
                    title.clear();
                    summary.clear();
                }
                b"title" if in_entry => field = Some(Field::Title),
                b"summary" if in_entry => field = Some(Field::Summary),
                _ => {}
            },
            Ok(Event::Text(te)) => {
                if let Some(f) = field {
                    let text = te.unescape().map_err(|e| ExtractError::Feed(e.to_string()))?;
                    let target = match f {
                        Field::Title => &mut title,
                        Field::Summary => &mut summary,
                    };
                    target.push(' ');
                    target.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"entry" => {
                    in_entry = false;
                    let summary = collapse_whitespace(&summary);
                    if !summary.is_empty() {
                        entries.push(format!(
                            "{}\nAbstract\n{}",
                            collapse_whitespace(&title),
                            summary
                        ));
                    }
                }
                b"title" | b"summary" => field = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Feed(e.to_string())),
            _ => {}
        }
    }

    Ok(entries.join("\n\n"))
}
