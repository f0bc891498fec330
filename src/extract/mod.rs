
use std::time::Duration;

use anyhow::Context;
use scraper::{Html, Node};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::{RaglineError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Classification of an ingestion source reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    WebLink,
    PdfLink,
    RawText,
    Invalid,
}

/// Plain text extracted from a source, plus positional metadata.
/// Transient; exists only during ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    /// Origin identifier: URL, filename, or "manual"
    pub source: String,
    /// Page number for paginated sources
    pub page: Option<i64>,
}

/// Classify an ingestion request body. A parseable URL is a web link, or a
/// PDF link when its path ends in `.pdf`; anything else is only valid when
/// raw-text mode was explicitly requested.
#[inline]
pub fn classify_source(text: &str, raw_requested: bool) -> SourceKind {
    if raw_requested {
        return SourceKind::RawText;
    }

    match Url::parse(text.trim()) {
        Ok(url) => {
            if url.path().to_ascii_lowercase().ends_with(".pdf") {
                SourceKind::PdfLink
            } else {
                SourceKind::WebLink
            }
        }
        Err(_) => SourceKind::Invalid,
    }
}

/// Turns a source reference into plain text documents with positional
/// metadata. The ingestion pipeline only depends on this contract, so a
/// PDF-capable or test extractor can be substituted.
pub trait TextExtractor {
    fn extract(&self, reference: &str, kind: SourceKind) -> Result<Vec<Document>>;
}

/// Built-in extractor: fetches web links and passes raw text through.
/// PDF extraction is an external collaborator and is reported as such.
pub struct WebExtractor {
    agent: ureq::Agent,
}

impl WebExtractor {
    #[inline]
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Self { agent }
    }

    fn fetch_html(&self, url: &str) -> Result<String> {
        debug!("Fetching page content from {}", url);

        let body = self
            .agent
            .get(url)
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| RaglineError::Network(format!("Failed to fetch {}: {}", url, e)))?;

        Ok(body)
    }
}

impl Default for WebExtractor {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor for WebExtractor {
    #[inline]
    fn extract(&self, reference: &str, kind: SourceKind) -> Result<Vec<Document>> {
        match kind {
            SourceKind::RawText => Ok(vec![Document {
                text: reference.to_string(),
                source: "manual".to_string(),
                page: None,
            }]),
            SourceKind::WebLink => {
                validate_url(reference)?;
                let html = self.fetch_html(reference)?;
                let text = extract_text_content(&html);

                Ok(vec![Document {
                    text,
                    source: reference.to_string(),
                    page: None,
                }])
            }
            SourceKind::PdfLink => Err(RaglineError::Input(format!(
                "PDF source '{}' requires an external PDF extractor",
                reference
            ))),
            SourceKind::Invalid => Err(RaglineError::Input(format!(
                "Invalid source reference: '{}'",
                reference
            ))),
        }
    }
}

/// Extract the visible text of an HTML page: every text node under `body`
/// except inside script/style/noscript/iframe/svg, plus alt and title
/// attribute values, joined with single spaces.
#[inline]
pub fn extract_text_content(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut parts: Vec<String> = Vec::new();
    let body = document
        .tree
        .root()
        .descendants()
        .find(|node| matches!(node.value(), Node::Element(el) if el.name() == "body"));

    if let Some(body) = body {
        collect_text(body, &mut parts);
    }

    parts.join(" ")
}

fn collect_text(node: scraper::ego_tree::NodeRef<'_, Node>, parts: &mut Vec<String>) {
    match node.value() {
        Node::Text(text) => {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        }
        Node::Element(element) => {
            if matches!(
                element.name(),
                "script" | "style" | "noscript" | "iframe" | "svg"
            ) {
                return;
            }

            for child in node.children() {
                collect_text(child, parts);
            }

            for attr in ["alt", "title"] {
                if let Some(value) = element.attr(attr) {
                    let trimmed = value.trim();
                    if !trimmed.is_empty() {
                        parts.push(trimmed.to_string());
                    }
                }
            }
        }
        _ => {
            for child in node.children() {
                collect_text(child, parts);
            }
        }
    }
}

/// Validate that a string parses as an absolute http(s) URL
#[inline]
pub fn validate_url(text: &str) -> Result<Url> {
    let url = Url::parse(text.trim())
        .with_context(|| format!("Invalid URL: {}", text))
        .map_err(|e| RaglineError::Input(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(RaglineError::Input(format!(
            "Unsupported URL scheme: {}",
            url.scheme()
        )));
    }

    Ok(url)
}
