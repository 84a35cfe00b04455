//! HTTP + HTML extractor
//!
//! Fetches a page with reqwest, then uses the scraper crate to:
//! - pull title/authors/date from citation and OpenGraph meta tags
//! - pick the main content container and drop navigation and boilerplate
//!
//! No JavaScript rendering; PDFs are reported as inaccessible.

use super::{ContentExtractor, ExtractionError, MIN_BODY_CHARS};
use crate::models::{ContentMetadata, ExtractedContent, PaperReference};
use crate::types::{AppError, AppResult};
use crate::utils::{clean_text, with_retry, RetryPolicy};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use scraper::{ElementRef, Html, Node, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};

// Browser-like User-Agent; several publishers refuse unknown clients
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Containers tried in order before falling back to <body>
const MAIN_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role='main']",
    "#content",
    "#main-content",
    ".content",
    ".post-content",
    ".entry-content",
    "#abs",
];

/// Elements whose text never belongs to the article body
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "form", "svg", "button", "template",
];

const TITLE_META: &[&str] = &["citation_title", "og:title", "dc.title"];
const AUTHOR_META: &[&str] = &["citation_author", "author", "dc.creator"];
const DATE_META: &[&str] = &[
    "citation_publication_date",
    "citation_date",
    "article:published_time",
    "dc.date",
    "date",
];

pub struct HttpExtractor {
    client: reqwest::Client,
    timeout: Duration,
    retry: RetryPolicy,
}

impl HttpExtractor {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            timeout,
            retry,
        })
    }

    pub fn from_config(config: &crate::config::PipelineConfig) -> AppResult<Self> {
        Self::new(config.request_timeout, RetryPolicy::from_config(config))
    }

    /// Fetch raw page text, rejecting non-HTML payloads
    async fn fetch_page(&self, url: &str) -> Result<(String, bool), ExtractionError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ExtractionError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionError::Http {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_lowercase();

        let is_html = content_type.contains("html") || content_type.contains("xml");
        if !is_html && !content_type.starts_with("text/plain") {
            return Err(ExtractionError::UnsupportedContent(content_type));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ExtractionError::Timeout(self.timeout)
            } else {
                ExtractionError::Body(e.to_string())
            }
        })?;

        debug!(url, bytes = body.len(), content_type = %content_type, "Fetched page");
        Ok((body, is_html))
    }

    async fn fetch_and_parse(&self, url: &str) -> Result<(String, ContentMetadata), ExtractionError> {
        let (body, is_html) = self.fetch_page(url).await?;

        if is_html {
            parse_document(&body)
        } else {
            let text = clean_text(&body);
            if text.chars().count() < MIN_BODY_CHARS {
                return Err(ExtractionError::EmptyContent);
            }
            Ok((text, ContentMetadata::default()))
        }
    }
}

#[async_trait]
impl ContentExtractor for HttpExtractor {
    async fn extract(&self, reference: &PaperReference) -> ExtractedContent {
        let url = reference.url.as_str();

        match with_retry(&self.retry, "extract", || self.fetch_and_parse(url)).await {
            Ok((body_text, metadata)) => {
                info!(url, chars = body_text.chars().count(), "Extracted article text");
                ExtractedContent::success(reference.clone(), body_text, metadata)
            }
            Err(e) => {
                warn!(url, error = %e, "Extraction failed");
                ExtractedContent::failure(reference.clone(), e.to_string())
            }
        }
    }
}

/// Parse an HTML page into cleaned body text and metadata
pub fn parse_document(html: &str) -> Result<(String, ContentMetadata), ExtractionError> {
    let document = Html::parse_document(html);
    let metadata = extract_metadata(&document);
    let body = extract_body(&document);

    if body.chars().count() < MIN_BODY_CHARS {
        return Err(ExtractionError::EmptyContent);
    }
    Ok((body, metadata))
}

fn extract_body(document: &Html) -> String {
    for selector_str in MAIN_SELECTORS {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(main) = document.select(&selector).next() {
                let text = collect_text(main);
                if text.chars().count() >= MIN_BODY_CHARS {
                    return text;
                }
            }
        }
    }

    // Fallback: whole body minus boilerplate
    Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next())
        .map(collect_text)
        .unwrap_or_default()
}

/// Text of `root`, skipping anything nested inside a boilerplate element
fn collect_text(root: ElementRef) -> String {
    let mut out = String::new();

    for node in root.descendants() {
        if let Node::Text(text) = node.value() {
            let skipped = node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|el| SKIPPED_TAGS.contains(&el.value().name()));
            if !skipped {
                out.push_str(text);
                out.push(' ');
            }
        }
    }

    clean_text(&out)
}

fn extract_metadata(document: &Html) -> ContentMetadata {
    let meta: Vec<(String, String)> = Selector::parse("meta")
        .map(|selector| {
            document
                .select(&selector)
                .filter_map(|el| {
                    let key = el
                        .value()
                        .attr("name")
                        .or_else(|| el.value().attr("property"))?
                        .to_lowercase();
                    let content = clean_text(el.value().attr("content")?);
                    (!content.is_empty()).then_some((key, content))
                })
                .collect()
        })
        .unwrap_or_default();

    let first = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| meta.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()))
    };

    let title = first(TITLE_META).or_else(|| {
        Selector::parse("title")
            .ok()
            .and_then(|selector| document.select(&selector).next())
            .map(|el| clean_text(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty())
    });

    // Citation tags list one author per tag; the generic tags hold a single string
    let authors = AUTHOR_META
        .iter()
        .map(|key| {
            meta.iter()
                .filter(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .collect::<Vec<_>>()
        })
        .find(|values| !values.is_empty())
        .unwrap_or_default();

    ContentMetadata {
        title,
        authors,
        published: first(DATE_META),
    }
}
