//! Search Module
//!
//! Source discovery for a review topic. The `SourceDiscovery` trait is the seam the
//! pipeline depends on; `SerpApiClient` implements it with:
//! - Google Scholar (primary) - academic papers
//! - Google Light (secondary) - domain-filtered web search when Scholar comes up short

pub mod serpapi;

pub use serpapi::{CombinedSearchResults, LightResult, ScholarResult, SearchError, SerpApiClient};

use crate::models::PaperReference;
use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// Errors that abort a run before any paper is processed
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    #[error("Search is not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid search query: {0}")]
    InvalidQuery(String),

    #[error("Search backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SourceDiscovery: Send + Sync {
    /// Return at most `max_results` references for `topic`, deduplicated by url,
    /// in the relevance order of the upstream engine.
    async fn discover(&self, topic: &str, max_results: usize) -> Result<Vec<PaperReference>, DiscoveryError>;
}

/// Build the academic web query, restricted to the given domains
pub fn build_academic_query(topic: &str, domains: &[String]) -> String {
    let topic = topic.trim();
    if domains.is_empty() {
        return format!("{} (research OR paper OR study OR journal)", topic);
    }

    let domain_query = domains
        .iter()
        .map(|d| format!("site:{}", d))
        .collect::<Vec<_>>()
        .join(" OR ");
    format!("{} (research OR paper OR study OR journal) ({})", topic, domain_query)
}

/// Canonical form used for deduplication; None for anything that is not an http(s) url
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.host_str()?;
    url.set_fragment(None);

    let mut normalized = url.to_string();
    if url.query().is_none() && normalized.ends_with('/') {
        normalized.pop();
    }
    Some(normalized)
}

/// Drop references with unusable or repeated urls, keep first occurrence order, cap at `limit`
pub fn dedupe_references<I>(references: I, limit: usize) -> Vec<PaperReference>
where
    I: IntoIterator<Item = PaperReference>,
{
    let mut seen = HashSet::new();
    references
        .into_iter()
        .filter(|reference| match normalize_url(&reference.url) {
            Some(key) => seen.insert(key),
            None => false,
        })
        .take(limit)
        .collect()
}
