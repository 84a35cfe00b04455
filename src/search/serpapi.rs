//! SerpAPI Client
//!
//! Discovers candidate papers using SerpAPI for:
//! - Google Scholar: academic papers (primary)
//! - Google Light: quick web search over academic domains (secondary)
//!
//! ## Search Strategy
//!
//! 1. **Google Scholar (Primary)**: queried with the bare topic
//! 2. **Google Light (Secondary)**: queried with a `site:`-restricted academic query
//!    when Scholar is disabled, failed, or returned fewer results than requested
//!
//! Scholar results come first, Light results after, deduplicated by url.

use super::{build_academic_query, dedupe_references, DiscoveryError, SourceDiscovery};
use crate::config::SearchConfig;
use crate::models::PaperReference;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serpapi_search_rust::serp_api_search::SerpApiSearch;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const SCHOLAR_SOURCE: &str = "google_scholar";
pub const LIGHT_SOURCE: &str = "google_light";

/// Errors from a single search engine call
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse search results: {0}")]
    ParseError(String),

    #[error("Search engine not enabled: {0}")]
    EngineDisabled(String),
}

/// Result from a Google Scholar search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScholarResult {
    pub title: String,
    /// Short snippet/abstract from the paper
    pub snippet: String,
    pub link: Option<String>,
    /// PDF link if available
    pub pdf_link: Option<String>,
    /// "Authors - Venue, Year" line as Scholar prints it
    pub publication: Option<String>,
}

impl ScholarResult {
    fn into_reference(self) -> Option<PaperReference> {
        let url = self.link.or(self.pdf_link)?;
        let snippet = match self.publication {
            Some(publication) if !self.snippet.is_empty() => format!("{} ({})", self.snippet, publication),
            Some(publication) => publication,
            None => self.snippet,
        };
        Some(
            PaperReference::new(self.title, url)
                .with_snippet(snippet)
                .with_source(SCHOLAR_SOURCE),
        )
    }
}

/// Result from a Google Light search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightResult {
    pub title: String,
    pub snippet: String,
    pub link: String,
}

impl LightResult {
    fn into_reference(self) -> PaperReference {
        PaperReference::new(self.title, self.link)
            .with_snippet(self.snippet)
            .with_source(LIGHT_SOURCE)
    }
}

/// Combined search results from both engines
#[derive(Debug, Clone, Default)]
pub struct CombinedSearchResults {
    pub scholar_results: Vec<ScholarResult>,
    pub light_results: Vec<LightResult>,
    pub scholar_success: bool,
    pub light_success: bool,
    pub errors: Vec<String>,
}

impl CombinedSearchResults {
    /// Merge both engines into the final reference list, or fail when no engine answered
    pub fn into_references(self, limit: usize) -> Result<Vec<PaperReference>, DiscoveryError> {
        if !self.scholar_success && !self.light_success {
            let reason = if self.errors.is_empty() {
                "no search engine is enabled".to_string()
            } else {
                self.errors.join("; ")
            };
            return Err(DiscoveryError::Unavailable(reason));
        }

        let scholar = self
            .scholar_results
            .into_iter()
            .filter_map(ScholarResult::into_reference);
        let light = self.light_results.into_iter().map(LightResult::into_reference);

        Ok(dedupe_references(scholar.chain(light), limit))
    }
}

/// SerpAPI client for academic search
pub struct SerpApiClient {
    api_key: String,
    scholar_enabled: bool,
    light_enabled: bool,
    domains: Vec<String>,
    max_results_cap: usize,
}

impl SerpApiClient {
    pub fn new(api_key: String) -> Self {
        let defaults = SearchConfig::default();
        Self {
            api_key,
            scholar_enabled: defaults.scholar_enabled,
            light_enabled: defaults.light_enabled,
            domains: defaults.domains,
            max_results_cap: defaults.max_results_cap,
        }
    }

    /// Configure client from config
    pub fn from_config(config: &SearchConfig) -> Result<Self, DiscoveryError> {
        if config.serpapi_key.trim().is_empty() {
            return Err(DiscoveryError::NotConfigured(
                "SERPAPI_API_KEY is not set".to_string(),
            ));
        }

        Ok(Self {
            api_key: config.serpapi_key.clone(),
            scholar_enabled: config.scholar_enabled,
            light_enabled: config.light_enabled,
            domains: config.domains.clone(),
            max_results_cap: config.max_results_cap,
        })
    }

    /// Enable/disable Google Scholar
    pub fn with_scholar(mut self, enabled: bool) -> Self {
        self.scholar_enabled = enabled;
        self
    }

    /// Enable/disable Google Light
    pub fn with_light(mut self, enabled: bool) -> Self {
        self.light_enabled = enabled;
        self
    }

    async fn run_engine(&self, engine: &str, query: &str, limit: usize) -> Result<Value, SearchError> {
        let mut params = HashMap::<String, String>::new();
        params.insert("engine".to_string(), engine.to_string());
        params.insert("q".to_string(), query.to_string());
        params.insert("hl".to_string(), "en".to_string());
        params.insert("num".to_string(), limit.to_string());

        let search = SerpApiSearch::google(params, self.api_key.clone());
        let results = search
            .json()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        debug!(engine, "Raw SerpAPI response received");
        Ok(results)
    }

    /// Search Google Scholar for academic papers
    pub async fn search_scholar(&self, query: &str, limit: usize) -> Result<Vec<ScholarResult>, SearchError> {
        if !self.scholar_enabled {
            return Err(SearchError::EngineDisabled("Google Scholar".to_string()));
        }

        info!(query = %query, "Searching Google Scholar via SerpAPI");
        let results = self.run_engine(SCHOLAR_SOURCE, query, limit).await?;
        let parsed = parse_scholar_results(&results, limit)?;
        info!(count = parsed.len(), "Google Scholar search completed");
        Ok(parsed)
    }

    /// Search Google Light for domain-restricted web results
    pub async fn search_light(&self, query: &str, limit: usize) -> Result<Vec<LightResult>, SearchError> {
        if !self.light_enabled {
            return Err(SearchError::EngineDisabled("Google Light".to_string()));
        }

        info!(query = %query, "Searching Google Light via SerpAPI");
        let results = self.run_engine(LIGHT_SOURCE, query, limit).await?;
        let parsed: Vec<_> = parse_light_results(&results, limit)?
            .into_iter()
            .filter(|r| is_reliable_source(&r.link, &self.domains))
            .collect();
        info!(count = parsed.len(), "Google Light search completed");
        Ok(parsed)
    }

    /// Scholar first, Light as a top-up when Scholar is unavailable or short
    pub async fn search_combined(&self, topic: &str, limit: usize) -> CombinedSearchResults {
        let mut combined = CombinedSearchResults::default();

        if self.scholar_enabled {
            match self.search_scholar(topic, limit).await {
                Ok(results) => {
                    combined.scholar_results = results;
                    combined.scholar_success = true;
                }
                Err(e) => {
                    warn!(error = %e, "Scholar search failed");
                    combined.errors.push(format!("Scholar: {}", e));
                }
            }
        }

        let need_light = !combined.scholar_success || combined.scholar_results.len() < limit;

        if self.light_enabled && need_light {
            let query = build_academic_query(topic, &self.domains);
            match self.search_light(&query, limit).await {
                Ok(results) => {
                    combined.light_results = results;
                    combined.light_success = true;
                }
                Err(e) => {
                    warn!(error = %e, "Light search failed");
                    combined.errors.push(format!("Light: {}", e));
                }
            }
        }

        combined
    }
}

#[async_trait]
impl SourceDiscovery for SerpApiClient {
    async fn discover(&self, topic: &str, max_results: usize) -> Result<Vec<PaperReference>, DiscoveryError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(DiscoveryError::InvalidQuery("topic must not be empty".to_string()));
        }
        if max_results == 0 {
            return Err(DiscoveryError::InvalidQuery("max_results must be greater than 0".to_string()));
        }

        let limit = if max_results > self.max_results_cap {
            warn!(requested = max_results, cap = self.max_results_cap, "Clamping max_results to cap");
            self.max_results_cap
        } else {
            max_results
        };

        let references = self.search_combined(topic, limit).await.into_references(limit)?;
        info!(topic = %topic, count = references.len(), "Source discovery completed");
        Ok(references)
    }
}

/// SerpAPI reports an empty result page as an error string rather than an empty array
fn is_empty_result_error(message: &str) -> bool {
    message.contains("hasn't returned any results")
}

fn organic_results(results: &Value) -> Result<&[Value], SearchError> {
    if let Some(error) = results.get("error").and_then(|v| v.as_str()) {
        if is_empty_result_error(error) {
            return Ok(&[][..]);
        }
        return Err(SearchError::RequestFailed(error.to_string()));
    }

    match results.get("organic_results") {
        None => Ok(&[][..]),
        Some(organic) => organic
            .as_array()
            .map(|arr| arr.as_slice())
            .ok_or_else(|| SearchError::ParseError("Expected array of results".to_string())),
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse Scholar organic results; entries without a title are skipped
pub fn parse_scholar_results(results: &Value, limit: usize) -> Result<Vec<ScholarResult>, SearchError> {
    let parsed = organic_results(results)?
        .iter()
        .filter_map(|result| {
            let title = str_field(result, "title")?;

            let pdf_link = result
                .get("resources")
                .and_then(|r| r.as_array())
                .and_then(|arr| arr.first())
                .and_then(|res| str_field(res, "link"));

            let publication = result
                .get("publication_info")
                .and_then(|p| str_field(p, "summary"));

            Some(ScholarResult {
                title,
                snippet: str_field(result, "snippet").unwrap_or_default(),
                link: str_field(result, "link"),
                pdf_link,
                publication,
            })
        })
        .take(limit)
        .collect();

    Ok(parsed)
}

/// Parse Light organic results; entries without a title or link are skipped
pub fn parse_light_results(results: &Value, limit: usize) -> Result<Vec<LightResult>, SearchError> {
    let parsed = organic_results(results)?
        .iter()
        .filter_map(|result| {
            Some(LightResult {
                title: str_field(result, "title")?,
                snippet: str_field(result, "snippet").unwrap_or_default(),
                link: str_field(result, "link")?,
            })
        })
        .take(limit)
        .collect();

    Ok(parsed)
}

/// Check if a URL is from a reliable academic source or one of the requested domains
fn is_reliable_source(url: &str, extra_domains: &[String]) -> bool {
    let reliable_domains = [
        // Preprint servers and indexes
        "arxiv.org",
        "biorxiv.org",
        "medrxiv.org",
        "ssrn.com",
        "semanticscholar.org",
        "scholar.google.com",
        "researchgate.net",
        "pubmed.ncbi.nlm.nih.gov",
        "ncbi.nlm.nih.gov",
        // Publishers
        "nature.com",
        "science.org",
        "sciencedirect.com",
        "springer.com",
        "wiley.com",
        "ieee.org",
        "acm.org",
        "plos.org",
        "frontiersin.org",
        "mdpi.com",
        "aps.org",
        "iop.org",
        // Academic institutions
        ".edu",
        ".ac.uk",
    ];

    let url_lower = url.to_lowercase();
    reliable_domains.iter().any(|domain| url_lower.contains(domain))
        || extra_domains
            .iter()
            .any(|domain| url_lower.contains(&domain.to_lowercase()))
}
