// Core review models: references flow in from discovery, items flow out into the report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A discovered paper, prior to content retrieval. Identity is the url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperReference {
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    /// Search engine that produced this reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl PaperReference {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: None,
            source: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        let snippet = snippet.into();
        self.snippet = if snippet.trim().is_empty() { None } else { Some(snippet) };
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Title for display; falls back to the url the way untitled pages are shown
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.url
        } else {
            &self.title
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub reference: PaperReference,
    pub body_text: String,
    pub metadata: ContentMetadata,
    pub extracted_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractedContent {
    pub fn success(reference: PaperReference, body_text: String, metadata: ContentMetadata) -> Self {
        Self {
            reference,
            body_text,
            metadata,
            extracted_ok: true,
            error: None,
        }
    }

    pub fn failure(reference: PaperReference, error: impl Into<String>) -> Self {
        Self {
            reference,
            body_text: String::new(),
            metadata: ContentMetadata::default(),
            extracted_ok: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub reference: PaperReference,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub methodology: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_findings: Vec<String>,
    pub relevance_notes: String,
    pub analyzed_ok: bool,
    /// Analysis was never attempted because extraction failed
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    pub fn failure(reference: PaperReference, error: impl Into<String>) -> Self {
        Self {
            reference,
            summary: String::new(),
            methodology: None,
            key_findings: Vec::new(),
            relevance_notes: String::new(),
            analyzed_ok: false,
            skipped: false,
            error: Some(error.into()),
        }
    }

    pub fn skipped(reference: PaperReference) -> Self {
        Self {
            skipped: true,
            error: None,
            ..Self::failure(reference, String::new())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Ok,
    ExtractFailed,
    AnalysisFailed,
}

impl ItemStatus {
    pub fn from_parts(extracted: &ExtractedContent, analysis: &AnalysisResult) -> Self {
        if !extracted.extracted_ok {
            ItemStatus::ExtractFailed
        } else if !analysis.analyzed_ok {
            ItemStatus::AnalysisFailed
        } else {
            ItemStatus::Ok
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ItemStatus::Ok => "OK",
            ItemStatus::ExtractFailed => "EXTRACTION FAILED",
            ItemStatus::AnalysisFailed => "ANALYSIS FAILED",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ItemStatus::Ok)
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One processed paper; the unit of failure isolation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewItem {
    pub reference: PaperReference,
    pub extracted: ExtractedContent,
    pub analysis: AnalysisResult,
    pub status: ItemStatus,
}

impl ReviewItem {
    pub fn new(reference: PaperReference, extracted: ExtractedContent, analysis: AnalysisResult) -> Self {
        let status = ItemStatus::from_parts(&extracted, &analysis);
        Self {
            reference,
            extracted,
            analysis,
            status,
        }
    }

    /// Error message explaining why this item is not OK
    pub fn failure_reason(&self) -> Option<&str> {
        match self.status {
            ItemStatus::Ok => None,
            ItemStatus::ExtractFailed => self.extracted.error.as_deref(),
            ItemStatus::AnalysisFailed => self.analysis.error.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewReport {
    pub run_id: Uuid,
    pub topic: String,
    pub items: Vec<ReviewItem>,
    /// Number of references discovery returned for this run
    pub discovered: usize,
    /// Set when the run was cancelled before every reference was processed
    pub partial: bool,
    pub generated_at: DateTime<Utc>,
}

impl ReviewReport {
    pub fn count_with(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
