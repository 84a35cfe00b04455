//! Content Extraction
//!
//! Turns a discovered reference into readable body text plus page metadata.
//! Extraction never fails the run: every outcome, good or bad, is an
//! `ExtractedContent` carrying either text or a descriptive error.

pub mod html;

pub use html::{parse_document, HttpExtractor};

use crate::models::{ExtractedContent, PaperReference};
use crate::utils::Retryable;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Bodies shorter than this are treated as inaccessible (paywalls, JS shells, cookie walls)
pub const MIN_BODY_CHARS: usize = 80;

#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status} fetching page")]
    Http { status: u16 },

    #[error("unsupported content type '{0}' (content not accessible, might be a PDF or protected content)")]
    UnsupportedContent(String),

    #[error("no readable article text found")]
    EmptyContent,

    #[error("failed to read response body: {0}")]
    Body(String),
}

impl ExtractionError {
    pub(crate) fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            ExtractionError::Timeout(timeout)
        } else if let Some(status) = error.status() {
            ExtractionError::Http {
                status: status.as_u16(),
            }
        } else {
            ExtractionError::Network(error.to_string())
        }
    }
}

impl Retryable for ExtractionError {
    fn is_retryable(&self) -> bool {
        match self {
            ExtractionError::Timeout(_) | ExtractionError::Network(_) => true,
            ExtractionError::Http { status } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Fetch and clean one reference. Must not panic or propagate errors.
    async fn extract(&self, reference: &PaperReference) -> ExtractedContent;
}
