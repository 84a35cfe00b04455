//! Report Aggregation
//!
//! Assembles processed items into a `ReviewReport` and renders it:
//! - `render_markdown` for the exported document
//! - `render_summary` for a compact terminal display

pub mod markdown;

pub use markdown::{render_markdown, render_summary, ANALYSIS_FAILED_MARKER, EXTRACTION_FAILED_MARKER};

use crate::models::{ItemStatus, ReviewItem, ReviewReport};
use chrono::Utc;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Build a complete report; one item per discovered reference
pub fn build_report(topic: &str, items: Vec<ReviewItem>) -> ReviewReport {
    let discovered = items.len();
    build_partial_report(topic, items, discovered)
}

/// Build a report that may cover fewer items than were discovered (cancelled run)
pub fn build_partial_report(topic: &str, items: Vec<ReviewItem>, discovered: usize) -> ReviewReport {
    let items: Vec<ReviewItem> = items
        .into_iter()
        .map(|mut item| {
            item.status = ItemStatus::from_parts(&item.extracted, &item.analysis);
            item
        })
        .collect();

    ReviewReport {
        run_id: Uuid::new_v4(),
        topic: topic.trim().to_string(),
        partial: items.len() < discovered,
        discovered,
        items,
        generated_at: Utc::now(),
    }
}

/// File name used for exports, derived from the generation time
pub fn export_file_name(report: &ReviewReport) -> String {
    format!(
        "literature_review_{}.md",
        report.generated_at.format("%Y%m%d_%H%M%S")
    )
}

/// Write the markdown rendering of `report` into `dir`, returning the file path
pub async fn export_markdown(report: &ReviewReport, dir: &Path) -> Result<PathBuf, ReportError> {
    tokio::fs::create_dir_all(dir).await.map_err(|source| ReportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = dir.join(export_file_name(report));
    tokio::fs::write(&path, render_markdown(report))
        .await
        .map_err(|source| ReportError::Io {
            path: path.clone(),
            source,
        })?;

    info!(path = %path.display(), items = report.items.len(), "Exported markdown report");
    Ok(path)
}
