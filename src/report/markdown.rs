// Markdown and terminal rendering for review reports.
// Rendering reads only the report (never the clock), so output is stable for a given report.

use crate::models::{ItemStatus, ReviewItem, ReviewReport};
use crate::utils::{clean_text, truncate_chars};

pub const EXTRACTION_FAILED_MARKER: &str = "⚠️ **Extraction failed:**";
pub const ANALYSIS_FAILED_MARKER: &str = "⚠️ **Analysis failed:**";

/// Characters of extracted text shown as a description preview
const PREVIEW_CHARS: usize = 500;

/// Render the full markdown export: a header, then one level-2 section per item in report order
pub fn render_markdown(report: &ReviewReport) -> String {
    let mut output = String::new();

    output.push_str("# Literature Review Results\n\n");
    output.push_str(&format!("**Search query:** {}\n\n", clean_text(&report.topic)));
    output.push_str(&format!(
        "*Generated on: {}*\n\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!("**Sources:** {}\n\n", counts_line(report)));

    if report.partial {
        output.push_str(&format!(
            "> ⚠️ **Partial report:** the run was cancelled after {} of {} sources.\n\n",
            report.items.len(),
            report.discovered
        ));
    }

    if report.items.is_empty() {
        output.push_str("_No papers were found for this topic._\n");
        return output;
    }

    output.push_str("---\n");
    for (idx, item) in report.items.iter().enumerate() {
        render_item(&mut output, idx + 1, item);
    }

    output
}

fn render_item(output: &mut String, number: usize, item: &ReviewItem) {
    let title = clean_text(item.reference.display_title());
    output.push_str(&format!("\n## {}. {}\n\n", number, title));
    if let Some(article_title) = &item.extracted.metadata.title {
        let article_title = clean_text(article_title);
        if !article_title.is_empty() && !article_title.eq_ignore_ascii_case(&title) {
            output.push_str(&format!("**Article title:** {}\n\n", article_title));
        }
    }
    output.push_str(&format!("**Link:** {}\n\n", item.reference.url));
    output.push_str(&format!("**Status:** {}\n\n", item.status));

    let metadata = &item.extracted.metadata;
    if !metadata.authors.is_empty() {
        output.push_str(&format!("**Authors:** {}\n\n", metadata.authors.join("; ")));
    }
    if let Some(published) = &metadata.published {
        output.push_str(&format!("**Published:** {}\n\n", published));
    }

    match item.status {
        ItemStatus::ExtractFailed => {
            output.push_str(&format!(
                "> {} {}. This source was skipped and not analyzed.\n\n",
                EXTRACTION_FAILED_MARKER,
                failure_text(item)
            ));
            if let Some(snippet) = &item.reference.snippet {
                output.push_str(&format!("**Search snippet:** {}\n\n", clean_text(snippet)));
            }
        }
        ItemStatus::AnalysisFailed => {
            output.push_str(&format!("> {} {}\n\n", ANALYSIS_FAILED_MARKER, failure_text(item)));
            render_preview(output, item);
        }
        ItemStatus::Ok => {
            render_preview(output, item);
            render_analysis(output, item);
        }
    }

    output.push_str("---\n");
}

fn failure_text(item: &ReviewItem) -> String {
    item.failure_reason()
        .map(clean_text)
        .filter(|reason| !reason.is_empty())
        .unwrap_or_else(|| "unknown error".to_string())
}

fn render_preview(output: &mut String, item: &ReviewItem) {
    let (preview, truncated) = truncate_chars(&item.extracted.body_text, PREVIEW_CHARS);
    if preview.is_empty() {
        return;
    }
    let ellipsis = if truncated { "..." } else { "" };
    output.push_str(&format!(
        "**Description:**\n{}{}\n\n",
        escape_block(preview.trim_end()),
        ellipsis
    ));
}

fn render_analysis(output: &mut String, item: &ReviewItem) {
    let analysis = &item.analysis;

    output.push_str(&format!("**Summary:**\n{}\n\n", escape_block(&analysis.summary)));

    if let Some(methodology) = &analysis.methodology {
        output.push_str(&format!("**Methodology:** {}\n\n", methodology));
    }

    if !analysis.key_findings.is_empty() {
        output.push_str("**Key Findings:**\n");
        for finding in &analysis.key_findings {
            output.push_str(&format!("- {}\n", finding));
        }
        output.push('\n');
    }

    let relevance = if analysis.relevance_notes.is_empty() {
        "_Not provided._".to_string()
    } else {
        escape_block(&analysis.relevance_notes)
    };
    output.push_str(&format!("**Relevance:**\n{}\n\n", relevance));
}

/// Free text placed at the start of a line must not open a heading or a setext underline
fn escape_block(text: &str) -> String {
    text.lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let indent = &line[..line.len() - trimmed.len()];
            let is_underline = !trimmed.is_empty() && trimmed.trim_end().chars().all(|c| c == '-' || c == '=');
            if trimmed.starts_with('#') || is_underline {
                format!("{}\\{}", indent, trimmed)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn counts_line(report: &ReviewReport) -> String {
    format!(
        "{} processed, {} analyzed, {} extraction failed, {} analysis failed",
        report.items.len(),
        report.count_with(ItemStatus::Ok),
        report.count_with(ItemStatus::ExtractFailed),
        report.count_with(ItemStatus::AnalysisFailed)
    )
}

/// Compact terminal display: one status line per item plus totals
pub fn render_summary(report: &ReviewReport) -> String {
    let mut output = String::new();
    output.push_str(&format!("Literature review: {}\n", clean_text(&report.topic)));
    output.push_str(&format!(
        "Generated: {}\n\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    if report.items.is_empty() {
        output.push_str("No papers were found for this topic.\n");
    }

    for (idx, item) in report.items.iter().enumerate() {
        let status = format!("[{}]", item.status);
        output.push_str(&format!(
            "{:>3}. {:<19} {}\n",
            idx + 1,
            status,
            clean_text(item.reference.display_title())
        ));
        if !item.status.is_ok() {
            output.push_str(&format!("     {}\n", failure_text(item)));
        }
    }

    output.push_str(&format!("\n{}\n", counts_line(report)));
    if report.partial {
        output.push_str(&format!(
            "Partial: cancelled after {} of {} sources\n",
            report.items.len(),
            report.discovered
        ));
    }
    output
}
