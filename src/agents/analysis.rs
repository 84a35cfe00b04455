//! Analysis Agent
//!
//! Asks the language model for a structured read of one extracted paper:
//! summary, methodology, key findings and relevance to the review topic.
//! Backend and parse failures are captured into the `AnalysisResult`; they never
//! escape to the pipeline.

use crate::config::Config;
use crate::llm::{BackendError, LLMAdapter};
use crate::models::{AnalysisResult, ExtractedContent};
use crate::types::{LLMMessage, LLMRequest};
use crate::utils::{clean_text, truncate_chars, with_retry, RetryPolicy};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

const SYSTEM_INSTRUCTION: &str = "You are a research assistant helping a student write a literature review. \
Be concise, factual and faithful to the provided text. If the text is inaccessible or unclear, say so.";

#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("could not parse model response: {0}")]
    Unparseable(String),
}

#[async_trait]
pub trait PaperAnalyzer: Send + Sync {
    /// Analyze one successfully extracted paper in the context of `topic`
    async fn analyze(&self, topic: &str, content: &ExtractedContent) -> AnalysisResult;
}

/// Structured fields pulled out of a model response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedAnalysis {
    pub summary: String,
    pub methodology: Option<String>,
    pub key_findings: Vec<String>,
    pub relevance_notes: String,
}

/// Raw JSON response from the model
#[derive(Debug, Deserialize)]
struct AnalysisLLMResponse {
    summary: String,
    #[serde(default)]
    methodology: Option<String>,
    #[serde(default)]
    key_findings: Vec<String>,
    #[serde(default, alias = "relevance")]
    relevance_notes: Option<String>,
}

pub struct AnalysisAgent {
    llm: Arc<dyn LLMAdapter>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_input_chars: usize,
    retry: RetryPolicy,
}

impl AnalysisAgent {
    pub fn new(llm: Arc<dyn LLMAdapter>, model: impl Into<String>, max_input_chars: usize) -> Self {
        Self {
            llm,
            model: model.into(),
            temperature: 0.3,
            max_tokens: 1024,
            max_input_chars,
            retry: RetryPolicy::none(),
        }
    }

    pub fn from_config(llm: Arc<dyn LLMAdapter>, config: &Config) -> Self {
        Self {
            llm,
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            max_input_chars: config.pipeline.max_input_chars,
            retry: RetryPolicy::from_config(&config.pipeline),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Create the analysis prompt, truncating the body to `max_input_chars`
    pub fn create_analysis_prompt(topic: &str, content: &ExtractedContent, max_input_chars: usize) -> String {
        let (body, truncated) = truncate_chars(&content.body_text, max_input_chars);
        let body = if truncated {
            format!("{} [...]", body.trim_end())
        } else {
            body.to_string()
        };

        let title = content
            .metadata
            .title
            .as_deref()
            .unwrap_or_else(|| content.reference.display_title());

        let mut details = String::new();
        if !content.metadata.authors.is_empty() {
            details.push_str(&format!("Authors: {}\n", content.metadata.authors.join(", ")));
        }
        if let Some(published) = &content.metadata.published {
            details.push_str(&format!("Published: {}\n", published));
        }

        format!(
            r#"Please analyze this research paper/article for a literature review on the topic below.

RESEARCH TOPIC:
{topic}

Paper Title: {title}
Paper Link: {link}
{details}
PAPER TEXT:
{body}

Provide:
1. A short summary of the paper
2. The main methodology
3. Key findings
4. Potential relevance to the research topic

OUTPUT FORMAT (respond with ONLY valid JSON):
{{
  "summary": "2-4 sentence summary",
  "methodology": "Main methodology in one or two sentences",
  "key_findings": ["Finding 1", "Finding 2"],
  "relevance_notes": "How this paper relates to the research topic"
}}"#,
            topic = topic.trim(),
            title = title,
            link = content.reference.url,
            details = details,
            body = body,
        )
    }

    async fn request_analysis(&self, topic: &str, content: &ExtractedContent) -> Result<ParsedAnalysis, AnalysisError> {
        let request = LLMRequest {
            model: self.model.clone(),
            messages: vec![LLMMessage::user(Self::create_analysis_prompt(
                topic,
                content,
                self.max_input_chars,
            ))],
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            system_instruction: Some(SYSTEM_INSTRUCTION.to_string()),
        };

        let response = with_retry(&self.retry, "analyze", || self.llm.create_chat_completion(&request)).await?;
        info!(
            url = %content.reference.url,
            response_len = response.content.len(),
            total_tokens = response.usage.total_tokens,
            "Received analysis from LLM"
        );

        parse_analysis_response(&response.content)
    }
}

#[async_trait]
impl PaperAnalyzer for AnalysisAgent {
    async fn analyze(&self, topic: &str, content: &ExtractedContent) -> AnalysisResult {
        let reference = content.reference.clone();
        if !content.extracted_ok {
            return AnalysisResult::skipped(reference);
        }

        match self.request_analysis(topic, content).await {
            Ok(parsed) => AnalysisResult {
                reference,
                summary: parsed.summary,
                methodology: parsed.methodology,
                key_findings: parsed.key_findings,
                relevance_notes: parsed.relevance_notes,
                analyzed_ok: true,
                skipped: false,
                error: None,
            },
            Err(e) => {
                warn!(url = %reference.url, error = %e, "Analysis failed");
                AnalysisResult::failure(reference, e.to_string())
            }
        }
    }
}

/// Parse the model response: JSON first, then labelled plain-text sections
pub fn parse_analysis_response(response: &str) -> Result<ParsedAnalysis, AnalysisError> {
    if response.trim().is_empty() {
        return Err(AnalysisError::EmptyResponse);
    }

    let parsed = match parse_json_response(response) {
        Some(parsed) => parsed,
        None => parse_sections(response).ok_or_else(|| {
            AnalysisError::Unparseable("response is neither JSON nor labelled sections".to_string())
        })?,
    };

    if parsed.summary.is_empty() {
        return Err(AnalysisError::Unparseable("response has no summary".to_string()));
    }
    Ok(parsed)
}

fn parse_json_response(response: &str) -> Option<ParsedAnalysis> {
    // Try to extract JSON from the response
    let json_str = if response.contains("```json") {
        response
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(response)
    } else if response.contains("```") {
        response.split("```").nth(1).unwrap_or(response)
    } else {
        let start = response.find('{')?;
        let end = response.rfind('}')?;
        if end < start {
            return None;
        }
        &response[start..=end]
    };

    let raw: AnalysisLLMResponse = serde_json::from_str(json_str.trim()).ok()?;

    Some(ParsedAnalysis {
        summary: clean_text(&raw.summary),
        methodology: raw
            .methodology
            .map(|m| clean_text(&m))
            .filter(|m| !m.is_empty()),
        key_findings: raw
            .key_findings
            .iter()
            .map(|f| clean_text(f))
            .filter(|f| !f.is_empty())
            .collect(),
        relevance_notes: raw.relevance_notes.map(|r| clean_text(&r)).unwrap_or_default(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Summary,
    Methodology,
    Findings,
    Relevance,
}

/// Recognize a heading line like "**Key findings:**", "## 2. Methodology" or "Relevance: ..."
fn section_heading(line: &str) -> Option<(Section, String)> {
    let stripped = line
        .trim()
        .trim_start_matches(|c: char| c == '#' || c == '*' || c.is_whitespace())
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')')
        .trim_start();

    let labels: &[(&str, Section)] = &[
        ("summary", Section::Summary),
        ("main methodology", Section::Methodology),
        ("methodology", Section::Methodology),
        ("methods", Section::Methodology),
        ("key findings", Section::Findings),
        ("findings", Section::Findings),
        ("potential relevance to the research topic", Section::Relevance),
        ("potential relevance", Section::Relevance),
        ("relevance notes", Section::Relevance),
        ("relevance", Section::Relevance),
    ];

    // Labels are ASCII, so matching the prefix byte-for-byte keeps every slice on `stripped`
    labels.iter().find_map(|(label, section)| {
        let head = stripped.get(..label.len())?;
        if !head.eq_ignore_ascii_case(label) {
            return None;
        }
        let rest = stripped
            .get(label.len()..)?
            .trim_start_matches('*')
            .trim_start();
        if !(rest.is_empty() || rest.starts_with(':')) {
            return None;
        }
        let inline = rest
            .trim_start_matches(':')
            .trim_matches(|c: char| c == '*' || c.is_whitespace())
            .to_string();
        Some((*section, inline))
    })
}

fn strip_bullet(line: &str) -> &str {
    let trimmed = line.trim();
    let without_marker = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("• "));
    match without_marker {
        Some(rest) => rest.trim(),
        None => {
            let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
            if digits > 0 && (trimmed[digits..].starts_with(". ") || trimmed[digits..].starts_with(") ")) {
                trimmed[digits + 2..].trim()
            } else {
                trimmed
            }
        }
    }
}

fn parse_sections(response: &str) -> Option<ParsedAnalysis> {
    let mut current: Option<Section> = None;
    let mut summary = Vec::new();
    let mut methodology = Vec::new();
    let mut findings: Vec<String> = Vec::new();
    let mut relevance = Vec::new();
    let mut found_any = false;

    for line in response.lines() {
        if let Some((section, inline)) = section_heading(line) {
            current = Some(section);
            found_any = true;
            if inline.is_empty() {
                continue;
            }
            match section {
                Section::Findings => findings.push(inline),
                Section::Summary => summary.push(inline),
                Section::Methodology => methodology.push(inline),
                Section::Relevance => relevance.push(inline),
            }
            continue;
        }

        let text = strip_bullet(line);
        if text.is_empty() {
            continue;
        }
        match current {
            Some(Section::Summary) => summary.push(text.to_string()),
            Some(Section::Methodology) => methodology.push(text.to_string()),
            Some(Section::Findings) => findings.push(text.to_string()),
            Some(Section::Relevance) => relevance.push(text.to_string()),
            None => {}
        }
    }

    if !found_any {
        return None;
    }

    let findings: Vec<String> = findings.iter().map(|f| clean_text(f)).filter(|f| !f.is_empty()).collect();
    let mut summary = clean_text(&summary.join(" "));
    // Responses following the classic findings/methodology/relevance layout carry no summary heading
    if summary.is_empty() && !findings.is_empty() {
        summary = findings.join(" ");
    }
    let methodology = clean_text(&methodology.join(" "));

    Some(ParsedAnalysis {
        summary,
        methodology: (!methodology.is_empty()).then_some(methodology),
        key_findings: findings,
        relevance_notes: clean_text(&relevance.join(" ")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentMetadata, PaperReference};
    use crate::types::{LLMResponse, TokenUsage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Deterministic backend returning a fixed reply and recording prompts
    struct FixedLLM {
        reply: Result<String, BackendError>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl FixedLLM {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing(error: BackendError) -> Self {
            Self {
                reply: Err(error),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LLMAdapter for FixedLLM {
        async fn create_chat_completion(&self, request: &LLMRequest) -> Result<LLMResponse, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts
                .lock()
                .unwrap()
                .push(request.messages[0].content.clone());
            self.reply.clone().map(|content| LLMResponse {
                content,
                finish_reason: "stop".to_string(),
                usage: TokenUsage::default(),
            })
        }
    }

    fn content(body: &str) -> ExtractedContent {
        ExtractedContent::success(
            PaperReference::new("Surface codes", "https://arxiv.org/abs/1208.0928"),
            body.to_string(),
            ContentMetadata {
                title: None,
                authors: vec!["A. Fowler".to_string()],
                published: Some("2012".to_string()),
            },
        )
    }

    const JSON_REPLY: &str = r#"Here is the analysis:
```json
{
  "summary": "Introduces surface codes  for fault-tolerant computing.",
  "methodology": "Numerical simulation of logical error rates.",
  "key_findings": ["Threshold near 1%", "Overhead scales polylogarithmically"],
  "relevance_notes": "Core reference for quantum error correction."
}
```"#;

    #[test]
    fn test_parse_fenced_json() {
        let parsed = parse_analysis_response(JSON_REPLY).unwrap();
        assert_eq!(parsed.summary, "Introduces surface codes for fault-tolerant computing.");
        assert_eq!(parsed.key_findings.len(), 2);
        assert_eq!(parsed.methodology.as_deref(), Some("Numerical simulation of logical error rates."));
        assert_eq!(parsed.relevance_notes, "Core reference for quantum error correction.");
    }

    #[test]
    fn test_parse_bare_json_with_preamble() {
        let reply = r#"Sure! {"summary": "Short.", "relevance": "High."} Hope this helps."#;
        let parsed = parse_analysis_response(reply).unwrap();
        assert_eq!(parsed.summary, "Short.");
        assert_eq!(parsed.relevance_notes, "High.");
        assert!(parsed.key_findings.is_empty());
    }

    #[test]
    fn test_parse_labelled_sections() {
        let reply = "**Summary:** A survey of decoders.\n\n\
                     **Methodology:**\nLiterature survey.\n\n\
                     **Key findings:**\n- Union-find is fast\n- MWPM is accurate\n\n\
                     **Relevance:** Directly on topic.";
        let parsed = parse_analysis_response(reply).unwrap();
        assert_eq!(parsed.summary, "A survey of decoders.");
        assert_eq!(parsed.methodology.as_deref(), Some("Literature survey."));
        assert_eq!(parsed.key_findings, vec!["Union-find is fast", "MWPM is accurate"]);
        assert_eq!(parsed.relevance_notes, "Directly on topic.");
    }

    #[test]
    fn test_parse_classic_numbered_layout_without_summary() {
        let reply = "1. Key findings:\n1. Threshold is about 1%\n2. Main methodology: Monte Carlo simulation\n\
                     3. Potential relevance to the research topic: Foundational.";
        let parsed = parse_analysis_response(reply).unwrap();
        assert_eq!(parsed.summary, "Threshold is about 1%");
        assert_eq!(parsed.methodology.as_deref(), Some("Monte Carlo simulation"));
        assert_eq!(parsed.relevance_notes, "Foundational.");
    }

    #[test]
    fn test_labelled_sections_with_non_ascii_text() {
        let parsed = parse_analysis_response("Summary: İstanbul cohort study of decoders.").unwrap();
        assert_eq!(parsed.summary, "İstanbul cohort study of decoders.");

        let parsed = parse_analysis_response("Summary: İİİİİİİİİİ").unwrap();
        assert_eq!(parsed.summary, "İİİİİİİİİİ");

        // Heading text itself may be non-ASCII without matching a label
        let reply = "**Özet:** yok\n**Summary:** Ünlü decoders compared.\nKey findings: Çok hızlı";
        let parsed = parse_analysis_response(reply).unwrap();
        assert_eq!(parsed.summary, "Ünlü decoders compared.");
        assert_eq!(parsed.key_findings, vec!["Çok hızlı"]);
    }

    #[test]
    fn test_unstructured_or_empty_reply_fails() {
        assert!(matches!(
            parse_analysis_response("I cannot help with that."),
            Err(AnalysisError::Unparseable(_))
        ));
        assert!(matches!(parse_analysis_response("   \n"), Err(AnalysisError::EmptyResponse)));
        assert!(matches!(
            parse_analysis_response(r#"{"summary": ""}"#),
            Err(AnalysisError::Unparseable(_))
        ));
    }

    #[test]
    fn test_prompt_truncates_body_on_char_boundary() {
        let body = "é".repeat(50);
        let prompt = AnalysisAgent::create_analysis_prompt("quantum error correction", &content(&body), 10);
        assert!(prompt.contains(&format!("{} [...]", "é".repeat(10))));
        assert!(!prompt.contains(&"é".repeat(11)));
        assert!(prompt.contains("RESEARCH TOPIC:\nquantum error correction"));
        assert!(prompt.contains("Paper Title: Surface codes"));
        assert!(prompt.contains("Authors: A. Fowler"));
        assert!(prompt.contains("Published: 2012"));
    }

    #[tokio::test]
    async fn test_analyze_success() {
        let llm = Arc::new(FixedLLM::replying(JSON_REPLY));
        let agent = AnalysisAgent::new(llm.clone(), "llama3.1", 6000);

        let result = agent.analyze("quantum error correction", &content("Body text")).await;

        assert!(result.analyzed_ok);
        assert!(!result.skipped);
        assert!(!result.summary.is_empty());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
        assert!(llm.prompts.lock().unwrap()[0].contains("Body text"));
    }

    #[tokio::test]
    async fn test_analyze_backend_failure_is_captured() {
        let llm = Arc::new(FixedLLM::failing(BackendError::Timeout(Duration::from_secs(300))));
        let agent = AnalysisAgent::new(llm, "llama3.1", 6000);

        let result = agent.analyze("topic", &content("Body")).await;

        assert!(!result.analyzed_ok);
        assert!(!result.skipped);
        assert_eq!(result.error.as_deref(), Some("LLM backend timed out after 300s"));
    }

    #[tokio::test]
    async fn test_analyze_retries_transient_backend_errors() {
        let llm = Arc::new(FixedLLM::failing(BackendError::Unreachable("refused".into())));
        let agent = AnalysisAgent::new(llm.clone(), "llama3.1", 6000)
            .with_retry(RetryPolicy::new(2, Duration::from_millis(1)));

        let result = agent.analyze("topic", &content("Body")).await;

        assert!(!result.analyzed_ok);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_analyze_never_prompts_on_failed_extraction() {
        let llm = Arc::new(FixedLLM::replying(JSON_REPLY));
        let agent = AnalysisAgent::new(llm.clone(), "llama3.1", 6000);
        let failed = ExtractedContent::failure(PaperReference::new("x", "https://example.org"), "timeout");

        let result = agent.analyze("topic", &failed).await;

        assert!(result.skipped);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }
}
