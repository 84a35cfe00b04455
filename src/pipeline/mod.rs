//! Review Pipeline
//!
//! Runs one topic through discovery, extraction and analysis, then aggregates
//! the report.
//!
//! ```text
//!   Idle
//!    │ run(topic)
//!    ▼
//! Discovering ──── DiscoveryError ───▶ Failed
//!    │ references (0..n)
//!    ▼
//! ProcessingItems   for each reference (worker pool, discovery order kept):
//!    │                extract ──ok──▶ analyze
//!    │                   └──failed──▶ skip analysis
//!    ▼
//!   Done            (report marked partial if cancelled between items)
//! ```
//!
//! Per-item failures are captured in each `ReviewItem`; only discovery errors abort a run.

pub mod pool;

pub use pool::WorkerPool;

use crate::agents::{AnalysisAgent, PaperAnalyzer};
use crate::config::Config;
use crate::extract::{ContentExtractor, HttpExtractor};
use crate::llm::LLM;
use crate::models::{AnalysisResult, ItemStatus, PaperReference, ReviewItem, ReviewReport};
use crate::report::build_partial_report;
use crate::search::{DiscoveryError, SerpApiClient, SourceDiscovery};
use crate::types::{AppError, AppResult};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Lifecycle of a single run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Discovering,
    ProcessingItems { total: usize },
    Done,
    Failed(String),
}

/// Progress notifications for a display surface
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PipelineEvent {
    StateChanged(RunState),
    ItemStarted {
        index: usize,
        total: usize,
        title: String,
    },
    ItemFinished {
        index: usize,
        total: usize,
        status: ItemStatus,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

pub struct Orchestrator {
    discovery: Arc<dyn SourceDiscovery>,
    extractor: Arc<dyn ContentExtractor>,
    analyzer: Arc<dyn PaperAnalyzer>,
    pool: WorkerPool,
    events: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

impl Orchestrator {
    pub fn new(
        discovery: Arc<dyn SourceDiscovery>,
        extractor: Arc<dyn ContentExtractor>,
        analyzer: Arc<dyn PaperAnalyzer>,
    ) -> Self {
        Self {
            discovery,
            extractor,
            analyzer,
            pool: WorkerPool::sequential(),
            events: None,
        }
    }

    /// Wire the production collaborators (SerpAPI, HTTP extractor, configured LLM backend)
    pub fn from_config(config: &Config) -> AppResult<Self> {
        config.validate()?;

        let discovery = SerpApiClient::from_config(&config.search).map_err(|e| AppError::Config(e.to_string()))?;
        let extractor = HttpExtractor::from_config(&config.pipeline)?;
        let llm = LLM::from_config(&config.llm, config.pipeline.analysis_timeout)?;
        info!(provider = %llm.provider(), model = %config.llm.model, "Using LLM backend");
        let analyzer = AnalysisAgent::from_config(llm.adapter(), config);

        let pool = WorkerPool::new(config.pipeline.concurrency).with_delay(config.pipeline.request_delay);

        Ok(Self::new(Arc::new(discovery), Arc::new(extractor), Arc::new(analyzer)).with_pool(pool))
    }

    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is watching progress
            let _ = tx.send(event);
        }
    }

    fn transition(&self, state: RunState) {
        info!(state = ?state, "Pipeline state changed");
        self.emit(PipelineEvent::StateChanged(state));
    }

    /// Run the whole pipeline for `topic`.
    ///
    /// Returns the finished report (possibly empty, possibly partial after
    /// cancellation), or an error when the request is invalid or discovery fails.
    pub async fn run(
        &self,
        topic: &str,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<ReviewReport, PipelineError> {
        let topic = topic.trim();
        if topic.is_empty() {
            let error = PipelineError::InvalidRequest("please enter a research topic".to_string());
            self.transition(RunState::Failed(error.to_string()));
            return Err(error);
        }
        if max_results == 0 {
            let error = PipelineError::InvalidRequest("max_results must be greater than 0".to_string());
            self.transition(RunState::Failed(error.to_string()));
            return Err(error);
        }

        self.transition(RunState::Discovering);
        let references = match self.discovery.discover(topic, max_results).await {
            Ok(references) => references,
            Err(e) => {
                error!(topic = %topic, error = %e, "Source discovery failed");
                self.transition(RunState::Failed(e.to_string()));
                return Err(e.into());
            }
        };

        let total = references.len();
        info!(topic = %topic, count = total, "Discovered references");
        self.transition(RunState::ProcessingItems { total });

        let slots = self
            .pool
            .run(references, cancel, |index, reference| async move {
                self.emit(PipelineEvent::ItemStarted {
                    index,
                    total,
                    title: reference.display_title().to_string(),
                });
                info!(paper = index + 1, total, url = %reference.url, "Processing paper");

                let item = self.process_reference(topic, reference).await;

                self.emit(PipelineEvent::ItemFinished {
                    index,
                    total,
                    status: item.status,
                });
                item
            })
            .await;

        let items: Vec<ReviewItem> = slots.into_iter().flatten().collect();
        if items.len() < total {
            warn!(completed = items.len(), total, "Run cancelled, producing partial report");
        }

        let report = build_partial_report(topic, items, total);
        info!(
            run_id = %report.run_id,
            items = report.items.len(),
            ok = report.count_with(ItemStatus::Ok),
            partial = report.partial,
            "Review report generated"
        );
        self.transition(RunState::Done);

        Ok(report)
    }

    /// Extract one reference and analyze it only if extraction succeeded
    pub async fn process_reference(&self, topic: &str, reference: PaperReference) -> ReviewItem {
        let extracted = self.extractor.extract(&reference).await;

        let analysis = if extracted.extracted_ok {
            self.analyzer.analyze(topic, &extracted).await
        } else {
            AnalysisResult::skipped(reference.clone())
        };

        let item = ReviewItem::new(reference, extracted, analysis);
        if let Some(reason) = item.failure_reason() {
            warn!(url = %item.reference.url, status = %item.status, reason, "Paper not fully processed");
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentMetadata, ExtractedContent};
    use crate::report::{render_markdown, EXTRACTION_FAILED_MARKER};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeDiscovery {
        references: Result<Vec<PaperReference>, DiscoveryError>,
        calls: AtomicUsize,
    }

    impl FakeDiscovery {
        fn returning(references: Vec<PaperReference>) -> Arc<Self> {
            Arc::new(Self {
                references: Ok(references),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                references: Err(DiscoveryError::Unavailable(message.to_string())),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SourceDiscovery for FakeDiscovery {
        async fn discover(&self, _topic: &str, max_results: usize) -> Result<Vec<PaperReference>, DiscoveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.references
                .clone()
                .map(|refs| refs.into_iter().take(max_results).collect())
        }
    }

    /// Extracts every url except the ones listed in `failing`
    struct FakeExtractor {
        failing: HashSet<String>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl FakeExtractor {
        fn new(failing: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                failing: failing.iter().map(|s| s.to_string()).collect(),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                failing: HashSet::new(),
                calls: AtomicUsize::new(0),
                delay,
            })
        }
    }

    #[async_trait]
    impl ContentExtractor for FakeExtractor {
        async fn extract(&self, reference: &PaperReference) -> ExtractedContent {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.failing.contains(&reference.url) {
                return ExtractedContent::failure(reference.clone(), "request timed out after 30s");
            }
            ExtractedContent::success(
                reference.clone(),
                format!("Full text of {}.", reference.title),
                ContentMetadata::default(),
            )
        }
    }

    struct CountingAnalyzer {
        calls: AtomicUsize,
        failing: HashSet<String>,
    }

    impl CountingAnalyzer {
        fn new() -> Arc<Self> {
            Self::failing_on(&[])
        }

        fn failing_on(urls: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failing: urls.iter().map(|s| s.to_string()).collect(),
            })
        }
    }

    #[async_trait]
    impl PaperAnalyzer for CountingAnalyzer {
        async fn analyze(&self, topic: &str, content: &ExtractedContent) -> AnalysisResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reference = content.reference.clone();
            if self.failing.contains(&reference.url) {
                return AnalysisResult::failure(reference, "LLM backend unreachable: connection refused");
            }
            AnalysisResult {
                summary: format!("Summary of {}", reference.title),
                methodology: None,
                key_findings: vec!["A finding".to_string()],
                relevance_notes: format!("Relevant to {topic}"),
                analyzed_ok: true,
                skipped: false,
                error: None,
                reference,
            }
        }
    }

    fn references(n: usize) -> Vec<PaperReference> {
        (1..=n)
            .map(|i| PaperReference::new(format!("Paper {i}"), format!("https://arxiv.org/abs/{i}")))
            .collect()
    }

    fn orchestrator(
        discovery: &Arc<FakeDiscovery>,
        extractor: &Arc<FakeExtractor>,
        analyzer: &Arc<CountingAnalyzer>,
    ) -> Orchestrator {
        Orchestrator::new(discovery.clone(), extractor.clone(), analyzer.clone())
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_empty_discovery_yields_empty_report() {
        let discovery = FakeDiscovery::returning(vec![]);
        let extractor = FakeExtractor::new(&[]);
        let analyzer = CountingAnalyzer::new();

        let report = orchestrator(&discovery, &extractor, &analyzer)
            .run("obscure topic", 5, &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_empty());
        assert!(!report.partial);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
        assert!(render_markdown(&report).contains("_No papers were found for this topic._"));
    }

    #[tokio::test]
    async fn test_mixed_outcomes_keep_order_and_stay_visible() {
        let refs = references(3);
        let discovery = FakeDiscovery::returning(refs.clone());
        let extractor = FakeExtractor::new(&["https://arxiv.org/abs/2"]);
        let analyzer = CountingAnalyzer::new();

        let report = orchestrator(&discovery, &extractor, &analyzer)
            .run("quantum error correction", 3, &CancellationToken::new())
            .await
            .unwrap();

        let statuses: Vec<_> = report.items.iter().map(|i| i.status).collect();
        assert_eq!(statuses, vec![ItemStatus::Ok, ItemStatus::ExtractFailed, ItemStatus::Ok]);
        let urls: Vec<_> = report.items.iter().map(|i| i.reference.url.clone()).collect();
        assert_eq!(urls, refs.iter().map(|r| r.url.clone()).collect::<Vec<_>>());
        assert_eq!(report.discovered, 3);

        // Analysis is skipped for the failed extraction
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 3);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
        assert!(report.items[1].analysis.skipped);

        let markdown = render_markdown(&report);
        let sections: Vec<&str> = markdown.split("\n## ").skip(1).collect();
        assert_eq!(sections.len(), 3);
        assert!(sections[1].contains(EXTRACTION_FAILED_MARKER));
        assert!(sections[1].contains("request timed out after 30s"));
        assert!(!sections[1].contains("**Summary:**"));
        assert!(sections[0].contains("**Summary:**"));
    }

    #[tokio::test]
    async fn test_analysis_failure_is_recorded_per_item() {
        let discovery = FakeDiscovery::returning(references(2));
        let extractor = FakeExtractor::new(&[]);
        let analyzer = CountingAnalyzer::failing_on(&["https://arxiv.org/abs/1"]);

        let report = orchestrator(&discovery, &extractor, &analyzer)
            .run("topic", 2, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.items[0].status, ItemStatus::AnalysisFailed);
        assert_eq!(report.items[0].failure_reason(), Some("LLM backend unreachable: connection refused"));
        assert_eq!(report.items[1].status, ItemStatus::Ok);
    }

    #[tokio::test]
    async fn test_discovery_outage_fails_run_without_processing() {
        let discovery = FakeDiscovery::failing("connection reset");
        let extractor = FakeExtractor::new(&[]);
        let analyzer = CountingAnalyzer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let result = orchestrator(&discovery, &extractor, &analyzer)
            .with_events(tx)
            .run("topic", 5, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(PipelineError::Discovery(DiscoveryError::Unavailable(_)))));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);

        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(PipelineEvent::StateChanged(RunState::Failed(_)))));
    }

    #[tokio::test]
    async fn test_blank_topic_is_rejected_before_discovery() {
        let discovery = FakeDiscovery::returning(references(1));
        let extractor = FakeExtractor::new(&[]);
        let analyzer = CountingAnalyzer::new();
        let pipeline = orchestrator(&discovery, &extractor, &analyzer);

        let result = pipeline.run("   ", 5, &CancellationToken::new()).await;
        assert!(matches!(result, Err(PipelineError::InvalidRequest(_))));

        let result = pipeline.run("topic", 0, &CancellationToken::new()).await;
        assert!(matches!(result, Err(PipelineError::InvalidRequest(_))));
        assert_eq!(discovery.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_events_follow_run_lifecycle() {
        let discovery = FakeDiscovery::returning(references(2));
        let extractor = FakeExtractor::new(&["https://arxiv.org/abs/2"]);
        let analyzer = CountingAnalyzer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        orchestrator(&discovery, &extractor, &analyzer)
            .with_events(tx)
            .run("topic", 2, &CancellationToken::new())
            .await
            .unwrap();

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                PipelineEvent::StateChanged(RunState::Discovering),
                PipelineEvent::StateChanged(RunState::ProcessingItems { total: 2 }),
                PipelineEvent::ItemStarted {
                    index: 0,
                    total: 2,
                    title: "Paper 1".to_string()
                },
                PipelineEvent::ItemFinished {
                    index: 0,
                    total: 2,
                    status: ItemStatus::Ok
                },
                PipelineEvent::ItemStarted {
                    index: 1,
                    total: 2,
                    title: "Paper 2".to_string()
                },
                PipelineEvent::ItemFinished {
                    index: 1,
                    total: 2,
                    status: ItemStatus::ExtractFailed
                },
                PipelineEvent::StateChanged(RunState::Done),
            ]
        );
    }

    #[tokio::test]
    async fn test_cancelled_run_returns_partial_report() {
        let discovery = FakeDiscovery::returning(references(4));
        let extractor = FakeExtractor::slow(Duration::from_millis(10));
        let analyzer = CountingAnalyzer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let pipeline = orchestrator(&discovery, &extractor, &analyzer).with_events(tx);
        let watcher = {
            let cancel = cancel.clone();
            async move {
                // Cancel as soon as the first paper finishes
                while let Some(event) = rx.recv().await {
                    if matches!(event, PipelineEvent::ItemFinished { .. }) {
                        cancel.cancel();
                        break;
                    }
                }
            }
        };

        let (report, _) = tokio::join!(pipeline.run("topic", 4, &cancel), watcher);
        let report = report.unwrap();

        assert!(report.partial);
        assert_eq!(report.discovered, 4);
        assert!(!report.items.is_empty() && report.items.len() < 4);
        assert_eq!(report.items[0].reference.url, "https://arxiv.org/abs/1");
    }

    #[tokio::test]
    async fn test_concurrent_pool_preserves_discovery_order() {
        let discovery = FakeDiscovery::returning(references(6));
        let extractor = FakeExtractor::slow(Duration::from_millis(5));
        let analyzer = CountingAnalyzer::new();

        let report = orchestrator(&discovery, &extractor, &analyzer)
            .with_pool(WorkerPool::new(3))
            .run("topic", 6, &CancellationToken::new())
            .await
            .unwrap();

        let titles: Vec<_> = report.items.iter().map(|i| i.reference.title.as_str()).collect();
        assert_eq!(titles, vec!["Paper 1", "Paper 2", "Paper 3", "Paper 4", "Paper 5", "Paper 6"]);
        assert!(report.items.iter().all(|i| i.status == ItemStatus::Ok));
        assert!(!report.partial);
    }

    #[test]
    fn test_from_config_requires_search_key() {
        let config = Config::default();
        match Orchestrator::from_config(&config) {
            Err(AppError::Config(message)) => assert!(message.contains("SERPAPI_API_KEY")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected configuration error"),
        }
    }

    #[test]
    fn test_from_config_builds_with_key() {
        let mut config = Config::default();
        config.search.serpapi_key = "test-key".to_string();
        config.pipeline.concurrency = 3;

        let orchestrator = Orchestrator::from_config(&config).unwrap();
        assert_eq!(orchestrator.pool.workers(), 3);
    }
}
