// Litreview - AI-assisted literature review: discover papers, extract text, analyze, export

pub mod config;
pub mod models;
pub mod types;
pub mod agents;
pub mod llm;
pub mod search;    // Source discovery (SerpAPI for Google Scholar and Light)
pub mod extract;   // Page fetching and article text extraction
pub mod report;    // Aggregation, markdown export and terminal summary
pub mod pipeline;  // Orchestrator and bounded worker pool
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::{AnalysisResult, ExtractedContent, ItemStatus, PaperReference, ReviewItem, ReviewReport};
pub use pipeline::{Orchestrator, PipelineError, PipelineEvent, RunState};
