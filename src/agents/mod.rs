//! Agent System
//!
//! Model-backed agents used by the review pipeline:
//!
//! - **Analysis Agent**: reads one extracted paper and returns a structured
//!   summary, methodology, key findings and relevance notes
//!
//! Agents talk to the model only through `llm::LLMAdapter`, so tests can swap in a
//! deterministic backend.

pub mod analysis;

pub use analysis::{parse_analysis_response, AnalysisAgent, AnalysisError, PaperAnalyzer, ParsedAnalysis};
