use crate::types::{AppError, AppResult};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default search domains, mirrored from the classic "site:" filtered academic query
pub const DEFAULT_SEARCH_DOMAINS: &[&str] = &["arxiv.org", "scholar.google.com"];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub llm: LLMConfig,
    pub search: SearchConfig,
    pub pipeline: PipelineConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    /// "ollama" or "openai" (any OpenAI-compatible endpoint)
    pub provider: String,
    /// Model identifier passed to the backend
    pub model: String,
    /// Overrides the provider's default endpoint
    pub base_url: Option<String>,
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub serpapi_key: String,
    pub scholar_enabled: bool,
    pub light_enabled: bool,
    pub domains: Vec<String>,
    pub max_results: usize,
    pub max_results_cap: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub request_timeout: Duration,
    pub analysis_timeout: Duration,
    pub max_input_chars: usize,
    pub concurrency: usize,
    pub request_delay: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.1".to_string(),
            base_url: None,
            api_key: String::new(),
            temperature: 0.3,
            max_tokens: 1024,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            serpapi_key: String::new(),
            scholar_enabled: true,
            light_enabled: true,
            domains: DEFAULT_SEARCH_DOMAINS.iter().map(|d| d.to_string()).collect(),
            max_results: 5,
            max_results_cap: 35,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            analysis_timeout: Duration::from_secs(300),
            max_input_chars: 6000,
            concurrency: 1,
            request_delay: Duration::from_millis(2000),
            max_retries: 0,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LLMConfig::default(),
            search: SearchConfig::default(),
            pipeline: PipelineConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl Config {
    /// Load from `.env` and the environment. Values are not validated here so
    /// that command-line overrides can still replace them; call `validate` after.
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let config = Self {
            llm: LLMConfig {
                provider: env::var("LLM_PROVIDER").unwrap_or(defaults.llm.provider),
                model: env::var("LLM_MODEL").unwrap_or(defaults.llm.model),
                base_url: env::var("LLM_BASE_URL").ok().filter(|s| !s.trim().is_empty()),
                api_key: env::var("LLM_API_KEY").unwrap_or_default(),
                temperature: parse_var("LLM_TEMPERATURE", defaults.llm.temperature)?,
                max_tokens: parse_var("LLM_MAX_TOKENS", defaults.llm.max_tokens)?,
            },
            search: SearchConfig {
                serpapi_key: env::var("SERPAPI_API_KEY").unwrap_or_default(),
                scholar_enabled: parse_var("SEARCH_SCHOLAR_ENABLED", defaults.search.scholar_enabled)?,
                light_enabled: parse_var("SEARCH_LIGHT_ENABLED", defaults.search.light_enabled)?,
                domains: env::var("SEARCH_DOMAINS")
                    .map(|s| split_list(&s))
                    .unwrap_or(defaults.search.domains),
                max_results: parse_var("MAX_RESULTS", defaults.search.max_results)?,
                max_results_cap: parse_var("MAX_RESULTS_CAP", defaults.search.max_results_cap)?,
            },
            pipeline: PipelineConfig {
                request_timeout: Duration::from_secs(parse_var(
                    "REQUEST_TIMEOUT_SECS",
                    defaults.pipeline.request_timeout.as_secs(),
                )?),
                analysis_timeout: Duration::from_secs(parse_var(
                    "ANALYSIS_TIMEOUT_SECS",
                    defaults.pipeline.analysis_timeout.as_secs(),
                )?),
                max_input_chars: parse_var("MAX_INPUT_CHARS", defaults.pipeline.max_input_chars)?,
                concurrency: parse_var("PIPELINE_CONCURRENCY", defaults.pipeline.concurrency)?,
                request_delay: Duration::from_millis(parse_var(
                    "REQUEST_DELAY_MS",
                    defaults.pipeline.request_delay.as_millis() as u64,
                )?),
                max_retries: parse_var("MAX_RETRIES", defaults.pipeline.max_retries)?,
                retry_base_delay: Duration::from_millis(parse_var(
                    "RETRY_BASE_DELAY_MS",
                    defaults.pipeline.retry_base_delay.as_millis() as u64,
                )?),
            },
            export: ExportConfig {
                output_dir: env::var("EXPORT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.export.output_dir),
            },
        };

        Ok(config)
    }

    /// Reject values that would make a run meaningless or unbounded
    pub fn validate(&self) -> AppResult<()> {
        if self.llm.model.trim().is_empty() {
            return Err(AppError::Config("LLM model identifier must not be empty".to_string()));
        }
        if self.search.max_results_cap == 0 {
            return Err(AppError::Config("MAX_RESULTS_CAP must be greater than 0".to_string()));
        }
        if self.search.max_results == 0 {
            return Err(AppError::Config("MAX_RESULTS must be greater than 0".to_string()));
        }
        if self.pipeline.max_input_chars == 0 {
            return Err(AppError::Config("MAX_INPUT_CHARS must be greater than 0".to_string()));
        }
        if self.pipeline.concurrency == 0 {
            return Err(AppError::Config("PIPELINE_CONCURRENCY must be at least 1".to_string()));
        }
        if self.pipeline.request_timeout.is_zero() {
            return Err(AppError::Config("REQUEST_TIMEOUT_SECS must be greater than 0".to_string()));
        }
        Ok(())
    }
}

fn parse_var<T>(key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid value for {}: {} ({})", key, raw, e))),
        _ => Ok(default),
    }
}

/// Split a comma-separated list, dropping blanks
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.llm.model, "llama3.1");
        assert_eq!(config.search.max_results_cap, 35);
        assert_eq!(config.pipeline.concurrency, 1);
        assert_eq!(config.pipeline.max_retries, 0);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.pipeline.concurrency = 0;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_model() {
        let mut config = Config::default();
        config.llm.model = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env_leaves_validation_to_caller() {
        std::env::set_var("PIPELINE_CONCURRENCY", "0");
        let mut config = Config::from_env().unwrap();
        std::env::remove_var("PIPELINE_CONCURRENCY");

        assert_eq!(config.pipeline.concurrency, 0);
        assert!(config.validate().is_err());

        // A command-line override can still repair the value
        config.pipeline.concurrency = 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list("arxiv.org, ieee.org,,springer.com "),
            vec!["arxiv.org", "ieee.org", "springer.com"]
        );
        assert!(split_list("").is_empty());
    }
}
