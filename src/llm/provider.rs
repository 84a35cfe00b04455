use crate::config::LLMConfig;
use crate::types::{AppResult, LLMProvider, LLMRequest, LLMResponse};
use crate::utils::Retryable;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failures talking to a model backend
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("LLM backend unreachable: {0}")]
    Unreachable(String),

    #[error("LLM backend timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("LLM API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed LLM response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    pub(crate) fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            BackendError::Timeout(timeout)
        } else if error.is_connect() || error.is_request() {
            BackendError::Unreachable(error.to_string())
        } else if error.is_decode() {
            BackendError::InvalidResponse(error.to_string())
        } else {
            BackendError::Unreachable(error.to_string())
        }
    }
}

impl Retryable for BackendError {
    fn is_retryable(&self) -> bool {
        match self {
            BackendError::Unreachable(_) | BackendError::Timeout(_) => true,
            BackendError::Api { status, .. } => *status == 429 || *status >= 500,
            BackendError::InvalidResponse(_) => false,
        }
    }
}

/// Narrow request/response seam to a model backend. Tests substitute a fixed-text stand-in.
#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> Result<LLMResponse, BackendError>;
}

pub struct LLM {
    adapter: Arc<dyn LLMAdapter>,
    provider: LLMProvider,
}

impl LLM {
    /// Build the adapter named by `config.provider`
    pub fn from_config(config: &LLMConfig, timeout: Duration) -> AppResult<Self> {
        let provider = LLMProvider::from_id(&config.provider).ok_or_else(|| {
            crate::types::AppError::Config(format!("Unsupported LLM provider: {}", config.provider))
        })?;

        let adapter: Arc<dyn LLMAdapter> = match provider {
            LLMProvider::Ollama => Arc::new(crate::llm::ollama::OllamaAdapter::new(
                config.base_url.as_deref(),
                timeout,
            )?),
            LLMProvider::OpenAI => Arc::new(crate::llm::openai::OpenAIAdapter::new(
                &config.api_key,
                config.base_url.as_deref(),
                timeout,
            )?),
        };

        Ok(Self { adapter, provider })
    }

    pub fn provider(&self) -> LLMProvider {
        self.provider
    }

    pub fn adapter(&self) -> Arc<dyn LLMAdapter> {
        Arc::clone(&self.adapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(BackendError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(BackendError::Unreachable("refused".into()).is_retryable());
        assert!(BackendError::Api { status: 503, message: "busy".into() }.is_retryable());
        assert!(BackendError::Api { status: 429, message: "slow down".into() }.is_retryable());
        assert!(!BackendError::Api { status: 404, message: "no model".into() }.is_retryable());
        assert!(!BackendError::InvalidResponse("bad json".into()).is_retryable());
    }

    #[test]
    fn test_from_config_rejects_unknown_provider() {
        let config = LLMConfig {
            provider: "carrier-pigeon".to_string(),
            ..LLMConfig::default()
        };
        let result = LLM::from_config(&config, Duration::from_secs(1));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_config_defaults_to_ollama() {
        let llm = LLM::from_config(&LLMConfig::default(), Duration::from_secs(1)).unwrap();
        assert_eq!(llm.provider(), LLMProvider::Ollama);
    }

    #[test]
    fn test_timeout_message() {
        let error = BackendError::Timeout(Duration::from_secs(30));
        assert_eq!(error.to_string(), "LLM backend timed out after 30s");
    }
}
