// Ollama adapter implementation
// Talks to a locally hosted model through the non-streaming chat endpoint.
// API Reference: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-chat-completion

use crate::llm::provider::{BackendError, LLMAdapter};
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const OLLAMA_DEFAULT_BASE: &str = "http://localhost:11434";

pub struct OllamaAdapter {
    client: Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct OllamaErrorResponse {
    error: String,
}

impl OllamaAdapter {
    pub fn new(base_url: Option<&str>, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create Ollama HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(OLLAMA_DEFAULT_BASE)
                .trim_end_matches('/')
                .to_string(),
            timeout,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

#[async_trait]
impl LLMAdapter for OllamaAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> Result<LLMResponse, BackendError> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_instruction {
            messages.push(OllamaMessage {
                role: "system",
                content: system,
            });
        }
        messages.extend(request.messages.iter().map(|m| OllamaMessage {
            role: &m.role,
            content: &m.content,
        }));

        let body = OllamaChatRequest {
            model: &request.model,
            messages,
            stream: false,
            options: Some(OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            }),
        };

        let response = self
            .client
            .post(self.chat_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OllamaErrorResponse>(&error_text)
                .map(|e| e.error)
                .unwrap_or(error_text);
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse Ollama response: {}", e)))?;

        let prompt_tokens = parsed.prompt_eval_count.unwrap_or(0);
        let completion_tokens = parsed.eval_count.unwrap_or(0);
        debug!(
            model = %request.model,
            prompt_tokens,
            completion_tokens,
            "Ollama chat completion received"
        );

        Ok(LLMResponse {
            content: parsed.message.content,
            finish_reason: parsed.done_reason.unwrap_or_else(|| "stop".to_string()),
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }
}
