//! LLM inference abstraction
//!
//! Provides:
//! - The `LlmClient` trait consumed by the orchestration core
//! - Structured (JSON) response parsing with a lenient fallback
//! - An OpenAI-compatible chat-completions client with retry and rate limiting

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What an LLM call is for. Used for metrics labels and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmPurpose {
    Decomposition,
    QueryExpansion,
    Verification,
    AnswerGeneration,
    Sufficiency,
    Refinement,
    Synthesis,
    ContradictionDetection,
}

impl LlmPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmPurpose::Decomposition => "decomposition",
            LlmPurpose::QueryExpansion => "query_expansion",
            LlmPurpose::Verification => "verification",
            LlmPurpose::AnswerGeneration => "answer_generation",
            LlmPurpose::Sufficiency => "sufficiency",
            LlmPurpose::Refinement => "refinement",
            LlmPurpose::Synthesis => "synthesis",
            LlmPurpose::ContradictionDetection => "contradiction_detection",
        }
    }
}

/// A single prompt sent to the model
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub purpose: LlmPurpose,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,

    /// Ask the provider for a JSON object response
    pub json_mode: bool,
}

impl LlmRequest {
    pub fn new(purpose: LlmPurpose, prompt: impl Into<String>) -> Self {
        Self {
            purpose,
            prompt: prompt.into(),
            system_prompt: None,
            max_tokens: None,
            temperature: None,
            json_mode: false,
        }
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Trait for text generation / classification
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one prompt and return the raw completion text
    async fn invoke(&self, request: &LlmRequest) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Invoke and parse the completion as `T`
pub async fn invoke_json<T: DeserializeOwned>(llm: &dyn LlmClient, request: &LlmRequest) -> Result<T> {
    let raw = llm.invoke(request).await?;
    parse_json_response(&raw, request.purpose.as_str())
}

/// Parse a model response as JSON.
///
/// Providers do not always honour JSON mode, so after a strict parse this
/// also accepts a fenced code block or the outermost `{...}` / `[...]` span
/// embedded in prose.
pub fn parse_json_response<T: DeserializeOwned>(raw: &str, source_name: &str) -> Result<T> {
    let trimmed = raw.trim();

    if let Ok(value) = serde_json::from_str::<T>(trimmed) {
        return Ok(value);
    }

    if let Some(fenced) = strip_code_fence(trimmed) {
        if let Ok(value) = serde_json::from_str::<T>(fenced) {
            return Ok(value);
        }
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str::<T>(&trimmed[start..=end]) {
                    return Ok(value);
                }
            }
        }
    }

    Err(AppError::InvalidResponse {
        source_name: source_name.to_string(),
        message: format!(
            "expected JSON, got: {}",
            trimmed.chars().take(120).collect::<String>()
        ),
    })
}

fn strip_code_fence(text: &str) -> Option<&str> {
    let body = text.strip_prefix("```")?;
    let body = body.strip_prefix("json").unwrap_or(body);
    let end = body.rfind("```")?;
    Some(body[..end].trim())
}

/// Rate limiter shared by all requests of one client
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// OpenAI-compatible chat completions client
pub struct OpenAiChatClient {
    client: reqwest::Client,
    config: LlmConfig,
    api_key: String,
    limiter: Option<Arc<GlobalRateLimiter>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAiChatClient {
    /// Create a new chat client
    pub fn new(config: LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "llm.api_key is required for the openai provider".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let limiter = NonZeroU32::new(config.requests_per_second)
            .map(|rate| Arc::new(RateLimiter::direct(Quota::per_second(rate))));

        Ok(Self {
            client,
            config,
            api_key,
            limiter,
        })
    }

    /// Make request with retry
    async fn request_with_retry(&self, request: &LlmRequest) -> Result<String> {
        let max_retries = self.config.max_retries;
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_elapsed_time: Some(self.config.timeout() * (max_retries + 1)),
            ..ExponentialBackoff::default()
        };

        let mut attempt = 0u32;
        retry(policy, || {
            attempt += 1;
            let current = attempt;
            async move {
                match self.make_request(request).await {
                    Ok(text) => Ok(text),
                    Err(e) if is_transient(&e) && current <= max_retries => {
                        tracing::warn!(
                            attempt = current,
                            max_retries = max_retries,
                            purpose = request.purpose.as_str(),
                            error = %e,
                            "LLM request failed, retrying"
                        );
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        })
        .await
    }

    async fn make_request(&self, request: &LlmRequest) -> Result<String> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature.unwrap_or(self.config.temperature),
            response_format: request
                .json_mode
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AppError::Unauthorized {
                message: format!("LLM API rejected credentials ({})", status),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Llm {
                message: format!("LLM API error {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| AppError::InvalidResponse {
            source_name: "llm".to_string(),
            message: format!("Failed to parse LLM response: {}", e),
        })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::InvalidResponse {
                source_name: "llm".to_string(),
                message: "Empty response from LLM".to_string(),
            })
    }

    fn map_transport_error(&self, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            AppError::Timeout {
                operation: "llm request".to_string(),
                timeout_ms: self.config.timeout().as_millis() as u64,
            }
        } else {
            AppError::Llm {
                message: format!("LLM API request failed: {}", err),
            }
        }
    }
}

/// Failures worth another attempt: transport errors, timeouts, 429 and 5xx
fn is_transient(err: &AppError) -> bool {
    match err {
        AppError::Timeout { .. } | AppError::HttpClient(_) => true,
        AppError::Llm { message } => {
            !message.starts_with("LLM API error 4") || message.starts_with("LLM API error 429")
        }
        _ => false,
    }
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    async fn invoke(&self, request: &LlmRequest) -> Result<String> {
        let start = Instant::now();
        let result = self.request_with_retry(request).await;

        metrics::record_llm_call(
            start.elapsed().as_secs_f64(),
            request.purpose.as_str(),
            result.is_ok(),
        );

        result
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Create an LLM client based on configuration
pub fn create_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiChatClient::new(config.clone())?)),
        other => Err(AppError::Configuration {
            message: format!("Unknown LLM provider: {}", other),
        }),
    }
}
