//! # Language Model Client Module
//!
//! Thin prompt-to-text interface over an OpenAI-compatible chat completions
//! endpoint. Extraction and classification only need "send these two
//! instructions, get text back", so that is all the trait exposes.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn, Instrument};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::ModelConfig;
use crate::errors::{error_logging, AppError, AppResult};
use crate::observability;

/// System and user instructions for one completion
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Failures of a language model call
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// No API key is configured
    NotConfigured,
    Transport(String),
    Status { status: u16, body: String },
    EmptyResponse,
    /// Too many recent failures, the call was not attempted
    CircuitOpen,
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::NotConfigured => write!(f, "Language model is not configured"),
            ModelError::Transport(msg) => write!(f, "Language model request failed: {}", msg),
            ModelError::Status { status, body } => {
                write!(f, "Language model returned HTTP {}: {}", status, body)
            }
            ModelError::EmptyResponse => write!(f, "Language model returned an empty response"),
            ModelError::CircuitOpen => write!(
                f,
                "Language model is temporarily unavailable due to repeated failures"
            ),
        }
    }
}

impl std::error::Error for ModelError {}

/// Prompt in, text out
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError>;
}

/// Chat completions client with a circuit breaker
pub struct OpenAiChatClient {
    http: reqwest::Client,
    config: ModelConfig,
    breaker: CircuitBreaker,
}

impl OpenAiChatClient {
    /// Build a client with the configured request timeout
    pub fn new(config: ModelConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
            config,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn send(&self, api_key: &str, request: &CompletionRequest) -> Result<String, ModelError> {
        let body = json!({
            "model": self.config.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ModelError::Transport(format!("invalid response body: {}", e)))?;

        Ok(message_content(&payload).unwrap_or_default())
    }
}

/// Text of the first choice's message, if any
fn message_content(payload: &Value) -> Option<String> {
    payload
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl LanguageModel for OpenAiChatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError> {
        let api_key = match self.config.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => key,
            _ => return Err(ModelError::NotConfigured),
        };

        if self.breaker.is_open() {
            warn!("Circuit breaker is open, rejecting language model request");
            observability::update_circuit_breaker_state("model", true);
            return Err(ModelError::CircuitOpen);
        }

        let start_time = Instant::now();
        let endpoint = self.endpoint();
        let result = self
            .send(api_key, request)
            .instrument(observability::model_span("complete", &self.config.model))
            .await;

        match &result {
            Ok(content) if content.trim().is_empty() => {
                self.breaker.record_success();
                observability::record_model_request("empty", start_time.elapsed());
            }
            Ok(content) => {
                self.breaker.record_success();
                observability::record_model_request("success", start_time.elapsed());
                debug!(
                    characters = content.len(),
                    duration_ms = start_time.elapsed().as_millis() as u64,
                    "Language model responded"
                );
            }
            Err(err) => {
                self.breaker.record_failure();
                observability::record_model_request("failure", start_time.elapsed());
                error_logging::log_model_error(err, "complete", Some(&endpoint));
            }
        }
        observability::update_circuit_breaker_state("model", self.breaker.is_open());

        match result {
            Ok(content) if content.trim().is_empty() => Err(ModelError::EmptyResponse),
            other => other,
        }
    }
}
