//! Text generation behind the [`TextGenerator`] trait.
//!
//! The report pipeline only needs "system prompt + user prompt in, text out".
//! [`OpenAiChatGenerator`] implements that against an OpenAI-compatible
//! `/chat/completions` endpoint; tests substitute scripted generators.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Chat model used when none is configured.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Sampling temperature used when none is configured.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Errors from a text-generation backend.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Invalid generation configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Generation request failed: {source}")]
    Request {
        #[from]
        source: reqwest::Error,
    },

    #[error("Generation service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("Malformed generation response: {message}")]
    MalformedResponse { message: String },
}

impl GenerationError {
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }
}

/// One completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    /// Instructions describing who the model is and what it must do
    pub system: String,
    /// The task itself
    pub prompt: String,
    pub temperature: f32,
}

/// A backend that completes a prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    fn model_name(&self) -> &str;
}

/// Connection settings for an OpenAI-compatible chat service
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub api_base: String,
    /// Falls back to `OPENAI_API_KEY` when unset
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            api_base: finlens_embed::DEFAULT_API_BASE.to_string(),
            api_key: None,
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: 120,
        }
    }
}

impl GenerationConfig {
    pub fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_from(|key| std::env::var(key).ok())
    }

    /// Configured key, else `OPENAI_API_KEY` as seen through `lookup`.
    pub fn resolve_api_key_from<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.api_key
            .clone()
            .or_else(|| lookup("OPENAI_API_KEY"))
            .filter(|key| !key.trim().is_empty())
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.model.trim().is_empty() {
            return Err(GenerationError::invalid_config("model must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(GenerationError::invalid_config(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }
        if self.timeout_secs == 0 {
            return Err(GenerationError::invalid_config("timeout_secs must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn parse_chat_response(body: &str) -> Result<String, GenerationError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::malformed(format!("invalid response body: {e}")))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| GenerationError::malformed("response contained no message content"))
}

fn parse_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.trim().chars().take(500).collect(),
    }
}

/// Chat completions over HTTP.
pub struct OpenAiChatGenerator {
    client: reqwest::Client,
    config: GenerationConfig,
    api_key: String,
    endpoint: String,
}

impl std::fmt::Debug for OpenAiChatGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatGenerator")
            .field("endpoint", &self.endpoint)
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiChatGenerator {
    pub fn new(config: GenerationConfig) -> Result<Self, GenerationError> {
        Self::with_env_lookup(config, |key| std::env::var(key).ok())
    }

    pub fn with_env_lookup<F>(config: GenerationConfig, lookup: F) -> Result<Self, GenerationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        config.validate()?;
        let api_key = config.resolve_api_key_from(lookup).ok_or_else(|| {
            GenerationError::invalid_config("no API key configured; set OPENAI_API_KEY")
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let endpoint = config.chat_url();

        Ok(Self {
            client,
            config,
            api_key,
            endpoint,
        })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }
}

#[async_trait]
impl TextGenerator for OpenAiChatGenerator {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = ChatRequest {
            model: &self.config.model,
            temperature: request.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
        };

        debug!(
            "Requesting completion from {} ({} prompt chars)",
            self.config.model,
            request.prompt.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = parse_error_message(&text);
            warn!("Completion request failed with {}: {}", status, message);
            return Err(GenerationError::Service {
                status: status.as_u16(),
                message,
            });
        }

        parse_chat_response(&text)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
