//! Embeddings from an OpenAI-compatible HTTP service

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, validate_embedding};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Calls `POST {api_base}/embeddings` once per text.
///
/// Every request carries the configured model name and a bearer token. The
/// service must answer with `{"data": [{"embedding": [...]}]}`.
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    config: EmbedConfig,
    api_key: String,
    endpoint: String,
}

impl std::fmt::Debug for OpenAiEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbeddingProvider")
            .field("endpoint", &self.endpoint)
            .field("model", &self.config.model_name)
            .finish_non_exhaustive()
    }
}

impl OpenAiEmbeddingProvider {
    /// Build a provider from a validated configuration.
    ///
    /// # Errors
    /// [`EmbedError::InvalidConfig`] when the configuration is invalid or no
    /// API key can be found.
    pub fn new(config: EmbedConfig) -> Result<Self> {
        Self::with_env_lookup(config, |key| std::env::var(key).ok())
    }

    /// Same as [`new`](Self::new), reading the fallback API key through
    /// `lookup` instead of the process environment.
    pub fn with_env_lookup<F>(config: EmbedConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        config.validate()?;
        let api_key = config
            .resolve_api_key_from(lookup)
            .ok_or_else(|| EmbedError::invalid_config("no API key configured; set OPENAI_API_KEY"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let endpoint = config.embeddings_url();

        debug!(
            "Created embedding provider for model {} at {}",
            config.model_name, endpoint
        );

        Ok(Self {
            client,
            config,
            api_key,
            endpoint,
        })
    }

    /// Build a provider from the environment (`OPENAI_API_KEY`, `OPENAI_BASE_URL`,
    /// `FINLENS_EMBED_MODEL`).
    pub fn from_env() -> Result<Self> {
        Self::new(EmbedConfig::from_env())
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }
}

/// Extract the first vector from a successful response body.
fn parse_embedding_response(body: &str, expected: Option<usize>) -> Result<Vec<f32>> {
    let response: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| EmbedError::malformed(format!("invalid response body: {e}")))?;

    let embedding = response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| EmbedError::malformed("response contained no embeddings"))?;

    validate_embedding(&embedding, expected)?;
    Ok(embedding)
}

/// Best-effort extraction of the service's error message.
fn parse_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.trim().is_empty() => "no response body".to_string(),
        Err(_) => body.trim().chars().take(500).collect(),
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.config.model_name,
            input: text,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = parse_error_message(&body);
            warn!("Embedding request failed with {}: {}", status, message);
            return Err(EmbedError::Service {
                status: status.as_u16(),
                message,
            });
        }

        parse_embedding_response(&body, self.config.expected_dimension)
    }

    fn embedding_dimension(&self) -> Option<usize> {
        self.config.expected_dimension
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_is_config_error() {
        let err = OpenAiEmbeddingProvider::with_env_lookup(EmbedConfig::default(), |_| None)
            .unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig { .. }));
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        // A key from the lookup is enough
        let provider = OpenAiEmbeddingProvider::with_env_lookup(EmbedConfig::default(), |key| {
            (key == "OPENAI_API_KEY").then(|| "sk-env".to_string())
        });
        assert!(provider.is_ok());
    }

    #[test]
    fn test_provider_construction() {
        let config = EmbedConfig::openai("text-embedding-3-large")
            .with_api_key("sk-test")
            .with_expected_dimension(3072);
        let provider = OpenAiEmbeddingProvider::new(config).unwrap();

        assert_eq!(provider.provider_name(), "openai");
        assert_eq!(provider.embedding_dimension(), Some(3072));
        assert_eq!(provider.endpoint, "https://api.openai.com/v1/embeddings");
        assert!(!format!("{provider:?}").contains("sk-test"));
    }

    #[test]
    fn test_request_body_shape() {
        let request = EmbeddingRequest {
            model: "text-embedding-3-small",
            input: "Total assets",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"model": "text-embedding-3-small", "input": "Total assets"})
        );
    }

    #[test]
    fn test_parse_embedding_response() {
        let body = r#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.25,-0.5,1.0]}],"model":"m"}"#;
        assert_eq!(
            parse_embedding_response(body, None).unwrap(),
            vec![0.25, -0.5, 1.0]
        );
        assert!(matches!(
            parse_embedding_response(body, Some(4)),
            Err(EmbedError::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_parse_malformed_responses() {
        for body in [r#"{"data":[]}"#, "not json", r#"{"data":[{"embedding":[]}]}"#] {
            assert!(matches!(
                parse_embedding_response(body, None),
                Err(EmbedError::MalformedResponse { .. })
            ));
        }
    }

    #[test]
    fn test_parse_error_message() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(parse_error_message(body), "Incorrect API key provided");
        assert_eq!(parse_error_message("Bad Gateway"), "Bad Gateway");
        assert_eq!(parse_error_message(""), "no response body");
    }
}
