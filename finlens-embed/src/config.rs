//! Configuration for embedding providers

use crate::error::{EmbedError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Embedding model used when none is configured.
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// OpenAI-compatible API root used when none is configured.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Configuration for an HTTP embedding service
#[derive(Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
#[serde(default, deny_unknown_fields)]
pub struct EmbedConfig {
    /// Name of the embedding model to request
    #[builder(default = r#"DEFAULT_MODEL.to_string()"#)]
    pub model_name: String,
    /// API root, e.g. "https://api.openai.com/v1"
    #[builder(default = r#"DEFAULT_API_BASE.to_string()"#)]
    pub api_base: String,
    /// API key; falls back to `OPENAI_API_KEY` when unset
    #[builder(default)]
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Per-request timeout in seconds
    #[builder(default = "30")]
    pub timeout_secs: u64,
    /// Reject vectors whose length differs from this value
    #[builder(default)]
    pub expected_dimension: Option<usize>,
}

impl std::fmt::Debug for EmbedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedConfig")
            .field("model_name", &self.model_name)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("expected_dimension", &self.expected_dimension)
            .finish()
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        EmbedConfigBuilder::default()
            .build()
            .expect("all EmbedConfig fields have defaults")
    }
}

impl EmbedConfig {
    /// Create a new embedding configuration using the builder
    pub fn builder() -> EmbedConfigBuilder {
        EmbedConfigBuilder::default()
    }

    /// Create a configuration for the given model with default endpoint settings
    pub fn openai(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// Default configuration with `OPENAI_API_KEY`, `OPENAI_BASE_URL` and
    /// `FINLENS_EMBED_MODEL` applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment overrides on top of this configuration
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Blank values are ignored.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = value("OPENAI_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(base) = value("OPENAI_BASE_URL") {
            self.api_base = base;
        }
        if let Some(model) = value("FINLENS_EMBED_MODEL") {
            self.model_name = model;
        }
        self
    }

    /// Set the API key (builder style)
    pub fn with_api_key<S: Into<String>>(self, api_key: S) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..self
        }
    }

    /// Pin the expected embedding dimension (builder style)
    pub fn with_expected_dimension(self, dimension: usize) -> Self {
        Self {
            expected_dimension: Some(dimension),
            ..self
        }
    }

    /// URL of the embeddings endpoint
    pub fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.api_base.trim_end_matches('/'))
    }

    /// The configured API key, or `OPENAI_API_KEY` from the environment
    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_from(|key| std::env::var(key).ok())
    }

    /// Like [`resolve_api_key`](Self::resolve_api_key) with variables read
    /// through `lookup` instead of the process environment.
    pub fn resolve_api_key_from<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.api_key
            .clone()
            .or_else(|| lookup("OPENAI_API_KEY"))
            .filter(|key| !key.trim().is_empty())
    }

    /// Validate the configuration values
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(EmbedError::invalid_config("model_name must not be empty"));
        }
        if !(self.api_base.starts_with("http://") || self.api_base.starts_with("https://")) {
            return Err(EmbedError::invalid_config(format!(
                "api_base must be an http(s) URL, got '{}'",
                self.api_base
            )));
        }
        if self.timeout_secs == 0 {
            return Err(EmbedError::invalid_config("timeout_secs must be positive"));
        }
        if self.expected_dimension == Some(0) {
            return Err(EmbedError::invalid_config(
                "expected_dimension must be positive when set",
            ));
        }

        tracing::debug!("Embedding configuration valid for model: {}", self.model_name);
        Ok(())
    }
}
