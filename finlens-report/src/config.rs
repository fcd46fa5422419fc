//! Application configuration for the `finlens` binary.
//!
//! Settings come from a TOML file (default `finlens.toml`, or the path in
//! `FINLENS_CONFIG`), then environment overrides. Every section is optional:
//!
//! ```toml
//! database_path = "finlens-reports.db"
//! upload_dir = "data"
//! embedder = "openai"
//!
//! [generation]
//! model = "gpt-4o-mini"
//! temperature = 0.2
//!
//! [embedding]
//! model_name = "text-embedding-3-small"
//!
//! [retrieval]
//! chunk_size = 2000
//! overlap = 200
//! top_k = 6
//!
//! [queue]
//! workers = 2
//! cleanup_uploads = true
//! ```

use crate::generation::GenerationConfig;
use crate::queue::QueueConfig;
use anyhow::{Context, Result, anyhow};
use finlens_embed::EmbedConfig;
use finlens_retriever::RetrieverConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Config file read when neither a path nor `FINLENS_CONFIG` is given.
pub const DEFAULT_CONFIG_FILE: &str = "finlens.toml";

/// Which embedding backend the retriever uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// OpenAI-compatible `/embeddings` service
    #[default]
    OpenAi,
    /// Local feature hashing, no network
    Hash,
}

impl FromStr for EmbedderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "hash" => Ok(Self::Hash),
            other => Err(anyhow!("unknown embedder '{other}', expected openai or hash")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    /// Uploads are staged here before analysis
    pub upload_dir: PathBuf,
    pub embedder: EmbedderKind,
    pub generation: GenerationConfig,
    pub embedding: EmbedConfig,
    pub retrieval: RetrieverConfig,
    pub queue: QueueConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("finlens-reports.db"),
            upload_dir: PathBuf::from("data"),
            embedder: EmbedderKind::default(),
            generation: GenerationConfig::default(),
            embedding: EmbedConfig::default(),
            retrieval: RetrieverConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, `FINLENS_CONFIG` or [`DEFAULT_CONFIG_FILE`], then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => std::env::var_os("FINLENS_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
        };
        Ok(Self::from_file(&path)?.with_overrides_from(|key| std::env::var(key).ok()))
    }

    /// Parse a TOML file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| anyhow!("invalid config: {e}"))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }

    /// Apply overrides from an arbitrary key lookup. Blank values are ignored.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = value("OPENAI_API_KEY") {
            self.generation.api_key = Some(key);
        }
        if let Some(base) = value("OPENAI_BASE_URL") {
            self.generation.api_base = base;
        }
        if let Some(model) = value("FINLENS_CHAT_MODEL") {
            self.generation.model = model;
        }
        if let Some(path) = value("FINLENS_DATABASE") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(dir) = value("FINLENS_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(dir);
        }
        self.embedding = self.embedding.with_overrides_from(&lookup);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.generation.validate()?;
        if self.embedder == EmbedderKind::OpenAi {
            self.embedding.validate()?;
        }
        if self.retrieval.top_k == 0 {
            return Err(anyhow!("retrieval.top_k must be positive"));
        }
        if self.queue.workers == 0 {
            return Err(anyhow!("queue.workers must be positive"));
        }
        Ok(())
    }
}
