//! # finlens-embed
//!
//! Text embeddings for the finlens retrieval pipeline. Every provider turns a
//! string into a fixed-length `f32` vector behind the async
//! [`EmbeddingProvider`] trait, so the retriever never knows which backend it
//! is talking to.
//!
//! ## Providers
//!
//! - [`OpenAiEmbeddingProvider`]: calls an OpenAI-compatible `/embeddings`
//!   endpoint, one request per text.
//! - [`HashEmbeddingProvider`]: deterministic feature hashing, no network.
//!   Used for offline runs and tests.
//!
//! ## Quick Start
//!
//! ```no_run
//! use finlens_embed::{EmbedConfig, EmbeddingProvider, OpenAiEmbeddingProvider};
//!
//! # async fn example() -> finlens_embed::Result<()> {
//! let provider = OpenAiEmbeddingProvider::new(
//!     EmbedConfig::from_env().with_expected_dimension(1536),
//! )?;
//!
//! let texts = vec!["Revenue grew 12%".to_string(), "Debt was refinanced".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//!
//! println!("Generated {} embeddings of dimension {}", result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! [`EmbedConfig`] holds the model name, API root, key, timeout and an
//! optional expected dimension. `OPENAI_API_KEY`,
//! `OPENAI_BASE_URL` and `FINLENS_EMBED_MODEL` override the defaults.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] using the crate's [`EmbedError`] type,
//! which distinguishes configuration, transport, service and response
//! failures.

pub mod config;
pub mod error;
pub mod hashed;
pub mod openai;
pub mod provider;

// Re-export main types for easy access
pub use config::{DEFAULT_API_BASE, DEFAULT_MODEL, EmbedConfig, EmbedConfigBuilder};
pub use error::{EmbedError, Result};
pub use hashed::HashEmbeddingProvider;
pub use openai::OpenAiEmbeddingProvider;
pub use provider::{EmbeddingProvider, EmbeddingResult, validate_embedding};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_providers_are_object_safe() {
        let provider: Arc<dyn EmbeddingProvider> =
            Arc::new(HashEmbeddingProvider::new(12).unwrap());

        let texts = vec!["gross margin".to_string(), "free cash flow".to_string()];
        let result = provider.embed_texts(&texts).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 12);
    }
}
