//! Embedding provider trait and shared result types

use crate::error::{EmbedError, Result};
use async_trait::async_trait;

/// Result of embedding generation
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text, in input order
    pub embeddings: Vec<Vec<f32>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a result, checking that every vector has the same length.
    ///
    /// The dimension is taken from the first vector; an empty input gives
    /// dimension 0.
    ///
    /// # Errors
    /// [`EmbedError::DimensionMismatch`] naming the first vector whose length
    /// differs from the first one.
    pub fn try_new(embeddings: Vec<Vec<f32>>) -> Result<Self> {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
            return Err(EmbedError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }
        Ok(Self {
            embeddings,
            dimension,
        })
    }

    /// Returns the number of embedding vectors in this result.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this result contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    pub fn into_embeddings(self) -> Vec<Vec<f32>> {
        self.embeddings
    }
}

/// Trait for embedding providers that can generate embeddings from text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate the embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts.
    ///
    /// The default implementation issues one [`embed_text`](Self::embed_text)
    /// call per input, in order, and stops at the first failure.
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_text(text).await?);
        }
        EmbeddingResult::try_new(embeddings)
    }

    /// The dimension of the vectors this provider produces, when known in advance
    fn embedding_dimension(&self) -> Option<usize>;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Check a single vector returned by a provider.
///
/// Rejects empty vectors and non-finite components, and enforces
/// `expected` when given.
pub fn validate_embedding(embedding: &[f32], expected: Option<usize>) -> Result<()> {
    if embedding.is_empty() {
        return Err(EmbedError::malformed("empty embedding vector"));
    }
    if let Some(expected) = expected {
        if embedding.len() != expected {
            return Err(EmbedError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            });
        }
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(EmbedError::malformed("non-finite values in embedding"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct LengthProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for LengthProvider {
        async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text == "boom" {
                return Err(EmbedError::Service {
                    status: 500,
                    message: "internal error".to_string(),
                });
            }
            Ok(vec![text.len() as f32, 1.0])
        }

        fn embedding_dimension(&self) -> Option<usize> {
            Some(2)
        }

        fn provider_name(&self) -> &str {
            "length"
        }
    }

    #[test]
    fn test_embedding_result() {
        let result = EmbeddingResult::try_new(vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]])
            .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 3);
        assert!(!result.is_empty());

        let empty = EmbeddingResult::try_new(vec![]).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.dimension, 0);
    }

    #[test]
    fn test_embedding_result_rejects_mixed_dimensions() {
        let err = EmbeddingResult::try_new(vec![vec![0.1, 0.2], vec![0.3]]).unwrap_err();
        assert!(matches!(
            err,
            EmbedError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_validate_embedding() {
        assert!(validate_embedding(&[0.5, -0.5], None).is_ok());
        assert!(validate_embedding(&[0.5, -0.5], Some(2)).is_ok());
        assert!(validate_embedding(&[], None).is_err());
        assert!(validate_embedding(&[f32::NAN], None).is_err());
        assert!(matches!(
            validate_embedding(&[1.0, 2.0, 3.0], Some(2)),
            Err(EmbedError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_default_batch_embeds_in_order() {
        let provider = LengthProvider {
            calls: AtomicUsize::new(0),
        };
        let texts = vec!["a".to_string(), "abc".to_string(), "ab".to_string()];

        let result = provider.embed_texts(&texts).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        let firsts: Vec<f32> = result.embeddings.iter().map(|e| e[0]).collect();
        assert_eq!(firsts, vec![1.0, 3.0, 2.0]);
    }

    #[tokio::test]
    async fn test_default_batch_stops_at_first_failure() {
        let provider = LengthProvider {
            calls: AtomicUsize::new(0),
        };
        let texts = vec!["a".to_string(), "boom".to_string(), "never".to_string()];

        let err = provider.embed_texts(&texts).await.unwrap_err();

        assert!(matches!(err, EmbedError::Service { status: 500, .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
