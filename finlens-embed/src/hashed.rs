//! Deterministic feature-hashing embeddings.
//!
//! [`HashEmbeddingProvider`] needs no network and no model files: each
//! lower-cased word token is hashed with FNV into one of `dimension` buckets
//! with a hash-derived sign, and the resulting vector is L2-normalised. Texts
//! sharing vocabulary land close together, which is enough for offline runs
//! and for exercising the retrieval pipeline in tests.

use crate::error::{EmbedError, Result};
use crate::provider::EmbeddingProvider;
use async_trait::async_trait;
use fnv::FnvHasher;
use std::hash::Hasher;

/// FNV-1a 64-bit offset basis
const DEFAULT_SEED: u64 = 0xcbf2_9ce4_8422_2325;

/// Offline embedding provider based on feature hashing
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimension: usize,
    seed: u64,
}

impl HashEmbeddingProvider {
    pub const DEFAULT_DIMENSION: usize = 256;

    /// Create a provider producing vectors of `dimension` components.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbedError::invalid_config(
                "hash embedding dimension must be positive",
            ));
        }
        Ok(Self {
            dimension,
            seed: DEFAULT_SEED,
        })
    }

    /// Use a different hash seed; vectors from different seeds are unrelated.
    pub fn with_seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }

    /// Embed synchronously. Text without word tokens maps to the zero vector.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = FnvHasher::with_key(self.seed);
            hasher.write(token.to_lowercase().as_bytes());
            let hash = hasher.finish();

            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self {
            dimension: Self::DEFAULT_DIMENSION,
            seed: DEFAULT_SEED,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn embedding_dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    fn provider_name(&self) -> &str {
        "hash"
    }
}
