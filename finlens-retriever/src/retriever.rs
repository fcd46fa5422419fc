//! Query-time retrieval over a single document.
//!
//! A [`Retriever`] answers one question about one file at a time: it loads the
//! file, cuts the text into overlapping windows, embeds every window, builds a
//! fresh [`FlatL2Index`] and returns the windows nearest to the embedded query.
//! Nothing is cached between calls, so concurrent retrievals never share
//! chunks, vectors or index state.

use crate::error::RetrievalError;
use crate::index::FlatL2Index;
use crate::loader::{DocumentLoader, assemble_document};
use finlens_context::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP, TextChunk, WindowChunker};
use finlens_embed::EmbeddingProvider;
use futures::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Number of passages returned when not configured otherwise.
pub const DEFAULT_TOP_K: usize = 6;

/// Separator placed between passages in the rendered result.
pub const PASSAGE_SEPARATOR: &str = "\n\n";

/// Tuning knobs for a [`Retriever`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Window length in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive windows
    pub overlap: usize,
    /// Maximum number of passages returned
    pub top_k: usize,
    /// Embedding requests in flight at once; 1 embeds sequentially
    pub embed_concurrency: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            top_k: DEFAULT_TOP_K,
            embed_concurrency: 1,
        }
    }
}

impl RetrieverConfig {
    pub fn with_chunking(self, chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            ..self
        }
    }

    pub fn with_top_k(self, top_k: usize) -> Self {
        Self { top_k, ..self }
    }

    pub fn with_embed_concurrency(self, embed_concurrency: usize) -> Self {
        Self {
            embed_concurrency,
            ..self
        }
    }
}

/// One retrieved window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedPassage {
    /// Position of the window in the document's chunk sequence
    pub chunk_index: usize,
    /// Character offset where the window starts
    pub start: usize,
    /// Character offset one past the window's end
    pub end: usize,
    /// Squared L2 distance between the window and the query
    pub distance: f32,
    pub text: String,
}

/// Passages ranked nearest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub passages: Vec<RetrievedPassage>,
    /// Number of windows the document was split into
    pub chunk_count: usize,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Passage texts in rank order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.passages.iter().map(|p| p.text.as_str())
    }

    /// The passage texts joined with a blank line, as handed to a language model.
    pub fn to_context_string(&self) -> String {
        self.texts().collect::<Vec<_>>().join(PASSAGE_SEPARATOR)
    }
}

impl std::fmt::Display for RetrievalResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_context_string())
    }
}

/// Embedding-based retrieval over a single document.
///
/// The loader and the embedding provider are injected at construction and
/// shared read-only by every call.
#[derive(Clone)]
pub struct Retriever {
    loader: Arc<dyn DocumentLoader>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: WindowChunker,
    config: RetrieverConfig,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("embedder", &self.embedder.provider_name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Retriever {
    /// Create a retriever.
    ///
    /// # Errors
    /// [`RetrievalError::Chunking`] when `overlap >= chunk_size` or
    /// `chunk_size` is zero, [`RetrievalError::InvalidTopK`] when `top_k` is zero.
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrieverConfig,
    ) -> Result<Self, RetrievalError> {
        let chunker = WindowChunker::new(config.chunk_size, config.overlap)?;
        if config.top_k == 0 {
            return Err(RetrievalError::InvalidTopK);
        }
        Ok(Self {
            loader,
            embedder,
            chunker,
            config,
        })
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Name of the injected embedding provider.
    pub fn embedder_name(&self) -> &str {
        self.embedder.provider_name()
    }

    /// Retrieve the passages of the document at `path` nearest to `query`.
    ///
    /// Inputs are checked in order: path, file existence, query. A document
    /// whose text is blank fails before any embedding request is made.
    pub async fn retrieve(&self, path: &str, query: &str) -> Result<RetrievalResult, RetrievalError> {
        if path.is_empty() {
            return Err(RetrievalError::MissingPath);
        }
        let file = Path::new(path);
        if !tokio::fs::try_exists(file).await.unwrap_or(false) {
            return Err(RetrievalError::FileNotFound {
                path: path.to_string(),
            });
        }
        if query.is_empty() {
            return Err(RetrievalError::MissingQuery);
        }

        let pages = self.loader.load_pages(file).await?;
        let document = assemble_document(&pages);
        if document.trim().is_empty() {
            return Err(RetrievalError::EmptyDocument);
        }

        let chunks = self.chunker.chunk(&document);
        if chunks.is_empty() {
            return Err(RetrievalError::NoChunks);
        }
        debug!(
            "Split {} pages ({} chars) into {} chunks",
            pages.len(),
            document.chars().count(),
            chunks.len()
        );

        let embeddings = self.embed_chunks(&chunks).await?;
        let index = FlatL2Index::build(&embeddings)?;
        debug!(
            "Indexed {} embeddings of dimension {}",
            index.len(),
            index.dimension()
        );

        let query_embedding = self.embedder.embed_text(query).await?;
        let neighbors = index.search(&query_embedding, self.config.top_k)?;

        let passages = neighbors
            .into_iter()
            .map(|neighbor| {
                let chunk = &chunks[neighbor.index];
                RetrievedPassage {
                    chunk_index: chunk.sequence,
                    start: chunk.start,
                    end: chunk.end,
                    distance: neighbor.distance,
                    text: chunk.text.clone(),
                }
            })
            .collect::<Vec<_>>();

        info!(
            "Retrieved {} of {} chunks from {}",
            passages.len(),
            chunks.len(),
            path
        );

        Ok(RetrievalResult {
            passages,
            chunk_count: chunks.len(),
        })
    }

    /// One embedding request per chunk. Output position `i` always holds the
    /// embedding of `chunks[i]`, whatever the concurrency.
    async fn embed_chunks(&self, chunks: &[TextChunk]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let concurrency = self.config.embed_concurrency.max(1);

        if concurrency == 1 {
            let mut embeddings = Vec::with_capacity(chunks.len());
            for chunk in chunks {
                embeddings.push(self.embedder.embed_text(&chunk.text).await?);
            }
            return Ok(embeddings);
        }

        // Each request owns its inputs so the retrieval future stays Send
        let requests: Vec<_> = chunks
            .iter()
            .map(|chunk| {
                let embedder = Arc::clone(&self.embedder);
                let text = chunk.text.clone();
                async move { embedder.embed_text(&text).await }
            })
            .collect();

        // buffered (not buffer_unordered) yields results in input order
        let embeddings = stream::iter(requests)
            .buffered(concurrency)
            .try_collect::<Vec<_>>()
            .await?;
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoaderError;
    use async_trait::async_trait;
    use finlens_embed::HashEmbeddingProvider;
    use tempfile::NamedTempFile;
    use tracing_test::traced_test;

    struct StaticLoader(Vec<String>);

    #[async_trait]
    impl DocumentLoader for StaticLoader {
        async fn load_pages(&self, _path: &Path) -> Result<Vec<String>, LoaderError> {
            Ok(self.0.clone())
        }
    }

    fn retriever(pages: &[&str], config: RetrieverConfig) -> Retriever {
        Retriever::new(
            Arc::new(StaticLoader(pages.iter().map(|p| p.to_string()).collect())),
            Arc::new(HashEmbeddingProvider::default()),
            config,
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_chunking_fails_at_construction() {
        let err = Retriever::new(
            Arc::new(StaticLoader(vec![])),
            Arc::new(HashEmbeddingProvider::default()),
            RetrieverConfig::default().with_chunking(100, 100),
        )
        .unwrap_err();
        assert!(matches!(err, RetrievalError::Chunking(_)));
    }

    #[test]
    fn test_zero_top_k_fails_at_construction() {
        let err = Retriever::new(
            Arc::new(StaticLoader(vec![])),
            Arc::new(HashEmbeddingProvider::default()),
            RetrieverConfig::default().with_top_k(0),
        )
        .unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidTopK));
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_concurrent_retrieval_runs_on_spawned_task() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let r = retriever(
            &["Revenue grew eight percent", "Margins fell on higher costs"],
            RetrieverConfig::default()
                .with_chunking(12, 3)
                .with_embed_concurrency(4),
        );

        // tokio::spawn requires the retrieval future to be Send
        let handle = tokio::spawn(async move { r.retrieve(&path, "margins").await });
        let result = handle.await.unwrap().unwrap();

        assert!(result.chunk_count > 4);
        assert_eq!(result.len(), 6);
    }

    #[tokio::test]
    async fn test_validation_order() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        let r = retriever(&["text"], RetrieverConfig::default());

        assert!(matches!(
            r.retrieve("", "").await,
            Err(RetrievalError::MissingPath)
        ));
        assert!(matches!(
            r.retrieve("/no/such/file.pdf", "").await,
            Err(RetrievalError::FileNotFound { .. })
        ));
        assert!(matches!(
            r.retrieve(path, "").await,
            Err(RetrievalError::MissingQuery)
        ));
    }

    #[tokio::test]
    async fn test_blank_document_is_empty() {
        let file = NamedTempFile::new().unwrap();
        let r = retriever(&["  ", "\n"], RetrieverConfig::default());

        let err = r
            .retrieve(file.path().to_str().unwrap(), "revenue")
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::EmptyDocument));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_small_document_returns_every_chunk() {
        let file = NamedTempFile::new().unwrap();
        let r = retriever(
            &["Revenue grew", "Margins fell"],
            RetrieverConfig::default().with_chunking(10, 2),
        );

        let result = r
            .retrieve(file.path().to_str().unwrap(), "revenue")
            .await
            .unwrap();

        // "Revenue grew\nMargins fell\n" is 26 chars: starts 0, 8, 16, 24
        assert_eq!(result.chunk_count, 4);
        assert_eq!(result.len(), 4);
        let mut indices: Vec<usize> = result.passages.iter().map(|p| p.chunk_index).collect();
        indices.sort();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(result.passages.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert!(logs_contain("Retrieved 4 of 4 chunks"));
    }

    #[test]
    fn test_result_rendering() {
        let passage = |i: usize, text: &str| RetrievedPassage {
            chunk_index: i,
            start: 0,
            end: text.chars().count(),
            distance: i as f32,
            text: text.to_string(),
        };
        let result = RetrievalResult {
            passages: vec![passage(2, "second"), passage(0, "first")],
            chunk_count: 3,
        };

        assert_eq!(result.to_context_string(), "second\n\nfirst");
        assert_eq!(result.to_string(), "second\n\nfirst");
    }
}
