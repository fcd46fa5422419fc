//! Error types for document retrieval

use crate::index::IndexError;
use crate::loader::LoaderError;
use finlens_context::ChunkError;
use finlens_embed::EmbedError;
use serde::Serialize;

/// Coarse classification of a [`RetrievalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing path, missing file, missing query or a zero `top_k`
    InvalidInput,
    /// The document could not be read
    LoaderError,
    /// The document has no text
    EmptyDocument,
    /// Chunking produced nothing or was misconfigured
    ChunkingFailure,
    /// The embedding service failed or returned unusable vectors
    EmbeddingServiceError,
    /// The vector index rejected its input
    IndexError,
}

/// Everything that can go wrong during one retrieval.
///
/// The `Display` text of the input and empty-document variants is the exact
/// message shown to the report pipeline, see [`RetrievalError::tool_message`].
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("No file path provided.")]
    MissingPath,

    #[error("File not found at path: {path}")]
    FileNotFound { path: String },

    #[error("No query provided for retrieval.")]
    MissingQuery,

    #[error("The document appears empty.")]
    EmptyDocument,

    #[error("No chunks generated from document.")]
    NoChunks,

    #[error("top_k must be at least 1")]
    InvalidTopK,

    #[error(transparent)]
    Chunking(#[from] ChunkError),

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error(transparent)]
    Embedding(#[from] EmbedError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl RetrievalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingPath
            | Self::FileNotFound { .. }
            | Self::MissingQuery
            | Self::InvalidTopK => ErrorKind::InvalidInput,
            Self::EmptyDocument => ErrorKind::EmptyDocument,
            Self::NoChunks | Self::Chunking(_) => ErrorKind::ChunkingFailure,
            Self::Loader(_) => ErrorKind::LoaderError,
            Self::Embedding(_) => ErrorKind::EmbeddingServiceError,
            Self::Index(_) => ErrorKind::IndexError,
        }
    }

    /// Fatal errors must not be converted into text for the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Index(e) if e.is_fatal())
    }

    /// The text a tool caller sees instead of retrieved passages.
    ///
    /// Input and empty-document failures use their plain message; failures
    /// of the loader, chunker, embedding service or index are prefixed with
    /// `RAG error: `.
    pub fn tool_message(&self) -> String {
        match self.kind() {
            ErrorKind::InvalidInput | ErrorKind::EmptyDocument => self.to_string(),
            ErrorKind::ChunkingFailure if matches!(self, Self::NoChunks) => self.to_string(),
            _ => format!("RAG error: {self}"),
        }
    }
}
