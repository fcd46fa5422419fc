//! finlens-retriever: embedding-based passage retrieval over financial documents
//!
//! Given a document path and a question, the retriever loads the document,
//! splits it into overlapping character windows, embeds each window, indexes
//! the vectors for exact L2 search and returns the windows closest to the
//! question. Every call works on its own data; nothing persists between calls.
//!
//! ## Key Modules
//!
//! - **[`loader`]**: PDF and plain-text page extraction behind [`DocumentLoader`]
//! - **[`index`]**: [`FlatL2Index`], brute-force nearest-neighbour search
//! - **[`retriever`]**: the retrieval pipeline itself
//! - **[`tool`]**: the `financial_document_reader` contract that turns
//!   failures into text for a language model
//! - **[`error`]**: [`RetrievalError`] and its [`ErrorKind`] taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use finlens_embed::OpenAiEmbeddingProvider;
//! use finlens_retriever::{AutoLoader, FinancialDocumentTool, Retriever, RetrieverConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let retriever = Retriever::new(
//!     Arc::new(AutoLoader),
//!     Arc::new(OpenAiEmbeddingProvider::from_env()?),
//!     RetrieverConfig::default(),
//! )?;
//! let tool = FinancialDocumentTool::new(retriever);
//!
//! let context = tool.run("reports/q3.pdf", "How did revenue develop?").await?;
//! println!("{context}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! path → DocumentLoader → assemble → WindowChunker → EmbeddingProvider
//!                                                          ↓
//!        passages ← top-k search ← query embedding ← FlatL2Index
//! ```

pub mod error;
pub mod index;
pub mod loader;
pub mod retriever;
pub mod tool;

pub use error::{ErrorKind, RetrievalError};
pub use index::{FlatL2Index, IndexError, Neighbor};
pub use loader::{AutoLoader, DocumentLoader, LoaderError, PdfLoader, TextLoader, assemble_document};
pub use retriever::{
    DEFAULT_TOP_K, PASSAGE_SEPARATOR, RetrievalResult, RetrievedPassage, Retriever, RetrieverConfig,
};
pub use tool::{FinancialDocumentTool, TOOL_NAME, ToolArgs, ToolDefinition};
