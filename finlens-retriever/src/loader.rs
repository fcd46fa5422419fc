//! Document loaders that turn a file into page texts.
//!
//! The retriever only needs the text of each page; how it is obtained is
//! behind the [`DocumentLoader`] trait so tests and callers can plug in their
//! own source.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Errors raised while reading a document.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to extract text from PDF {}: {message}", path.display())]
    Pdf { path: PathBuf, message: String },

    #[error("unsupported document format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("document loading task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl LoaderError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Source of page texts for a document path.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load the document at `path` as one string per page, in page order.
    async fn load_pages(&self, path: &Path) -> Result<Vec<String>, LoaderError>;
}

/// Joins page texts into one document: every page is trimmed and followed
/// by a newline.
///
/// ```
/// use finlens_retriever::loader::assemble_document;
///
/// let pages = vec!["  Income statement \n".to_string(), "".to_string(), "Notes".to_string()];
/// assert_eq!(assemble_document(&pages), "Income statement\n\nNotes\n");
/// ```
pub fn assemble_document(pages: &[String]) -> String {
    let mut document = String::with_capacity(pages.iter().map(|p| p.len() + 1).sum());
    for page in pages {
        document.push_str(page.trim());
        document.push('\n');
    }
    document
}

/// Extracts PDF text page by page with `pdf-extract`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfLoader;

/// Reads UTF-8 text; form feeds (`\x0c`) separate pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLoader;

/// Picks [`PdfLoader`] or [`TextLoader`] from the file's leading bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoLoader;

fn pdf_pages(path: &Path, bytes: Vec<u8>) -> Result<Vec<String>, LoaderError> {
    // pdf-extract panics on some malformed inputs
    let extracted = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(&bytes)
    }));

    match extracted {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(LoaderError::Pdf {
            path: path.to_path_buf(),
            message: format!("{e:?}"),
        }),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "extractor panicked".to_string());
            warn!("PDF extraction panicked for {}: {}", path.display(), message);
            Err(LoaderError::Pdf {
                path: path.to_path_buf(),
                message,
            })
        }
    }
}

fn text_pages(text: &str) -> Vec<String> {
    text.split('\x0c').map(str::to_string).collect()
}

async fn pdf_pages_blocking(path: &Path, bytes: Vec<u8>) -> Result<Vec<String>, LoaderError> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || pdf_pages(&owned, bytes)).await?
}

#[async_trait]
impl DocumentLoader for PdfLoader {
    async fn load_pages(&self, path: &Path) -> Result<Vec<String>, LoaderError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| LoaderError::io(path, e))?;
        let pages = pdf_pages_blocking(path, bytes).await?;
        debug!("Extracted {} PDF pages from {}", pages.len(), path.display());
        Ok(pages)
    }
}

#[async_trait]
impl DocumentLoader for TextLoader {
    async fn load_pages(&self, path: &Path) -> Result<Vec<String>, LoaderError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LoaderError::io(path, e))?;
        Ok(text_pages(&text))
    }
}

#[async_trait]
impl DocumentLoader for AutoLoader {
    async fn load_pages(&self, path: &Path) -> Result<Vec<String>, LoaderError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| LoaderError::io(path, e))?;

        if bytes.starts_with(b"%PDF") {
            return pdf_pages_blocking(path, bytes).await;
        }

        match String::from_utf8(bytes) {
            Ok(text) => Ok(text_pages(&text)),
            Err(_) => Err(LoaderError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}
