//! # finlens-report
//!
//! Turns an uploaded financial document into a structured investment report.
//!
//! ## Architecture
//!
//! A report is produced by a fixed four-stage pipeline ([`ReportPipeline`]):
//!
//! 1. **Verify**: decide whether the upload is a financial document
//! 2. **Analyze**: call the retrieval tool once and extract metrics and trends
//! 3. **AssessRisk**: derive risks from the validated analysis only
//! 4. **Compile**: merge analysis and risks into the final report JSON
//!
//! Every stage talks to a [`TextGenerator`] and must return JSON matching its
//! output type before the next stage starts. Document access goes through
//! [`finlens_retriever::FinancialDocumentTool`].
//!
//! Around the pipeline sit an in-process job queue ([`AnalysisQueue`]) and a
//! report store ([`SqliteReportStore`]).
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! finlens analyze --file statements/q3.pdf --query "How did margins change?"
//! finlens list
//! finlens report <report-id>
//! ```
//!
//! ### As a library
//! ```no_run
//! use finlens_report::{AppConfig, PipelineInput, build_pipeline};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AppConfig::load(None)?;
//! let pipeline = build_pipeline(&config)?;
//! let run = pipeline
//!     .run(&PipelineInput {
//!         path: "data/q3.pdf".to_string(),
//!         query: "Summarize liquidity".to_string(),
//!     })
//!     .await?;
//! println!("{}", run.report.investment_conclusion);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use finlens_embed::{EmbeddingProvider, HashEmbeddingProvider, OpenAiEmbeddingProvider};
use finlens_retriever::{AutoLoader, FinancialDocumentTool, Retriever};
use std::sync::Arc;

pub mod config;
pub mod generation;
pub mod pipeline;
pub mod queue;
pub mod stages;
pub mod store;

pub use config::{AppConfig, EmbedderKind};
pub use generation::{
    GenerationConfig, GenerationError, GenerationRequest, OpenAiChatGenerator, TextGenerator,
};
pub use pipeline::{
    PipelineError, PipelineFailure, PipelineInput, PipelineRun, PipelineState, ReportPipeline,
};
pub use queue::{
    AnalysisJob, AnalysisQueue, DEFAULT_QUERY, QueueConfig, QueueError, TaskStatus, stage_upload,
};
pub use stages::{
    DocumentVerification, FinancialAnalysis, InvestmentReport, RiskAssessment, StageKind,
};
pub use store::{MemoryReportStore, NewReport, ReportStore, SqliteReportStore, StoredReport};

/// Embedding backend selected by `config.embedder`.
pub fn build_embedder(config: &AppConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(match config.embedder {
        EmbedderKind::OpenAi => Arc::new(
            OpenAiEmbeddingProvider::new(config.embedding.clone())
                .context("failed to configure embedding service")?,
        ),
        EmbedderKind::Hash => Arc::new(HashEmbeddingProvider::default()),
    })
}

/// Retrieval tool wired with the configured loader and embedder.
pub fn build_tool(config: &AppConfig) -> Result<FinancialDocumentTool> {
    let retriever = Retriever::new(Arc::new(AutoLoader), build_embedder(config)?, config.retrieval)
        .context("invalid retrieval configuration")?;
    Ok(FinancialDocumentTool::new(retriever))
}

/// Pipeline backed by the configured chat service.
pub fn build_pipeline(config: &AppConfig) -> Result<ReportPipeline> {
    config.validate()?;
    let generator = OpenAiChatGenerator::new(config.generation.clone())
        .context("failed to configure text generation")?;
    Ok(ReportPipeline::new(Arc::new(generator), build_tool(config)?)
        .with_temperature(config.generation.temperature))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_tool_with_hash_embedder() {
        let config = AppConfig {
            embedder: EmbedderKind::Hash,
            ..AppConfig::default()
        };
        let tool = build_tool(&config).unwrap();
        assert_eq!(tool.name(), "financial_document_reader");
        assert_eq!(tool.retriever().embedder_name(), "hash");
    }

    #[test]
    fn test_embed_concurrency_reaches_the_retriever() {
        let config = AppConfig::from_toml(
            "embedder = \"hash\"\n[retrieval]\nembed_concurrency = 8\n",
        )
        .unwrap();
        let tool = build_tool(&config).unwrap();
        assert_eq!(tool.retriever().config().embed_concurrency, 8);

        // The old per-provider knob is rejected instead of silently ignored
        assert!(
            AppConfig::from_toml("embedder = \"hash\"\n[embedding]\nmax_concurrency = 8\n")
                .is_err()
        );
    }

    #[test]
    fn test_build_tool_rejects_zero_top_k() {
        let mut config = AppConfig {
            embedder: EmbedderKind::Hash,
            ..AppConfig::default()
        };
        config.retrieval.top_k = 0;
        assert!(build_tool(&config).is_err());
    }

    #[test]
    fn test_build_pipeline_validates_config() {
        let mut config = AppConfig {
            embedder: EmbedderKind::Hash,
            ..AppConfig::default()
        };
        config.generation.api_key = Some("sk-test".to_string());
        assert!(build_pipeline(&config).is_ok());

        config.generation.temperature = 5.0;
        assert!(build_pipeline(&config).is_err());
    }
}
