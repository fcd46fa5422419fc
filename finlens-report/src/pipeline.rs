//! The staged report pipeline.
//!
//! A run walks a fixed state machine:
//!
//! ```text
//! Verify → Analyze → AssessRisk → Compile → Done
//!    └─────────┴──────────┴───────────┴──→ Failed
//! ```
//!
//! Each stage sends one [`GenerationRequest`] and parses the reply into its
//! typed output before the next stage starts, so later prompts only ever see
//! validated JSON. The Analyze stage is the only one that reads the document,
//! and it calls the retrieval tool exactly once per run.

use crate::generation::{DEFAULT_TEMPERATURE, GenerationError, GenerationRequest, TextGenerator};
use crate::stages::{
    self, DocumentVerification, FinancialAnalysis, InvestmentReport, RiskAssessment, StageKind,
};
use finlens_retriever::{FinancialDocumentTool, RetrievalError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Verify,
    Analyze,
    AssessRisk,
    Compile,
    Done,
    Failed,
}

impl PipelineState {
    /// The stage executed in this state, if any.
    pub fn stage(self) -> Option<StageKind> {
        match self {
            Self::Verify => Some(StageKind::Verify),
            Self::Analyze => Some(StageKind::Analyze),
            Self::AssessRisk => Some(StageKind::AssessRisk),
            Self::Compile => Some(StageKind::Compile),
            Self::Done | Self::Failed => None,
        }
    }

    /// The state after this one completes successfully.
    pub fn next(self) -> Self {
        match self {
            Self::Verify => Self::Analyze,
            Self::Analyze => Self::AssessRisk,
            Self::AssessRisk => Self::Compile,
            Self::Compile => Self::Done,
            Self::Done => Self::Done,
            Self::Failed => Self::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Why a stage could not complete.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{stage} stage: text generation failed: {source}")]
    Generation {
        stage: StageKind,
        #[source]
        source: GenerationError,
    },

    #[error("{stage} stage returned invalid JSON: {message}")]
    InvalidStageOutput {
        stage: StageKind,
        message: String,
        raw: String,
    },

    #[error("document retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("the retrieval tool may only be called once per run")]
    ToolBudgetExhausted,

    #[error("pipeline finished without every stage output")]
    Incomplete,
}

/// A failed run: the error plus the states visited before it.
#[derive(Debug, thiserror::Error)]
#[error("report pipeline failed: {error}")]
pub struct PipelineFailure {
    pub error: PipelineError,
    /// Visited states, ending with [`PipelineState::Failed`]
    pub trace: Vec<PipelineState>,
}

/// What to analyze.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineInput {
    pub path: String,
    pub query: String,
}

/// A completed run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub verification: DocumentVerification,
    pub analysis: FinancialAnalysis,
    pub risk: RiskAssessment,
    pub report: InvestmentReport,
    /// The Compile stage's reply as parsed JSON, exactly as returned
    pub report_json: Value,
    /// What the retrieval tool returned for the Analyze stage
    pub retrieval_output: String,
    /// Visited states, ending with [`PipelineState::Done`]
    pub trace: Vec<PipelineState>,
}

/// Allows a fixed number of retrieval tool calls in one run.
#[derive(Debug)]
struct ToolBudget {
    remaining: usize,
}

impl ToolBudget {
    fn once() -> Self {
        Self { remaining: 1 }
    }

    fn spend(&mut self) -> Result<(), PipelineError> {
        if self.remaining == 0 {
            return Err(PipelineError::ToolBudgetExhausted);
        }
        self.remaining -= 1;
        Ok(())
    }
}

#[derive(Default)]
struct RunOutputs {
    verification: Option<DocumentVerification>,
    analysis: Option<(FinancialAnalysis, Value)>,
    retrieval_output: Option<String>,
    risk: Option<(RiskAssessment, Value)>,
    report: Option<(InvestmentReport, Value)>,
}

/// Runs the four stages against injected generation and retrieval services.
#[derive(Clone)]
pub struct ReportPipeline {
    generator: Arc<dyn TextGenerator>,
    tool: FinancialDocumentTool,
    temperature: f32,
}

impl std::fmt::Debug for ReportPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportPipeline")
            .field("model", &self.generator.model_name())
            .field("tool", &self.tool.name())
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl ReportPipeline {
    pub fn new(generator: Arc<dyn TextGenerator>, tool: FinancialDocumentTool) -> Self {
        Self {
            generator,
            tool,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_temperature(self, temperature: f32) -> Self {
        Self {
            temperature,
            ..self
        }
    }

    pub fn tool(&self) -> &FinancialDocumentTool {
        &self.tool
    }

    /// Execute all stages in order.
    pub async fn run(&self, input: &PipelineInput) -> Result<PipelineRun, PipelineFailure> {
        let mut state = PipelineState::Verify;
        let mut trace = Vec::with_capacity(5);
        let mut outputs = RunOutputs::default();
        let mut budget = ToolBudget::once();

        info!("Starting report pipeline for {}", input.path);

        while !state.is_terminal() {
            trace.push(state);
            match self.step(state, input, &mut outputs, &mut budget).await {
                Ok(()) => {
                    debug!("Stage {:?} complete", state);
                    state = state.next();
                }
                Err(error) => {
                    warn!("Report pipeline failed in {:?}: {}", state, error);
                    trace.push(PipelineState::Failed);
                    return Err(PipelineFailure { error, trace });
                }
            }
        }

        let RunOutputs {
            verification: Some(verification),
            analysis: Some((analysis, _)),
            retrieval_output: Some(retrieval_output),
            risk: Some((risk, _)),
            report: Some((report, report_json)),
        } = outputs
        else {
            trace.push(PipelineState::Failed);
            return Err(PipelineFailure {
                error: PipelineError::Incomplete,
                trace,
            });
        };
        trace.push(PipelineState::Done);

        info!("Report pipeline finished for {}", input.path);
        Ok(PipelineRun {
            verification,
            analysis,
            risk,
            report,
            report_json,
            retrieval_output,
            trace,
        })
    }

    async fn step(
        &self,
        state: PipelineState,
        input: &PipelineInput,
        outputs: &mut RunOutputs,
        budget: &mut ToolBudget,
    ) -> Result<(), PipelineError> {
        let Some(stage) = state.stage() else {
            return Ok(());
        };

        match stage {
            StageKind::Verify => {
                let prompt = stages::verify_prompt(&input.path);
                let (verification, _) = self.generate::<DocumentVerification>(stage, prompt).await?;
                info!(
                    "Verification: financial document = {} ({})",
                    verification.is_financial_document, verification.reason
                );
                outputs.verification = Some(verification);
            }
            StageKind::Analyze => {
                budget.spend()?;
                let passages = self.tool.run(&input.path, &input.query).await?;
                debug!("Retrieval tool returned {} chars", passages.len());

                let prompt = stages::analyze_prompt(&input.path, &input.query, &passages);
                outputs.analysis = Some(self.generate::<FinancialAnalysis>(stage, prompt).await?);
                outputs.retrieval_output = Some(passages);
            }
            StageKind::AssessRisk => {
                let analysis = prior(&outputs.analysis, stage)?;
                let prompt = stages::assess_risk_prompt(analysis);
                outputs.risk = Some(self.generate::<RiskAssessment>(stage, prompt).await?);
            }
            StageKind::Compile => {
                let analysis = prior(&outputs.analysis, stage)?;
                let risk = prior(&outputs.risk, stage)?;
                let prompt = stages::compile_prompt(analysis, risk);
                outputs.report = Some(self.generate::<InvestmentReport>(stage, prompt).await?);
            }
        }
        Ok(())
    }

    async fn generate<T: DeserializeOwned>(
        &self,
        stage: StageKind,
        prompt: String,
    ) -> Result<(T, Value), PipelineError> {
        info!("Running {} stage with {}", stage, self.generator.model_name());

        let request = GenerationRequest {
            system: stages::descriptor(stage).system_prompt(),
            prompt,
            temperature: self.temperature,
        };
        let raw = self
            .generator
            .complete(&request)
            .await
            .map_err(|source| PipelineError::Generation { stage, source })?;

        stages::parse_stage_output::<T>(&raw).map_err(|e| PipelineError::InvalidStageOutput {
            stage,
            message: e.to_string(),
            raw,
        })
    }
}

/// The validated JSON of an earlier stage.
fn prior<T>(output: &Option<(T, Value)>, stage: StageKind) -> Result<&Value, PipelineError> {
    output
        .as_ref()
        .map(|(_, value)| value)
        .ok_or_else(|| PipelineError::InvalidStageOutput {
            stage,
            message: "an earlier stage produced no output".to_string(),
            raw: String::new(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let mut state = PipelineState::Verify;
        let mut visited = vec![state];
        while !state.is_terminal() {
            state = state.next();
            visited.push(state);
        }
        assert_eq!(
            visited,
            vec![
                PipelineState::Verify,
                PipelineState::Analyze,
                PipelineState::AssessRisk,
                PipelineState::Compile,
                PipelineState::Done
            ]
        );
        assert_eq!(PipelineState::Failed.next(), PipelineState::Failed);
        assert_eq!(PipelineState::Done.stage(), None);
    }

    #[test]
    fn test_tool_budget_allows_one_call() {
        let mut budget = ToolBudget::once();
        assert!(budget.spend().is_ok());
        assert!(matches!(
            budget.spend(),
            Err(PipelineError::ToolBudgetExhausted)
        ));
    }
}
