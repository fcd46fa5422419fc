//! The four report stages: what each one asks for and what it must return.
//!
//! Every stage is described by a [`StageDescriptor`] (role, goal and whether
//! it may use document retrieval) and produces one typed JSON output. Prompts
//! carry the exact JSON shape expected, and replies are parsed strictly into
//! the matching struct.

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::LazyLock;

/// Which stage of the report pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Verify,
    Analyze,
    AssessRisk,
    Compile,
}

impl StageKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Verify => "verify",
            Self::Analyze => "analyze",
            Self::AssessRisk => "assess_risk",
            Self::Compile => "compile",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static description of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDescriptor {
    pub kind: StageKind,
    pub role: &'static str,
    pub goal: &'static str,
    /// Whether the stage receives retrieved document passages
    pub uses_retrieval: bool,
}

impl StageDescriptor {
    /// System prompt shared by every request of this stage.
    pub fn system_prompt(&self) -> String {
        format!(
            "You are the {}. {} Respond with strictly valid JSON only: no markdown, no text outside the JSON.",
            self.role, self.goal
        )
    }
}

/// The stages in execution order.
pub const STAGES: [StageDescriptor; 4] = [
    StageDescriptor {
        kind: StageKind::Verify,
        role: "Financial Document Validator",
        goal: "Determine whether the file contains structured financial reporting data such as income statements, balance sheets, cash flow statements or earnings commentary.",
        uses_retrieval: false,
    },
    StageDescriptor {
        kind: StageKind::Analyze,
        role: "Senior Financial Analyst",
        goal: "Provide structured, data-backed insights based strictly on the retrieved document content and the user's query. Never fabricate information.",
        uses_retrieval: true,
    },
    StageDescriptor {
        kind: StageKind::AssessRisk,
        role: "Financial Risk Assessment Specialist",
        goal: "Identify liquidity, leverage, operational and market risks supported by the financial analysis provided.",
        uses_retrieval: false,
    },
    StageDescriptor {
        kind: StageKind::Compile,
        role: "Financial Report Compiler",
        goal: "Combine the financial analysis and risk assessment into one clear, structured investment report.",
        uses_retrieval: false,
    },
];

/// Look up the descriptor of `kind`.
pub fn descriptor(kind: StageKind) -> &'static StageDescriptor {
    match kind {
        StageKind::Verify => &STAGES[0],
        StageKind::Analyze => &STAGES[1],
        StageKind::AssessRisk => &STAGES[2],
        StageKind::Compile => &STAGES[3],
    }
}

/// Output of the verification stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentVerification {
    pub is_financial_document: bool,
    #[serde(default)]
    pub detected_sections: Vec<String>,
    pub reason: String,
}

/// Headline figures; values may be numbers or text such as "Not stated in document".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFinancialMetrics {
    pub revenue: Value,
    pub net_income: Value,
    #[serde(default)]
    pub other_metrics: Map<String, Value>,
}

/// Output of the analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialAnalysis {
    pub executive_summary: String,
    pub key_financial_metrics: KeyFinancialMetrics,
    pub observed_trends: String,
    pub direct_answer: String,
    pub conclusion: String,
}

/// Output of the risk stage, also embedded in the final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub liquidity_risk: String,
    pub leverage_risk: String,
    pub operational_risk: String,
    pub market_exposure_risk: String,
    pub overall_risk_summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialOverview {
    #[serde(default)]
    pub key_metrics: Map<String, Value>,
    pub observed_trends: String,
}

/// Output of the compile stage: the final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentReport {
    pub executive_summary: String,
    pub financial_overview: FinancialOverview,
    pub risk_assessment: RiskAssessment,
    pub investment_conclusion: String,
}

/// Message the analysis prompt uses for values the passages do not contain.
pub const NOT_STATED: &str = "Not stated in document";

pub fn verify_prompt(path: &str) -> String {
    format!(
        "You are given a document located at {path}.\n\n\
         Determine whether this document contains structured financial reporting data \
         such as income statements, balance sheets, cash flow statements, or earnings commentary.\n\n\
         Return your answer strictly as JSON in the following format:\n\
         {{\n  \"is_financial_document\": true/false,\n  \"detected_sections\": [\"section1\", \"section2\"],\n  \"reason\": \"short explanation\"\n}}\n\n\
         Do not fabricate information."
    )
}

/// Prompt for the analysis stage. `passages` is the retrieval tool's output,
/// included verbatim whether it holds passages or an error message.
pub fn analyze_prompt(path: &str, query: &str, passages: &str) -> String {
    format!(
        "You are given a financial PDF located at {path}.\n\n\
         User query:\n{query}\n\n\
         The tool `financial_document_reader` was called once with this path and query. \
         Its output follows between the markers.\n\
         <<<DOCUMENT\n{passages}\nDOCUMENT>>>\n\n\
         Rules:\n\
         - Analyze ONLY the content between the markers; do not use external knowledge.\n\
         - Do not fabricate financial values.\n\
         - If a metric includes a YoY or sequential percentage change, state whether it increased or decreased.\n\
         - Do not describe declining metrics as strong, robust, or growing.\n\
         - If a value is not present, or the tool output is an error or says the document is empty, use \"{NOT_STATED}\".\n\
         - If the query is unrelated to the financial data in the document, say that the document does not contain relevant information.\n\n\
         Return strictly valid JSON in the following format:\n\
         {{\n  \"executive_summary\": \"string\",\n  \"key_financial_metrics\": {{\n    \"revenue\": \"string or number\",\n    \"net_income\": \"string or number\",\n    \"other_metrics\": {{}}\n  }},\n  \"observed_trends\": \"string\",\n  \"direct_answer\": \"string\",\n  \"conclusion\": \"string\"\n}}"
    )
}

pub fn assess_risk_prompt(analysis: &Value) -> String {
    format!(
        "Financial analysis JSON from the previous stage:\n{analysis}\n\n\
         Assess financial risks strictly based on that information.\n\
         - Do not introduce new financial data or assume unsupported risks.\n\
         - If metrics are missing, state that the risk cannot be determined from the available information.\n\n\
         Return strictly valid JSON in the following format:\n\
         {{\n  \"liquidity_risk\": \"string\",\n  \"leverage_risk\": \"string\",\n  \"operational_risk\": \"string\",\n  \"market_exposure_risk\": \"string\",\n  \"overall_risk_summary\": \"string\"\n}}"
    )
}

pub fn compile_prompt(analysis: &Value, risk: &Value) -> String {
    format!(
        "Financial analysis JSON:\n{analysis}\n\n\
         Risk assessment JSON:\n{risk}\n\n\
         Combine them into a single structured investment report. Preserve all numerical accuracy, \
         do not introduce new data and do not contradict the earlier analysis.\n\n\
         Return strictly valid JSON in the following format:\n\
         {{\n  \"executive_summary\": \"string\",\n  \"financial_overview\": {{\n    \"key_metrics\": {{}},\n    \"observed_trends\": \"string\"\n  }},\n  \"risk_assessment\": {{\n    \"liquidity_risk\": \"string\",\n    \"leverage_risk\": \"string\",\n    \"operational_risk\": \"string\",\n    \"market_exposure_risk\": \"string\",\n    \"overall_risk_summary\": \"string\"\n  }},\n  \"investment_conclusion\": \"string\"\n}}"
    )
}

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z]*\s*\n?(.*?)\s*```\s*$").expect("fence pattern is valid")
});

/// Remove a surrounding markdown code fence (```` ```json ... ``` ````), if any.
pub fn strip_code_fences(text: &str) -> &str {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => text.trim(),
    }
}

/// Parse a stage reply into both its raw JSON value and its typed form.
pub fn parse_stage_output<T: DeserializeOwned>(raw: &str) -> Result<(T, Value), serde_json::Error> {
    let value: Value = serde_json::from_str(strip_code_fences(raw))?;
    let typed = T::deserialize(&value)?;
    Ok((typed, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_and_retrieval() {
        let kinds: Vec<StageKind> = STAGES.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StageKind::Verify,
                StageKind::Analyze,
                StageKind::AssessRisk,
                StageKind::Compile
            ]
        );

        let retrieving: Vec<StageKind> = STAGES
            .iter()
            .filter(|s| s.uses_retrieval)
            .map(|s| s.kind)
            .collect();
        assert_eq!(retrieving, vec![StageKind::Analyze]);
        assert_eq!(descriptor(StageKind::Compile).role, "Financial Report Compiler");
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{\"a\": 1}```\n"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_verification() {
        let raw = "```json\n{\"is_financial_document\": true, \"detected_sections\": [\"income statement\"], \"reason\": \"Contains P&L\"}\n```";
        let (verification, value): (DocumentVerification, Value) = parse_stage_output(raw).unwrap();

        assert!(verification.is_financial_document);
        assert_eq!(verification.detected_sections, vec!["income statement"]);
        assert_eq!(value["reason"], "Contains P&L");
    }

    #[test]
    fn test_metrics_accept_numbers_and_text() {
        let raw = r#"{
            "executive_summary": "s",
            "key_financial_metrics": {"revenue": 25.2, "net_income": "Not stated in document"},
            "observed_trends": "t",
            "direct_answer": "d",
            "conclusion": "c"
        }"#;
        let (analysis, _): (FinancialAnalysis, Value) = parse_stage_output(raw).unwrap();

        assert_eq!(analysis.key_financial_metrics.revenue, serde_json::json!(25.2));
        assert_eq!(analysis.key_financial_metrics.net_income, NOT_STATED);
        assert!(analysis.key_financial_metrics.other_metrics.is_empty());
    }

    #[test]
    fn test_missing_fields_are_rejected() {
        let raw = r#"{"liquidity_risk": "low"}"#;
        assert!(parse_stage_output::<RiskAssessment>(raw).is_err());
        assert!(parse_stage_output::<RiskAssessment>("not json").is_err());
    }

    #[test]
    fn test_analyze_prompt_includes_tool_output_verbatim() {
        let prompt = analyze_prompt("data/q3.pdf", "How did revenue change?", "The document appears empty.");
        assert!(prompt.contains("<<<DOCUMENT\nThe document appears empty.\nDOCUMENT>>>"));
        assert!(prompt.contains("How did revenue change?"));
        assert!(prompt.contains(NOT_STATED));
    }
}
