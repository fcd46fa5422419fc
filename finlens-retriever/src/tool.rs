//! The `financial_document_reader` tool.
//!
//! Wraps a [`Retriever`] in the contract a text-generation agent sees: a name,
//! a description, a JSON schema with two string arguments and a call that
//! always answers with text. Retrieval failures become readable messages so
//! the caller can reason about them; only fatal errors escape as `Err`.

use crate::error::RetrievalError;
use crate::retriever::Retriever;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, warn};

pub const TOOL_NAME: &str = "financial_document_reader";

pub const TOOL_DESCRIPTION: &str = "Performs vector-based retrieval on a financial PDF file. \
Requires two arguments: path (string) and query (string). \
Returns the most relevant document chunks.";

/// Arguments accepted by the tool. Absent arguments read as empty strings
/// and are reported by the retriever's input checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolArgs {
    pub path: String,
    pub query: String,
}

/// Name, description and parameter schema, in the shape used for function
/// calling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// Vector retrieval over a financial document, exposed as a tool.
#[derive(Debug, Clone)]
pub struct FinancialDocumentTool {
    retriever: Retriever,
}

impl FinancialDocumentTool {
    pub fn new(retriever: Retriever) -> Self {
        Self { retriever }
    }

    pub fn name(&self) -> &'static str {
        TOOL_NAME
    }

    pub fn description(&self) -> &'static str {
        TOOL_DESCRIPTION
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// JSON schema of the arguments: exactly `path` and `query`, both
    /// required strings.
    pub fn parameters_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Filesystem path of the financial PDF"
                },
                "query": {
                    "type": "string",
                    "description": "What to look for in the document"
                }
            },
            "required": ["path", "query"],
            "additionalProperties": false
        })
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_NAME,
            description: TOOL_DESCRIPTION,
            parameters: Self::parameters_schema(),
        }
    }

    /// Retrieve passages for `query` from the document at `path`.
    ///
    /// On success the passages are joined with blank lines, nearest first.
    /// Non-fatal failures are returned as `Ok` with a message such as
    /// `"File not found at path: ..."` or `"RAG error: ..."`.
    pub async fn run(&self, path: &str, query: &str) -> Result<String, RetrievalError> {
        match self.retriever.retrieve(path, query).await {
            Ok(result) => Ok(result.to_context_string()),
            Err(e) if e.is_fatal() => {
                error!("Fatal retrieval failure for {}: {}", path, e);
                Err(e)
            }
            Err(e) => {
                warn!("Retrieval for {} failed ({:?}): {}", path, e.kind(), e);
                Ok(e.tool_message())
            }
        }
    }

    /// Run the tool from a JSON arguments object.
    pub async fn call_json(&self, args: &Value) -> Result<String, RetrievalError> {
        match ToolArgs::deserialize(args) {
            Ok(args) => self.run(&args.path, &args.query).await,
            Err(e) => {
                warn!("Rejected tool arguments: {}", e);
                Ok(format!("Invalid arguments for {TOOL_NAME}: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::TextLoader;
    use crate::retriever::RetrieverConfig;
    use finlens_embed::HashEmbeddingProvider;
    use std::sync::Arc;

    fn tool() -> FinancialDocumentTool {
        let retriever = Retriever::new(
            Arc::new(TextLoader),
            Arc::new(HashEmbeddingProvider::default()),
            RetrieverConfig::default(),
        )
        .unwrap();
        FinancialDocumentTool::new(retriever)
    }

    #[test]
    fn test_schema_has_exactly_two_required_strings() {
        let schema = FinancialDocumentTool::parameters_schema();
        let properties = schema["properties"].as_object().unwrap();

        assert_eq!(properties.len(), 2);
        assert_eq!(properties["path"]["type"], "string");
        assert_eq!(properties["query"]["type"], "string");
        assert_eq!(schema["required"], json!(["path", "query"]));
        assert_eq!(schema["additionalProperties"], json!(false));
    }

    #[test]
    fn test_definition() {
        let definition = tool().definition();
        assert_eq!(definition.name, "financial_document_reader");
        assert!(definition.description.contains("path (string) and query (string)"));
    }

    #[tokio::test]
    async fn test_errors_become_text() {
        let tool = tool();

        assert_eq!(tool.run("", "revenue").await.unwrap(), "No file path provided.");
        assert_eq!(
            tool.run("/missing/10-K.pdf", "revenue").await.unwrap(),
            "File not found at path: /missing/10-K.pdf"
        );
    }

    #[tokio::test]
    async fn test_call_json() {
        let tool = tool();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q3.txt");
        std::fs::write(&path, "Quarterly revenue was $12.4 million.").unwrap();

        let output = tool
            .call_json(&json!({"path": path.to_str().unwrap(), "query": "revenue"}))
            .await
            .unwrap();
        assert_eq!(output, "Quarterly revenue was $12.4 million.\n");

        let output = tool.call_json(&json!({"path": path.to_str().unwrap()})).await.unwrap();
        assert_eq!(output, "No query provided for retrieval.");

        let output = tool
            .call_json(&json!({"path": "x", "query": "y", "top_k": 3}))
            .await
            .unwrap();
        assert!(output.starts_with("Invalid arguments for financial_document_reader"));
    }
}
