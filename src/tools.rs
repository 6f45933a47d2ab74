//! Tools the model may call during a turn
//!
//! Tools are stateless singletons; everything a call needs arrives through
//! [`ToolContext`]. A tool never fails the turn: problems are reported in
//! the returned [`ToolOutput`].

mod calculator;
mod rag_query;
mod stock_price;
mod web_search;

pub use calculator::CalculatorTool;
pub use rag_query::RagQueryTool;
pub use stock_price::StockPriceTool;
pub use web_search::WebSearchTool;

use crate::llm::ToolDefinition;
use crate::rag::DocumentRegistry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result from tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
        }
    }

    /// Error encoded as `{"error": message}`, the shape the model sees for
    /// structured tools
    pub fn error_json(message: impl Into<String>) -> Self {
        Self::error(json!({ "error": message.into() }).to_string())
    }

    pub fn cancelled() -> Self {
        Self::error_json("Tool call cancelled")
    }
}

/// All context needed for a tool invocation.
///
/// Created fresh for each tool call by the turn runtime.
#[derive(Clone)]
pub struct ToolContext {
    /// Cancellation signal for the turn this call belongs to
    pub cancel: CancellationToken,

    /// The conversation this tool is executing within
    pub conversation_id: String,

    documents: Arc<DocumentRegistry>,
}

impl ToolContext {
    pub fn new(
        cancel: CancellationToken,
        conversation_id: impl Into<String>,
        documents: Arc<DocumentRegistry>,
    ) -> Self {
        Self {
            cancel,
            conversation_id: conversation_id.into(),
            documents,
        }
    }

    pub fn documents(&self) -> &DocumentRegistry {
        &self.documents
    }
}

/// Trait for tools that can be executed by the model
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// Tool description for LLM
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Execute the tool. Network-bound tools should give up when
    /// `ctx.cancel` fires.
    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput;
}

/// Collection of tools available to conversations
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// The standard tool set: web search, calculator, stock quotes and
    /// document retrieval
    pub fn standard(alphavantage_api_key: Option<String>) -> Self {
        Self::with_tools(vec![
            Arc::new(WebSearchTool::default()),
            Arc::new(CalculatorTool),
            Arc::new(StockPriceTool::new(alphavantage_api_key)),
            Arc::new(RagQueryTool),
        ])
    }

    pub fn with_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// Get all tool definitions for LLM
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Execute a tool by name with context; `None` for unknown names
    pub async fn execute(&self, name: &str, input: Value, ctx: ToolContext) -> Option<ToolOutput> {
        let tool = self.tools.iter().find(|t| t.name() == name)?;
        Some(tool.run(input, ctx).await)
    }
}

/// Run `fut` unless the call is cancelled first
pub(crate) async fn cancellable<F>(ctx: &ToolContext, fut: F) -> ToolOutput
where
    F: std::future::Future<Output = ToolOutput>,
{
    tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => ToolOutput::cancelled(),
        output = fut => output,
    }
}
