//! Retrieval over the current conversation's uploaded document

use super::{Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub const NO_DOCUMENT_MESSAGE: &str = "No document indexed for this chat. Upload a PDF first.";

pub struct RagQueryTool;

#[derive(Debug, Deserialize)]
struct RagQueryInput {
    query: String,
}

#[async_trait]
impl Tool for RagQueryTool {
    fn name(&self) -> &'static str {
        "rag_tool"
    }

    fn description(&self) -> String {
        "Retrieve relevant passages from the PDF the user uploaded to this chat. Use this for any question about the uploaded document.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look for in the document"
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: RagQueryInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolOutput::error_json(format!("Invalid input: {e}")),
        };

        let lookup = ctx.documents().query(&ctx.conversation_id, &input.query);
        let result = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return ToolOutput::cancelled(),
            result = lookup => result,
        };

        match result {
            Ok(None) => ToolOutput::error_json(NO_DOCUMENT_MESSAGE),
            Ok(Some(chunks)) => {
                let source_file = chunks.first().map(|c| c.source.clone());
                let context: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
                let metadata: Vec<Value> = chunks
                    .iter()
                    .map(|c| json!({ "page": c.page, "source": c.source }))
                    .collect();
                ToolOutput::success(
                    json!({
                        "query": input.query,
                        "context": context,
                        "metadata": metadata,
                        "source_file": source_file,
                    })
                    .to_string(),
                )
            }
            Err(e) => ToolOutput::error_json(format!("Document retrieval failed: {e}")),
        }
    }
}
