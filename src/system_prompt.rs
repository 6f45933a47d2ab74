//! System prompt construction
//!
//! The base prompt describes the assistant and its tools. When the
//! conversation has an indexed document, a short note naming it is appended
//! so the model knows `rag_tool` has something to search.

use crate::rag::DocumentMetadata;
use std::fmt::Write;

/// Base system prompt establishing the assistant's role
const BASE_PROMPT: &str = r"You are a helpful assistant. Answer conversationally and concisely.

You have access to these tools:
- web_search: look up short encyclopedic facts (instant answers, not live news).
- calculator: add, subtract, multiply or divide two numbers.
- get_stock_price: fetch the latest quote for a ticker symbol.
- rag_tool: retrieve passages from the PDF the user uploaded to this chat.

Use a tool when it gives a better answer than your own knowledge. For questions about the uploaded document, always call rag_tool first and base your answer on the passages it returns, citing page numbers where helpful. If a tool reports an error, explain the problem to the user instead of retrying blindly.";

const NO_DOCUMENT_NOTE: &str = "\n\nNo document has been uploaded to this chat yet. If the user asks about one, tell them to upload a PDF first.";

pub fn build_system_prompt(document: Option<&DocumentMetadata>) -> String {
    let mut prompt = String::from(BASE_PROMPT);

    match document {
        Some(doc) => {
            let _ = write!(
                prompt,
                "\n\n<indexed_document>\nThe user uploaded '{}' ({} pages, {} searchable chunks). Use rag_tool to answer questions about it.\n</indexed_document>",
                doc.filename, doc.document_count, doc.chunk_count
            );
        }
        None => prompt.push_str(NO_DOCUMENT_NOTE),
    }

    prompt
}
