//! API request and response types

use crate::rag::DocumentMetadata;
use crate::store::{ConversationSummary, Message};
use serde::{Deserialize, Serialize};

/// One entry of the chat request's message list
#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Request to send a chat message. Only the last user entry is used; the
/// history lives on the server.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: Option<String>,
}

/// Response with a list of conversations
#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationSummary>,
}

/// Full state of one conversation
#[derive(Debug, Serialize)]
pub struct ConversationStateResponse {
    pub conversation_id: String,
    pub messages: Vec<Message>,
    pub busy: bool,
    pub document: Option<DocumentMetadata>,
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub document: Option<DocumentMetadata>,
}

/// Response for cancel action
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
