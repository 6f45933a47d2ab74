//! Effects produced by state transitions

use crate::store::ToolCall;
use serde::Serialize;
use std::time::Duration;

/// A message to append to the conversation. Ids and timestamps are assigned
/// when the effect is executed.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingMessage {
    User {
        text: String,
    },
    Assistant {
        text: String,
    },
    /// Assistant message that carries tool calls
    ToolRequest {
        text: String,
        calls: Vec<ToolCall>,
    },
    ToolResult {
        call_id: String,
        tool_name: String,
        output: String,
    },
}

/// Progress of a tool call as shown to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Running,
    Succeeded,
    Failed,
}

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append a message to the store
    PersistMessage(PendingMessage),

    /// Call the model with the stored history. Yields a model event.
    RequestModel { allow_tools: bool },

    /// Run a tool. Yields `ToolComplete`.
    ExecuteTool { call: ToolCall },

    NotifyToolActivity { tool: String, status: ToolStatus },

    /// Wait, then yield `RetryElapsed`
    ScheduleRetry { delay: Duration, attempt: u32 },

    /// The turn completed with an answer
    Finish,

    /// The turn ended without an answer
    Fail { message: String },
}

impl Effect {
    /// Whether executing this effect feeds an event back into the machine
    pub fn yields_event(&self) -> bool {
        matches!(
            self,
            Effect::RequestModel { .. } | Effect::ExecuteTool { .. } | Effect::ScheduleRetry { .. }
        )
    }

    pub fn persist_user(text: impl Into<String>) -> Self {
        Effect::PersistMessage(PendingMessage::User { text: text.into() })
    }

    pub fn persist_assistant(text: impl Into<String>) -> Self {
        Effect::PersistMessage(PendingMessage::Assistant { text: text.into() })
    }

    pub fn tool_activity(tool: impl Into<String>, status: ToolStatus) -> Self {
        Effect::NotifyToolActivity {
            tool: tool.into(),
            status,
        }
    }
}
