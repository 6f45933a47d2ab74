//! Events that drive a turn

use crate::llm::LlmErrorKind;
use crate::store::ToolCall;
use crate::tools::ToolOutput;
use std::time::Duration;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    UserMessage {
        text: String,
    },

    // Model events
    ModelResponse {
        text: String,
        tool_calls: Vec<ToolCall>,
    },
    ModelError {
        message: String,
        kind: LlmErrorKind,
        retry_after: Option<Duration>,
    },
    RetryElapsed {
        attempt: u32,
    },

    /// Advances a transient state after its effects have run
    Proceed,

    // Tool events
    ToolComplete {
        call_id: String,
        output: ToolOutput,
    },

    // Interruptions
    Cancelled,
    TimedOut,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::UserMessage { .. } => "user_message",
            Event::ModelResponse { .. } => "model_response",
            Event::ModelError { .. } => "model_error",
            Event::RetryElapsed { .. } => "retry_elapsed",
            Event::Proceed => "proceed",
            Event::ToolComplete { .. } => "tool_complete",
            Event::Cancelled => "cancelled",
            Event::TimedOut => "timed_out",
        }
    }
}
