//! Turn state types

use crate::store::ToolCall;
use serde::Serialize;

/// Why a turn ended without an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Model or embedding service failed after retries
    Upstream,
    Cancelled,
    TimedOut,
    /// The model kept requesting tools after its last tool-enabled round
    ToolRoundLimit,
}

/// State of a single turn
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnState {
    /// No user message accepted yet
    Ready,

    /// A model request for `round` is in flight or waiting for a retry
    AwaitingModel { round: u32, attempt: u32 },

    /// The model asked for tools; the request has been recorded
    ToolRequested { round: u32, calls: Vec<ToolCall> },

    /// Running `current`; `remaining` follow in request order
    ExecutingTool {
        round: u32,
        current: ToolCall,
        remaining: Vec<ToolCall>,
    },

    /// The model answered without tools
    FinalAnswer { text: String },

    Done,

    Failed { message: String, kind: FailureKind },
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnState::Done | TurnState::Failed { .. })
    }

    /// States that advance on their own once their effects have run
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TurnState::ToolRequested { .. } | TurnState::FinalAnswer { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            TurnState::Ready => "ready",
            TurnState::AwaitingModel { .. } => "awaiting_model",
            TurnState::ToolRequested { .. } => "tool_requested",
            TurnState::ExecutingTool { .. } => "executing_tool",
            TurnState::FinalAnswer { .. } => "final_answer",
            TurnState::Done => "done",
            TurnState::Failed { .. } => "failed",
        }
    }
}

/// Fixed facts about the turn, available to every transition
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub conversation_id: String,
    /// Model rounds that may request tools. The round after the last one is
    /// made without tool definitions.
    pub max_tool_rounds: u32,
}

impl TurnContext {
    pub fn new(conversation_id: impl Into<String>, max_tool_rounds: u32) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            max_tool_rounds,
        }
    }

    pub fn tools_allowed(&self, round: u32) -> bool {
        round <= self.max_tool_rounds
    }
}
