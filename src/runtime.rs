//! Runtime for executing chat turns
//!
//! [`TurnManager`] owns the shared services and enforces one in-flight turn
//! per conversation. Each accepted message spawns a [`TurnRunner`] whose
//! progress is streamed back as [`TurnEvent`]s.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{TurnFailure, TurnRunner};
pub use traits::*;

use crate::config::TurnConfig;
use crate::llm::LlmService;
use crate::rag::DocumentRegistry;
use crate::state_machine::{ToolStatus, TurnContext};
use crate::store::{InMemoryStore, Message};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

/// Events buffered per turn before the producer waits for the client
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events streamed to the client while a turn runs
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Incremental model text
    ModelTextChunk { text: String },
    /// A tool started or finished
    ToolActivityUpdate { tool: String, status: ToolStatus },
    /// The model request failed transiently and will be retried
    Retrying {
        attempt: u32,
        max_attempts: u32,
        message: String,
    },
    /// Terminal: the stored final assistant message
    Done { message: Message },
    /// Terminal: the turn ended without an answer
    Error { message: String },
}

impl TurnEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            TurnEvent::ModelTextChunk { .. } => "model_text_chunk",
            TurnEvent::ToolActivityUpdate { .. } => "tool_activity_update",
            TurnEvent::Retrying { .. } => "retrying",
            TurnEvent::Done { .. } => "done",
            TurnEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnEvent::Done { .. } | TurnEvent::Error { .. })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TurnError {
    #[error("A reply is still being generated for this conversation")]
    Busy,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

struct ActiveTurn {
    id: String,
    cancel: CancellationToken,
}

/// Manager for all in-flight turns
pub struct TurnManager {
    store: InMemoryStore,
    llm: Arc<dyn LlmService>,
    tools: Arc<dyn ToolExecutor>,
    documents: Arc<DocumentRegistry>,
    config: TurnConfig,
    active: RwLock<HashMap<String, ActiveTurn>>,
}

impl TurnManager {
    pub fn new(
        store: InMemoryStore,
        llm: Arc<dyn LlmService>,
        tools: Arc<dyn ToolExecutor>,
        documents: Arc<DocumentRegistry>,
        config: TurnConfig,
    ) -> Self {
        Self {
            store,
            llm,
            tools,
            documents,
            config,
            active: RwLock::new(HashMap::new()),
        }
    }

    /// Accept `text` as the next user message of `conv_id` and start the
    /// turn in the background.
    ///
    /// The returned stream ends with exactly one `done` or `error` event.
    /// Dropping it cancels the turn.
    pub async fn start_turn(
        self: &Arc<Self>,
        conv_id: &str,
        text: &str,
    ) -> Result<mpsc::Receiver<TurnEvent>, TurnError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TurnError::InvalidInput("message must not be empty".to_string()));
        }
        if conv_id.trim().is_empty() {
            return Err(TurnError::InvalidInput(
                "conversation id must not be empty".to_string(),
            ));
        }

        let turn_id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        {
            let mut active = self.active.write().await;
            if active.contains_key(conv_id) {
                tracing::info!(conv_id = %conv_id, "Rejecting message, turn in progress");
                return Err(TurnError::Busy);
            }
            active.insert(
                conv_id.to_string(),
                ActiveTurn {
                    id: turn_id.clone(),
                    cancel: cancel.clone(),
                },
            );
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let runner = TurnRunner::new(
            TurnContext::new(conv_id, self.config.max_tool_rounds),
            self.store.clone(),
            Arc::clone(&self.llm),
            Arc::clone(&self.tools),
            Arc::clone(&self.documents),
            cancel,
            tokio::time::Instant::now() + self.config.timeout,
            tx.clone(),
        );

        let manager = Arc::clone(self);
        let conv_id = conv_id.to_string();
        let text = text.to_string();
        tokio::spawn(async move {
            let outcome = runner.run(text).await;
            // Release the conversation before the client hears the turn is
            // over, so an immediate follow-up is not rejected as busy
            manager.release(&conv_id, &turn_id).await;
            let terminal = match outcome {
                Ok(message) => TurnEvent::Done { message },
                Err(failure) => TurnEvent::Error {
                    message: failure.message,
                },
            };
            let _ = tx.send(terminal).await;
        });

        Ok(rx)
    }

    /// Cancel the in-flight turn of `conv_id`; false when none is running
    pub async fn cancel(&self, conv_id: &str) -> bool {
        let active = self.active.read().await;
        match active.get(conv_id) {
            Some(turn) => {
                tracing::info!(conv_id = %conv_id, "Cancelling turn");
                turn.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn is_busy(&self, conv_id: &str) -> bool {
        self.active.read().await.contains_key(conv_id)
    }

    async fn release(&self, conv_id: &str, turn_id: &str) {
        let mut active = self.active.write().await;
        if active.get(conv_id).is_some_and(|t| t.id == turn_id) {
            active.remove(conv_id);
        }
    }
}
