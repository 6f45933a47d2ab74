//! Turn executor
//!
//! Runs one turn to completion: feeds events through the pure transition
//! function and performs the resulting effects in order.

use super::traits::ToolExecutor;
use super::TurnEvent;

use crate::llm::{ContentBlock, LlmMessage, LlmRequest, LlmService};
use crate::rag::DocumentRegistry;
use crate::state_machine::{
    transition, Effect, Event, FailureKind, PendingMessage, TurnContext, TurnState,
    MAX_RETRY_ATTEMPTS,
};
use crate::store::{InMemoryStore, Message, Role, ToolCall};
use crate::system_prompt::build_system_prompt;
use crate::tools::{ToolContext, ToolOutput};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Text deltas buffered between the model client and the event stream
const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// How a turn ended without an answer
#[derive(Debug, Clone, PartialEq)]
pub struct TurnFailure {
    pub message: String,
    pub kind: FailureKind,
}

/// Drives a single turn for one conversation
pub struct TurnRunner {
    context: TurnContext,
    state: TurnState,
    store: InMemoryStore,
    llm: Arc<dyn LlmService>,
    tools: Arc<dyn ToolExecutor>,
    documents: Arc<DocumentRegistry>,
    cancel: CancellationToken,
    deadline: tokio::time::Instant,
    events: mpsc::Sender<TurnEvent>,
    /// The stored final assistant message, once persisted
    answer: Option<Message>,
}

impl TurnRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: TurnContext,
        store: InMemoryStore,
        llm: Arc<dyn LlmService>,
        tools: Arc<dyn ToolExecutor>,
        documents: Arc<DocumentRegistry>,
        cancel: CancellationToken,
        deadline: tokio::time::Instant,
        events: mpsc::Sender<TurnEvent>,
    ) -> Self {
        Self {
            context,
            state: TurnState::Ready,
            store,
            llm,
            tools,
            documents,
            cancel,
            deadline,
            events,
            answer: None,
        }
    }

    /// Run the turn started by `text` until it reaches a terminal state
    pub async fn run(mut self, text: String) -> Result<Message, TurnFailure> {
        let conv_id = self.context.conversation_id.clone();
        tracing::info!(conv_id = %conv_id, "Starting turn");
        let started = Instant::now();

        // Process events in a loop - no recursion
        let mut events_to_process = vec![Event::UserMessage { text }];

        while let Some(event) = events_to_process.pop() {
            let event_name = event.name();
            let result = match transition(&self.state, &self.context, event) {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(conv_id = %conv_id, state = self.state.name(), event = event_name, error = %e, "Rejected transition");
                    return Err(TurnFailure {
                        message: e.to_string(),
                        kind: FailureKind::Upstream,
                    });
                }
            };

            tracing::debug!(
                conv_id = %conv_id,
                from = self.state.name(),
                to = result.new_state.name(),
                event = event_name,
                "Transition"
            );
            self.state = result.new_state;

            for effect in result.effects {
                let yields_event = effect.yields_event();
                let generated = self.execute_effect(effect).await;
                debug_assert_eq!(yields_event, generated.is_some());
                if let Some(generated) = generated {
                    events_to_process.push(generated);
                }
            }

            if self.state.is_transient() {
                events_to_process.push(Event::Proceed);
            }
        }

        let duration_ms = started.elapsed().as_millis();
        match self.state {
            TurnState::Done => match self.answer {
                Some(message) => {
                    tracing::info!(conv_id = %conv_id, duration_ms, "Turn complete");
                    Ok(message)
                }
                None => Err(TurnFailure {
                    message: "Turn finished without an answer".to_string(),
                    kind: FailureKind::Upstream,
                }),
            },
            TurnState::Failed { message, kind } => {
                tracing::warn!(conv_id = %conv_id, duration_ms, ?kind, error = %message, "Turn failed");
                Err(TurnFailure { message, kind })
            }
            other => Err(TurnFailure {
                message: format!("Turn stopped in state {}", other.name()),
                kind: FailureKind::Upstream,
            }),
        }
    }

    async fn execute_effect(&mut self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::PersistMessage(pending) => {
                let is_answer = matches!(pending, PendingMessage::Assistant { .. });
                let message = to_message(pending);
                self.store
                    .append(&self.context.conversation_id, message.clone())
                    .await;
                if is_answer {
                    self.answer = Some(message);
                }
                None
            }

            Effect::RequestModel { allow_tools } => {
                Some(self.interruptible(self.request_model(allow_tools)).await)
            }

            Effect::ExecuteTool { call } => Some(self.interruptible(self.run_tool(call)).await),

            Effect::NotifyToolActivity { tool, status } => {
                let _ = self
                    .events
                    .send(TurnEvent::ToolActivityUpdate { tool, status })
                    .await;
                None
            }

            Effect::ScheduleRetry { delay, attempt } => {
                tracing::warn!(
                    conv_id = %self.context.conversation_id,
                    attempt,
                    delay_ms = delay.as_millis(),
                    "Retrying model request"
                );
                let _ = self
                    .events
                    .send(TurnEvent::Retrying {
                        attempt,
                        max_attempts: MAX_RETRY_ATTEMPTS,
                        message: format!("Model request failed, retrying in {}s", delay.as_secs()),
                    })
                    .await;
                Some(
                    self.interruptible(async move {
                        tokio::time::sleep(delay).await;
                        Event::RetryElapsed { attempt }
                    })
                    .await,
                )
            }

            Effect::Finish | Effect::Fail { .. } => None,
        }
    }

    /// Await `fut` unless the turn is cancelled, times out, or its client
    /// goes away first
    async fn interruptible<F>(&self, fut: F) -> Event
    where
        F: Future<Output = Event>,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Event::Cancelled,
            () = tokio::time::sleep_until(self.deadline) => {
                self.cancel.cancel();
                Event::TimedOut
            }
            () = self.events.closed() => {
                tracing::info!(conv_id = %self.context.conversation_id, "Client disconnected, cancelling turn");
                self.cancel.cancel();
                Event::Cancelled
            }
            event = fut => event,
        }
    }

    async fn request_model(&self, allow_tools: bool) -> Event {
        let conv_id = &self.context.conversation_id;
        let history = self.store.get_messages(conv_id).await;
        let document = self.documents.metadata(conv_id).await;

        let request = LlmRequest {
            system: Some(build_system_prompt(document.as_ref())),
            messages: build_llm_messages(&history),
            tools: if allow_tools {
                self.tools.definitions()
            } else {
                Vec::new()
            },
            max_tokens: None,
        };

        let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(CHUNK_CHANNEL_CAPACITY);
        let forward = async {
            while let Some(text) = chunk_rx.recv().await {
                let _ = self.events.send(TurnEvent::ModelTextChunk { text }).await;
            }
        };
        let (result, ()) = tokio::join!(self.llm.stream(&request, chunk_tx), forward);

        match result {
            Ok(response) => Event::ModelResponse {
                text: response.text(),
                tool_calls: response
                    .tool_uses()
                    .into_iter()
                    .map(|(id, name, input)| ToolCall::new(id, name, input.clone()))
                    .collect(),
            },
            Err(e) => {
                tracing::warn!(conv_id = %conv_id, kind = ?e.kind, error = %e.message, "Model request failed");
                Event::ModelError {
                    message: e.message,
                    kind: e.kind,
                    retry_after: e.retry_after,
                }
            }
        }
    }

    async fn run_tool(&self, call: ToolCall) -> Event {
        let ctx = ToolContext::new(
            self.cancel.clone(),
            self.context.conversation_id.clone(),
            Arc::clone(&self.documents),
        );
        let started = Instant::now();
        let output = self
            .tools
            .execute(&call.name, call.arguments.clone(), ctx)
            .await
            .unwrap_or_else(|| ToolOutput::error_json(format!("Unknown tool '{}'", call.name)));

        tracing::info!(
            conv_id = %self.context.conversation_id,
            tool = %call.name,
            success = output.success,
            duration_ms = started.elapsed().as_millis(),
            "Tool finished"
        );
        Event::ToolComplete {
            call_id: call.id,
            output,
        }
    }
}

fn to_message(pending: PendingMessage) -> Message {
    match pending {
        PendingMessage::User { text } => Message::user(text),
        PendingMessage::Assistant { text } => Message::assistant(text),
        PendingMessage::ToolRequest { text, calls } => Message::assistant_with_tools(text, calls),
        PendingMessage::ToolResult {
            call_id,
            tool_name,
            output,
        } => Message::tool_result(call_id, tool_name, output),
    }
}

/// Convert stored history into model messages. Consecutive tool results are
/// folded into one user message, which is how the model expects them.
pub(crate) fn build_llm_messages(history: &[Message]) -> Vec<LlmMessage> {
    let mut messages = Vec::new();
    let mut results: Vec<ContentBlock> = Vec::new();

    for msg in history {
        if msg.role == Role::Tool {
            results.push(ContentBlock::tool_result(
                msg.tool_call_id.clone().unwrap_or_default(),
                msg.tool_name.clone().unwrap_or_default(),
                msg.content.clone(),
            ));
            continue;
        }
        if !results.is_empty() {
            messages.push(LlmMessage::user(std::mem::take(&mut results)));
        }

        match msg.role {
            Role::User => messages.push(LlmMessage::user(vec![ContentBlock::text(
                msg.content.clone(),
            )])),
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !msg.content.is_empty() {
                    blocks.push(ContentBlock::text(msg.content.clone()));
                }
                blocks.extend(
                    msg.tool_calls
                        .iter()
                        .map(|c| ContentBlock::tool_use(c.id.clone(), c.name.clone(), c.arguments.clone())),
                );
                if !blocks.is_empty() {
                    messages.push(LlmMessage::assistant(blocks));
                }
            }
            Role::Tool => {}
        }
    }

    if !results.is_empty() {
        messages.push(LlmMessage::user(results));
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessageRole;
    use serde_json::json;

    #[test]
    fn test_build_llm_messages_groups_tool_results() {
        let calls = vec![
            ToolCall::new("a", "calculator", json!({"first_num": 1})),
            ToolCall::new("b", "web_search", json!({"query": "x"})),
        ];
        let history = vec![
            Message::user("question"),
            Message::assistant_with_tools("", calls),
            Message::tool_result("a", "calculator", "2"),
            Message::tool_result("b", "web_search", "found"),
            Message::assistant("answer"),
        ];

        let messages = build_llm_messages(&history);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].content.len(), 2);
        assert_eq!(messages[2].role, MessageRole::User);
        assert_eq!(
            messages[2].content,
            vec![
                ContentBlock::tool_result("a", "calculator", "2"),
                ContentBlock::tool_result("b", "web_search", "found"),
            ]
        );
        assert_eq!(messages[3].content, vec![ContentBlock::text("answer")]);
    }

    #[test]
    fn test_build_llm_messages_keeps_text_with_tool_calls() {
        let history = vec![
            Message::user("q"),
            Message::assistant_with_tools(
                "Let me check.",
                vec![ToolCall::new("a", "calculator", json!({}))],
            ),
            Message::tool_result("a", "calculator", "2"),
        ];
        let messages = build_llm_messages(&history);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content[0], ContentBlock::text("Let me check."));
        assert!(matches!(messages[1].content[1], ContentBlock::ToolUse { .. }));
    }
}
