//! Pure state transition function

use super::effect::PendingMessage;
use super::{Effect, Event, FailureKind, ToolStatus, TurnContext, TurnState};
use crate::store::ToolCall;
use crate::tools::ToolOutput;
use std::time::Duration;
use thiserror::Error;

pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: TurnState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: TurnState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("A turn is already in progress for this conversation")]
    TurnInProgress,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same inputs this always produces the same outputs and performs
/// no I/O. Any effect that yields a follow-up event is the last one in the
/// returned list.
pub fn transition(
    state: &TurnState,
    context: &TurnContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    if state.is_terminal() {
        return Err(TransitionError::InvalidTransition(format!(
            "turn already {} (got {})",
            state.name(),
            event.name()
        )));
    }

    match (state, event) {
        // ============================================================
        // User message
        // ============================================================
        (TurnState::Ready, Event::UserMessage { text }) => Ok(TransitionResult::new(
            TurnState::AwaitingModel {
                round: 1,
                attempt: 1,
            },
        )
        .with_effect(Effect::persist_user(text))
        .with_effect(Effect::RequestModel {
            allow_tools: context.tools_allowed(1),
        })),

        (_, Event::UserMessage { .. }) => Err(TransitionError::TurnInProgress),

        // ============================================================
        // Interruptions, valid from any live state
        // ============================================================
        (_, Event::Cancelled) => Ok(interrupt(state, FailureKind::Cancelled, "Turn cancelled")),

        (_, Event::TimedOut) => Ok(interrupt(state, FailureKind::TimedOut, "Turn timed out")),

        // ============================================================
        // Model responses
        // ============================================================
        (TurnState::AwaitingModel { .. }, Event::ModelResponse { text, tool_calls })
            if tool_calls.is_empty() =>
        {
            Ok(TransitionResult::new(TurnState::FinalAnswer { text }))
        }

        (TurnState::AwaitingModel { round, .. }, Event::ModelResponse { text, tool_calls }) => {
            if !context.tools_allowed(*round) {
                return Ok(fail(
                    FailureKind::ToolRoundLimit,
                    format!(
                        "Stopped after {} tool rounds without a final answer",
                        context.max_tool_rounds
                    ),
                ));
            }
            Ok(TransitionResult::new(TurnState::ToolRequested {
                round: *round,
                calls: tool_calls.clone(),
            })
            .with_effect(Effect::PersistMessage(PendingMessage::ToolRequest {
                text,
                calls: tool_calls,
            })))
        }

        // ============================================================
        // Model errors and retry
        // ============================================================
        (
            TurnState::AwaitingModel { round, attempt },
            Event::ModelError {
                kind, retry_after, ..
            },
        ) if kind.is_retryable() && *attempt < MAX_RETRY_ATTEMPTS => {
            let delay = retry_after.unwrap_or_else(|| retry_delay(*attempt));
            let next = attempt + 1;
            Ok(TransitionResult::new(TurnState::AwaitingModel {
                round: *round,
                attempt: next,
            })
            .with_effect(Effect::ScheduleRetry {
                delay,
                attempt: next,
            }))
        }

        (TurnState::AwaitingModel { attempt, .. }, Event::ModelError { message, kind, .. }) => {
            let message = if kind.is_retryable() {
                format!("Failed after {attempt} attempts: {message}")
            } else {
                message
            };
            Ok(fail(FailureKind::Upstream, message))
        }

        (TurnState::AwaitingModel { round, attempt }, Event::RetryElapsed { attempt: elapsed })
            if *attempt == elapsed && elapsed > 1 =>
        {
            Ok(
                TransitionResult::new(state.clone()).with_effect(Effect::RequestModel {
                    allow_tools: context.tools_allowed(*round),
                }),
            )
        }

        // ============================================================
        // Transient states
        // ============================================================
        (TurnState::FinalAnswer { text }, Event::Proceed) => Ok(TransitionResult::new(
            TurnState::Done,
        )
        .with_effect(Effect::persist_assistant(text.clone()))
        .with_effect(Effect::Finish)),

        (TurnState::ToolRequested { round, calls }, Event::Proceed) => {
            let Some((first, rest)) = calls.split_first() else {
                return Err(TransitionError::InvalidTransition(
                    "tool request without calls".to_string(),
                ));
            };
            Ok(start_tool(*round, first.clone(), rest.to_vec()))
        }

        // ============================================================
        // Tool execution
        // ============================================================
        (
            TurnState::ExecutingTool {
                round,
                current,
                remaining,
            },
            Event::ToolComplete { call_id, output },
        ) if call_id == current.id => {
            let status = if output.success {
                ToolStatus::Succeeded
            } else {
                ToolStatus::Failed
            };
            let persist = Effect::PersistMessage(PendingMessage::ToolResult {
                call_id,
                tool_name: current.name.clone(),
                output: output.output,
            });
            let notify = Effect::tool_activity(current.name.clone(), status);

            let next = if let Some((first, rest)) = remaining.split_first() {
                start_tool(*round, first.clone(), rest.to_vec())
            } else {
                let round = round + 1;
                TransitionResult::new(TurnState::AwaitingModel { round, attempt: 1 })
                    .with_effect(Effect::RequestModel {
                        allow_tools: context.tools_allowed(round),
                    })
            };

            let mut effects = vec![persist, notify];
            effects.extend(next.effects);
            Ok(TransitionResult {
                new_state: next.new_state,
                effects,
            })
        }

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{} does not accept {}",
            state.name(),
            event.name()
        ))),
    }
}

fn start_tool(round: u32, current: ToolCall, remaining: Vec<ToolCall>) -> TransitionResult {
    let name = current.name.clone();
    TransitionResult::new(TurnState::ExecutingTool {
        round,
        current: current.clone(),
        remaining,
    })
    .with_effect(Effect::tool_activity(name, ToolStatus::Running))
    .with_effect(Effect::ExecuteTool { call: current })
}

/// Fail the turn. Every tool call the model made but that has no stored
/// result yet gets an error result, so the stored history stays a valid
/// request/response sequence for the next turn.
fn interrupt(state: &TurnState, kind: FailureKind, message: &str) -> TransitionResult {
    let unanswered: Vec<&ToolCall> = match state {
        TurnState::ToolRequested { calls, .. } => calls.iter().collect(),
        TurnState::ExecutingTool {
            current, remaining, ..
        } => std::iter::once(current).chain(remaining).collect(),
        _ => Vec::new(),
    };

    let mut effects: Vec<Effect> = unanswered
        .iter()
        .map(|call| {
            Effect::PersistMessage(PendingMessage::ToolResult {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                output: ToolOutput::error_json(format!("Tool call not completed: {message}"))
                    .output,
            })
        })
        .collect();
    if let TurnState::ExecutingTool { current, .. } = state {
        effects.push(Effect::tool_activity(current.name.clone(), ToolStatus::Failed));
    }

    let failed = fail(kind, message);
    effects.extend(failed.effects);
    TransitionResult {
        new_state: failed.new_state,
        effects,
    }
}

fn fail(kind: FailureKind, message: impl Into<String>) -> TransitionResult {
    let message = message.into();
    TransitionResult::new(TurnState::Failed {
        message: message.clone(),
        kind,
    })
    .with_effect(Effect::Fail { message })
}

/// Backoff before retrying after `attempt` failed: 1s, 2s, 4s, ...
fn retry_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmErrorKind;
    use crate::tools::ToolOutput;
    use serde_json::json;

    fn ctx() -> TurnContext {
        TurnContext::new("test-conv", 2)
    }

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall::new(id, name, json!({}))
    }

    fn model_error(kind: LlmErrorKind) -> Event {
        Event::ModelError {
            message: "boom".into(),
            kind,
            retry_after: None,
        }
    }

    #[test]
    fn test_user_message_starts_turn() {
        let result = transition(
            &TurnState::Ready,
            &ctx(),
            Event::UserMessage { text: "hi".into() },
        )
        .unwrap();
        assert_eq!(
            result.new_state,
            TurnState::AwaitingModel {
                round: 1,
                attempt: 1
            }
        );
        assert_eq!(
            result.effects,
            vec![
                Effect::persist_user("hi"),
                Effect::RequestModel { allow_tools: true }
            ]
        );
    }

    #[test]
    fn test_second_message_rejected_while_busy() {
        let state = TurnState::AwaitingModel {
            round: 1,
            attempt: 1,
        };
        let err = transition(&state, &ctx(), Event::UserMessage { text: "x".into() })
            .unwrap_err();
        assert_eq!(err, TransitionError::TurnInProgress);
    }

    #[test]
    fn test_text_response_finishes() {
        let state = TurnState::AwaitingModel {
            round: 1,
            attempt: 1,
        };
        let result = transition(
            &state,
            &ctx(),
            Event::ModelResponse {
                text: "answer".into(),
                tool_calls: vec![],
            },
        )
        .unwrap();
        assert_eq!(
            result.new_state,
            TurnState::FinalAnswer {
                text: "answer".into()
            }
        );
        assert!(result.effects.is_empty());

        let done = transition(&result.new_state, &ctx(), Event::Proceed).unwrap();
        assert_eq!(done.new_state, TurnState::Done);
        assert_eq!(
            done.effects,
            vec![Effect::persist_assistant("answer"), Effect::Finish]
        );
    }

    #[test]
    fn test_tool_round_trip() {
        let calls = vec![call("a", "calculator"), call("b", "web_search")];
        let state = TurnState::AwaitingModel {
            round: 1,
            attempt: 1,
        };
        let requested = transition(
            &state,
            &ctx(),
            Event::ModelResponse {
                text: String::new(),
                tool_calls: calls.clone(),
            },
        )
        .unwrap();
        assert_eq!(
            requested.effects,
            vec![Effect::PersistMessage(PendingMessage::ToolRequest {
                text: String::new(),
                calls: calls.clone()
            })]
        );

        let first = transition(&requested.new_state, &ctx(), Event::Proceed).unwrap();
        assert_eq!(
            first.effects.last(),
            Some(&Effect::ExecuteTool {
                call: calls[0].clone()
            })
        );

        let second = transition(
            &first.new_state,
            &ctx(),
            Event::ToolComplete {
                call_id: "a".into(),
                output: ToolOutput::success("5"),
            },
        )
        .unwrap();
        assert!(matches!(
            &second.new_state,
            TurnState::ExecutingTool { current, .. } if current.id == "b"
        ));
        assert_eq!(
            second.effects[0],
            Effect::PersistMessage(PendingMessage::ToolResult {
                call_id: "a".into(),
                tool_name: "calculator".into(),
                output: "5".into()
            })
        );

        let back = transition(
            &second.new_state,
            &ctx(),
            Event::ToolComplete {
                call_id: "b".into(),
                output: ToolOutput::error("offline"),
            },
        )
        .unwrap();
        assert_eq!(
            back.new_state,
            TurnState::AwaitingModel {
                round: 2,
                attempt: 1
            }
        );
        assert_eq!(
            back.effects,
            vec![
                Effect::PersistMessage(PendingMessage::ToolResult {
                    call_id: "b".into(),
                    tool_name: "web_search".into(),
                    output: "offline".into()
                }),
                Effect::tool_activity("web_search", ToolStatus::Failed),
                Effect::RequestModel { allow_tools: true },
            ]
        );
    }

    #[test]
    fn test_mismatched_tool_id_rejected() {
        let state = TurnState::ExecutingTool {
            round: 1,
            current: call("a", "calculator"),
            remaining: vec![],
        };
        let err = transition(
            &state,
            &ctx(),
            Event::ToolComplete {
                call_id: "zzz".into(),
                output: ToolOutput::success(""),
            },
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition(_)));
    }

    #[test]
    fn test_last_round_is_tool_less() {
        let state = TurnState::ExecutingTool {
            round: 2,
            current: call("a", "calculator"),
            remaining: vec![],
        };
        let result = transition(
            &state,
            &ctx(),
            Event::ToolComplete {
                call_id: "a".into(),
                output: ToolOutput::success("1"),
            },
        )
        .unwrap();
        assert_eq!(
            result.effects.last(),
            Some(&Effect::RequestModel { allow_tools: false })
        );

        let capped = transition(
            &result.new_state,
            &ctx(),
            Event::ModelResponse {
                text: String::new(),
                tool_calls: vec![call("b", "calculator")],
            },
        )
        .unwrap();
        assert!(matches!(
            capped.new_state,
            TurnState::Failed {
                kind: FailureKind::ToolRoundLimit,
                ..
            }
        ));
    }

    #[test]
    fn test_retryable_error_schedules_retry() {
        let state = TurnState::AwaitingModel {
            round: 1,
            attempt: 1,
        };
        let result = transition(&state, &ctx(), model_error(LlmErrorKind::ServerError)).unwrap();
        assert_eq!(
            result.effects,
            vec![Effect::ScheduleRetry {
                delay: Duration::from_secs(1),
                attempt: 2
            }]
        );

        let retry = transition(
            &result.new_state,
            &ctx(),
            Event::RetryElapsed { attempt: 2 },
        )
        .unwrap();
        assert_eq!(retry.effects, vec![Effect::RequestModel { allow_tools: true }]);
    }

    #[test]
    fn test_retry_after_is_honored() {
        let state = TurnState::AwaitingModel {
            round: 1,
            attempt: 2,
        };
        let result = transition(
            &state,
            &ctx(),
            Event::ModelError {
                message: "slow down".into(),
                kind: LlmErrorKind::RateLimit,
                retry_after: Some(Duration::from_secs(7)),
            },
        )
        .unwrap();
        assert_eq!(
            result.effects,
            vec![Effect::ScheduleRetry {
                delay: Duration::from_secs(7),
                attempt: 3
            }]
        );
    }

    #[test]
    fn test_retries_exhausted() {
        let state = TurnState::AwaitingModel {
            round: 1,
            attempt: MAX_RETRY_ATTEMPTS,
        };
        let result = transition(&state, &ctx(), model_error(LlmErrorKind::Network)).unwrap();
        let TurnState::Failed { message, kind } = result.new_state else {
            panic!("expected failure");
        };
        assert_eq!(kind, FailureKind::Upstream);
        assert!(message.starts_with("Failed after 3 attempts"));
    }

    #[test]
    fn test_auth_error_fails_immediately() {
        let state = TurnState::AwaitingModel {
            round: 1,
            attempt: 1,
        };
        let result = transition(&state, &ctx(), model_error(LlmErrorKind::Auth)).unwrap();
        assert_eq!(
            result.effects,
            vec![Effect::Fail {
                message: "boom".into()
            }]
        );
    }

    #[test]
    fn test_cancel_from_tool_execution() {
        let state = TurnState::ExecutingTool {
            round: 1,
            current: call("a", "web_search"),
            remaining: vec![],
        };
        let result = transition(&state, &ctx(), Event::Cancelled).unwrap();
        assert!(matches!(
            result.new_state,
            TurnState::Failed {
                kind: FailureKind::Cancelled,
                ..
            }
        ));
    }

    #[test]
    fn test_interrupted_tools_get_error_results() {
        let state = TurnState::ExecutingTool {
            round: 1,
            current: call("a", "web_search"),
            remaining: vec![call("b", "calculator")],
        };
        let result = transition(&state, &ctx(), Event::TimedOut).unwrap();

        let answered: Vec<&str> = result
            .effects
            .iter()
            .filter_map(|e| match e {
                Effect::PersistMessage(PendingMessage::ToolResult { call_id, output, .. }) => {
                    assert!(output.contains("error"));
                    Some(call_id.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(answered, vec!["a", "b"]);
        assert!(result
            .effects
            .contains(&Effect::tool_activity("web_search", ToolStatus::Failed)));
        assert_eq!(
            result.effects.last(),
            Some(&Effect::Fail {
                message: "Turn timed out".into()
            })
        );
    }

    #[test]
    fn test_interrupt_while_awaiting_model_only_fails() {
        let state = TurnState::AwaitingModel {
            round: 2,
            attempt: 1,
        };
        let result = transition(&state, &ctx(), Event::Cancelled).unwrap();
        assert_eq!(
            result.effects,
            vec![Effect::Fail {
                message: "Turn cancelled".into()
            }]
        );
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        for state in [
            TurnState::Done,
            TurnState::Failed {
                message: "x".into(),
                kind: FailureKind::TimedOut,
            },
        ] {
            assert!(transition(&state, &ctx(), Event::Cancelled).is_err());
            assert!(transition(&state, &ctx(), Event::Proceed).is_err());
        }
    }

    #[test]
    fn test_retry_delay_doubles() {
        assert_eq!(retry_delay(1), Duration::from_secs(1));
        assert_eq!(retry_delay(2), Duration::from_secs(2));
        assert_eq!(retry_delay(3), Duration::from_secs(4));
    }
}
