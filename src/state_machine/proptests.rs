//! Property-based tests for the turn state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::effect::PendingMessage;
use super::*;
use crate::llm::LlmErrorKind;
use crate::store::ToolCall;
use crate::tools::ToolOutput;
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_tool_call() -> impl Strategy<Value = ToolCall> {
    (
        "[a-z]{8}",
        prop_oneof![
            Just("calculator"),
            Just("web_search"),
            Just("get_stock_price"),
            Just("rag_tool"),
        ],
    )
        .prop_map(|(id, name)| ToolCall::new(id, name, json!({})))
}

fn arb_error_kind() -> impl Strategy<Value = LlmErrorKind> {
    prop_oneof![
        Just(LlmErrorKind::Network),
        Just(LlmErrorKind::RateLimit),
        Just(LlmErrorKind::ServerError),
        Just(LlmErrorKind::Auth),
        Just(LlmErrorKind::InvalidRequest),
        Just(LlmErrorKind::Unknown),
    ]
}

fn arb_failure_kind() -> impl Strategy<Value = FailureKind> {
    prop_oneof![
        Just(FailureKind::Upstream),
        Just(FailureKind::Cancelled),
        Just(FailureKind::TimedOut),
        Just(FailureKind::ToolRoundLimit),
    ]
}

fn arb_state() -> impl Strategy<Value = TurnState> {
    prop_oneof![
        Just(TurnState::Ready),
        (1u32..12, 1u32..=MAX_RETRY_ATTEMPTS)
            .prop_map(|(round, attempt)| TurnState::AwaitingModel { round, attempt }),
        (1u32..12, proptest::collection::vec(arb_tool_call(), 1..4))
            .prop_map(|(round, calls)| TurnState::ToolRequested { round, calls }),
        (
            1u32..12,
            arb_tool_call(),
            proptest::collection::vec(arb_tool_call(), 0..3)
        )
            .prop_map(|(round, current, remaining)| TurnState::ExecutingTool {
                round,
                current,
                remaining
            }),
        "[a-z ]{0,20}".prop_map(|text| TurnState::FinalAnswer { text }),
        Just(TurnState::Done),
        ("[a-z ]{1,20}", arb_failure_kind())
            .prop_map(|(message, kind)| TurnState::Failed { message, kind }),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        "[a-z ]{1,20}".prop_map(|text| Event::UserMessage { text }),
        (
            "[a-z ]{0,20}",
            proptest::collection::vec(arb_tool_call(), 0..3)
        )
            .prop_map(|(text, tool_calls)| Event::ModelResponse { text, tool_calls }),
        ("[a-z ]{1,20}", arb_error_kind()).prop_map(|(message, kind)| Event::ModelError {
            message,
            kind,
            retry_after: None
        }),
        (1u32..5).prop_map(|attempt| Event::RetryElapsed { attempt }),
        Just(Event::Proceed),
        ("[a-z]{8}", any::<bool>()).prop_map(|(call_id, ok)| Event::ToolComplete {
            call_id,
            output: if ok {
                ToolOutput::success("ok")
            } else {
                ToolOutput::error("no")
            }
        }),
        Just(Event::Cancelled),
        Just(Event::TimedOut),
    ]
}

fn context(max_tool_rounds: u32) -> TurnContext {
    TurnContext::new("prop-conv", max_tool_rounds)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// An effect that feeds an event back is always last, and there is at
    /// most one of them
    #[test]
    fn event_yielding_effect_is_last(state in arb_state(), event in arb_event(), cap in 1u32..10) {
        if let Ok(result) = transition(&state, &context(cap), event) {
            let yielding: Vec<usize> = result
                .effects
                .iter()
                .enumerate()
                .filter(|(_, e)| e.yields_event())
                .map(|(i, _)| i)
                .collect();
            prop_assert!(yielding.len() <= 1);
            if let Some(&idx) = yielding.first() {
                prop_assert_eq!(idx, result.effects.len() - 1);
            }
        }
    }

    /// Terminal states reject every event
    #[test]
    fn terminal_states_are_final(event in arb_event(), kind in arb_failure_kind()) {
        let ctx = context(8);
        prop_assert!(transition(&TurnState::Done, &ctx, event.clone()).is_err());
        let failed = TurnState::Failed { message: "x".into(), kind };
        prop_assert!(transition(&failed, &ctx, event).is_err());
    }

    /// A live turn never accepts a second user message
    #[test]
    fn busy_turn_rejects_user_message(state in arb_state(), text in "[a-z]{1,10}") {
        prop_assume!(state != TurnState::Ready && !state.is_terminal());
        let result = transition(&state, &context(8), Event::UserMessage { text });
        prop_assert!(matches!(result, Err(TransitionError::TurnInProgress)));
    }

    /// Cancellation and timeout end any live turn with a Fail effect
    #[test]
    fn interruptions_fail_live_turns(state in arb_state(), timeout in any::<bool>()) {
        prop_assume!(!state.is_terminal());
        let event = if timeout { Event::TimedOut } else { Event::Cancelled };
        let result = transition(&state, &context(8), event).unwrap();
        let expected = if timeout { FailureKind::TimedOut } else { FailureKind::Cancelled };
        let failed_as_expected =
            matches!(result.new_state, TurnState::Failed { kind, .. } if kind == expected);
        prop_assert!(failed_as_expected, "expected Failed({:?})", expected);
        let ends_with_fail = matches!(result.effects.last(), Some(Effect::Fail { .. }));
        prop_assert!(ends_with_fail, "last effect must be Fail");

        // Every call the model requested but never got a result for is
        // answered with an error
        let unanswered: Vec<String> = match &state {
            TurnState::ToolRequested { calls, .. } => calls.iter().map(|c| c.id.clone()).collect(),
            TurnState::ExecutingTool { current, remaining, .. } => std::iter::once(current)
                .chain(remaining)
                .map(|c| c.id.clone())
                .collect(),
            _ => Vec::new(),
        };
        let answered: Vec<String> = result
            .effects
            .iter()
            .filter_map(|e| match e {
                Effect::PersistMessage(PendingMessage::ToolResult { call_id, .. }) => {
                    Some(call_id.clone())
                }
                _ => None,
            })
            .collect();
        prop_assert_eq!(answered, unanswered);
    }

    /// Model requests beyond the round cap never offer tools
    #[test]
    fn tools_never_offered_beyond_cap(state in arb_state(), event in arb_event(), cap in 1u32..6) {
        let ctx = context(cap);
        if let Ok(result) = transition(&state, &ctx, event) {
            for effect in &result.effects {
                if let Effect::RequestModel { allow_tools: true } = effect {
                    let TurnState::AwaitingModel { round, .. } = result.new_state else {
                        return Err(TestCaseError::fail("model requested outside AwaitingModel"));
                    };
                    prop_assert!(round <= cap);
                }
            }
        }
    }

    /// Retry attempts never exceed the maximum
    #[test]
    fn attempts_bounded(state in arb_state(), event in arb_event()) {
        if let Ok(result) = transition(&state, &context(8), event) {
            if let TurnState::AwaitingModel { attempt, .. } = result.new_state {
                prop_assert!(attempt <= MAX_RETRY_ATTEMPTS);
            }
        }
    }

    /// Driving a turn with scripted model replies always terminates, and the
    /// persisted messages come out in causal order
    #[test]
    fn scripted_turn_terminates(
        rounds in proptest::collection::vec(proptest::collection::vec(arb_tool_call(), 0..3), 0..12),
        cap in 1u32..6,
    ) {
        let ctx = context(cap);
        let mut state = TurnState::Ready;
        let mut queue = vec![Event::UserMessage { text: "question".into() }];
        let mut replies = rounds.into_iter();
        let mut persisted = Vec::new();
        let mut steps = 0;

        while let Some(event) = queue.pop() {
            steps += 1;
            prop_assert!(steps < 500, "turn did not terminate");
            let result = transition(&state, &ctx, event).unwrap();
            state = result.new_state;
            for effect in result.effects {
                match effect {
                    Effect::PersistMessage(msg) => persisted.push(msg),
                    Effect::RequestModel { .. } => {
                        let calls = replies.next().unwrap_or_default();
                        queue.push(Event::ModelResponse { text: "t".into(), tool_calls: calls });
                    }
                    Effect::ExecuteTool { call } => queue.push(Event::ToolComplete {
                        call_id: call.id,
                        output: ToolOutput::success("r"),
                    }),
                    _ => {}
                }
            }
            if state.is_transient() {
                queue.push(Event::Proceed);
            }
        }

        prop_assert!(state.is_terminal());
        let starts_with_user = matches!(persisted.first(), Some(PendingMessage::User { .. }));
        prop_assert!(starts_with_user, "first persisted message must be the user's");
        if state == TurnState::Done {
            let ends_with_answer =
                matches!(persisted.last(), Some(PendingMessage::Assistant { .. }));
            prop_assert!(ends_with_answer, "a finished turn must end with the answer");
        }

        // Every tool request is followed by exactly its results, in order
        let mut i = 1;
        while i < persisted.len() {
            if let PendingMessage::ToolRequest { calls, .. } = &persisted[i] {
                for (offset, call) in calls.iter().enumerate() {
                    let Some(PendingMessage::ToolResult { call_id, .. }) = persisted.get(i + 1 + offset) else {
                        return Err(TestCaseError::fail("missing tool result"));
                    };
                    prop_assert_eq!(call_id, &call.id);
                }
                i += calls.len();
            }
            i += 1;
        }
    }
}
