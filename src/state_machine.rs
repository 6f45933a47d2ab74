//! Turn state machine
//!
//! One chat turn is driven by a pure transition function in the Elm
//! Architecture style: `(state, event) -> (state, effects)`. The runtime
//! performs the effects and feeds the resulting events back in.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{Effect, PendingMessage, ToolStatus};
pub use event::Event;
pub use state::{FailureKind, TurnContext, TurnState};
pub use transition::{transition, TransitionError, TransitionResult, MAX_RETRY_ATTEMPTS};
