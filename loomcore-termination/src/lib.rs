#![deny(missing_docs)]
//! Pure decision function for when the RVR-B loop should stop.
//!
//! `evaluate` is a free function over an explicit [`TerminationState`]
//! snapshot rather than a stateful object reaching into the Executor's
//! internals — every rule is independently unit-testable with a
//! synthetic state, and the whole thing is deterministic: no clock reads,
//! no hidden counters.

use serde::{Deserialize, Serialize};

/// Caps and deadlines for one turn.
///
/// `wall_clock_deadline_millis` is a Unix-epoch millisecond timestamp
/// rather than an `Instant`, so the controller can be evaluated against
/// an injected clock reading in tests without touching real wall time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnBudget {
    /// Maximum number of react-loop iterations before requiring user
    /// confirmation to continue.
    pub max_turns: u32,
    /// Hard ceiling on cumulative input+output tokens for the turn.
    pub max_total_tokens: u64,
    /// Unix-epoch millisecond deadline; the turn stops once reached.
    pub wall_clock_deadline_millis: u64,
    /// Set once the user has answered a `long_run_confirm` prompt with
    /// "continue".
    pub user_confirmed_continue: bool,
}

impl TurnBudget {
    /// Default budget for a given complexity tier's iteration count and
    /// token ceiling; the caller supplies the deadline since it depends on
    /// a wall-clock reading.
    pub fn new(max_turns: u32, max_total_tokens: u64, wall_clock_deadline_millis: u64) -> Self {
        Self { max_turns, max_total_tokens, wall_clock_deadline_millis, user_confirmed_continue: false }
    }
}

/// A snapshot of everything the controller's rules need to decide.
///
/// Built fresh by the Executor at the top of each loop iteration; the
/// controller never mutates or retains it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationState {
    /// React-loop iterations completed so far this turn.
    pub turn_count: u32,
    /// Cumulative tokens consumed so far this turn.
    pub tokens_so_far: u64,
    /// Current time, Unix-epoch milliseconds, from the injected clock.
    pub now_millis: u64,
    /// True when the intent fingerprint says the user wants to stop.
    pub wants_to_stop: bool,
    /// True if the last model turn emitted a tool use, or a pending plan
    /// todo remains.
    pub has_tool_use_or_pending_todo: bool,
    /// True if the most recent backtrack decision was `Abort`.
    pub last_backtrack_was_abort: bool,
}

/// Why the loop stopped, for `turn_complete`/`turn_failed` event payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The fingerprint said the user wants to cancel.
    WantsToStop,
    /// Token ceiling reached.
    TokenBudgetExhausted,
    /// Wall-clock deadline reached.
    DeadlineExhausted,
    /// No more tool use or pending plan todo; the turn finished on its own.
    NaturalEnd,
    /// A backtrack decision gave up on the turn.
    Aborted,
}

/// What the Executor should do this iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep looping.
    Continue,
    /// Pause and emit `long_run_confirm`; resume only once
    /// `user_confirmed_continue` is set.
    SuspendForConfirmation,
    /// End the turn for the given reason.
    Stop(StopReason),
}

/// Evaluate the six termination rules, in order, short-circuiting on the
/// first that fires. `wants_to_stop` always wins, even if the turn is
/// simultaneously over its token ceiling.
pub fn evaluate(budget: &TurnBudget, state: &TerminationState) -> Decision {
    if state.wants_to_stop {
        return Decision::Stop(StopReason::WantsToStop);
    }
    if state.turn_count >= budget.max_turns && !budget.user_confirmed_continue {
        return Decision::SuspendForConfirmation;
    }
    if state.tokens_so_far >= budget.max_total_tokens {
        return Decision::Stop(StopReason::TokenBudgetExhausted);
    }
    if state.now_millis >= budget.wall_clock_deadline_millis {
        return Decision::Stop(StopReason::DeadlineExhausted);
    }
    if !state.has_tool_use_or_pending_todo {
        return Decision::Stop(StopReason::NaturalEnd);
    }
    if state.last_backtrack_was_abort {
        return Decision::Stop(StopReason::Aborted);
    }
    Decision::Continue
}
