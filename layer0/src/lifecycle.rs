//! Lifecycle events — cross-protocol coordination vocabulary.
//!
//! These are NOT a trait — they're a shared vocabulary. Each protocol
//! emits and/or consumes these events through whatever mechanism is
//! appropriate (channels, callbacks, event bus, direct calls). The
//! Executor's `TerminationController` and `ContextBuilder` are the two
//! consumers for the turn's lifetime; nothing here crosses a turn boundary.

use crate::{duration::DurationMs, id::*};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Budget-related events, consumed by the termination controller.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BudgetEvent {
    /// Emitted after each model call.
    CostIncurred {
        /// The turn that incurred the cost.
        turn: TurnId,
        /// Cost of this individual operation.
        cost: Decimal,
        /// Cumulative cost so far this turn.
        cumulative: Decimal,
    },
    /// Emitted by the termination controller when nearing a limit.
    BudgetWarning {
        /// The turn approaching its budget limit.
        turn: TurnId,
        /// Amount spent so far.
        spent: Decimal,
        /// The budget limit.
        limit: Decimal,
    },
    /// Decision taken in response to budget pressure.
    BudgetAction {
        /// The turn the decision applies to.
        turn: TurnId,
        /// The budget decision.
        action: BudgetDecision,
    },
}

/// What to do about budget pressure.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetDecision {
    /// Continue as normal.
    Continue,
    /// Switch to a cheaper model.
    DowngradeModel {
        /// The model being switched from.
        from: String,
        /// The model being switched to.
        to: String,
    },
    /// Stop the turn (maps to `ExitReason::BudgetExhausted`).
    HaltTurn,
    /// Request more budget from the caller (surfaces as `long_run_confirm`).
    RequestIncrease {
        /// The additional amount requested.
        amount: Decimal,
    },
}

/// Context pressure events, consumed by and emitted from the context
/// builder. These back the `context_usage_update` / `context_trimming_done`
/// outbound events.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompactionEvent {
    /// Emitted when the context window is filling.
    ContextPressure {
        /// The turn experiencing context pressure.
        turn: TurnId,
        /// Fraction of the context budget used, in [0.0, 1.0].
        fill_fraction: f64,
        /// Tokens currently used.
        tokens_used: u64,
        /// Tokens still available.
        tokens_available: u64,
    },
    /// Emitted after compaction completes.
    CompactionComplete {
        /// The turn that completed compaction.
        turn: TurnId,
        /// The compaction strategy used.
        strategy: String,
        /// Number of tokens freed.
        tokens_freed: u64,
    },
}

/// Observability events — the common vocabulary all layers emit.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservableEvent {
    /// Which protocol emitted this.
    pub source: EventSource,
    /// Event type (free-form, namespaced by convention).
    pub event_type: String,
    /// When it happened (milliseconds since turn start, not wall clock).
    pub timestamp: DurationMs,
    /// Event payload.
    pub data: serde_json::Value,
    /// Correlation ID across protocols.
    pub trace_id: Option<String>,
    /// Turn context.
    pub turn_id: Option<TurnId>,
}

/// Which protocol layer emitted an event.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// From the Turn protocol.
    Turn,
    /// From the State protocol.
    State,
    /// From a Hook.
    Hook,
}

impl ObservableEvent {
    /// Create a new observable event with required fields.
    pub fn new(
        source: EventSource,
        event_type: impl Into<String>,
        timestamp: DurationMs,
        data: serde_json::Value,
    ) -> Self {
        Self {
            source,
            event_type: event_type.into(),
            timestamp,
            data,
            trace_id: None,
            turn_id: None,
        }
    }
}
