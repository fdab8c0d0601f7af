//! The outbound event stream a transport consumes while a turn runs.

use layer0::id::TurnId;
use layer0::turn::ExitReason;
use loomcore_context::ColorLevel;
use loomcore_plan::TodoId;

/// One event in a turn's outbound stream, tagged with a strictly monotone
/// sequence number within the turn (P5).
#[derive(Debug, Clone)]
pub struct Event {
    /// Monotone within the turn; starts at 0.
    pub seq: u64,
    /// The turn this event belongs to.
    pub turn_id: TurnId,
    /// The event payload.
    pub kind: EventKind,
}

/// Event payload variants.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum EventKind {
    /// The turn has started.
    SessionStart,
    /// A new content block started at `index`.
    ContentStart {
        /// Block index within the response.
        index: usize,
        /// What kind of block this is ("text", "tool_use", ...).
        block_type: &'static str,
    },
    /// A fragment of content for the block at `index`.
    ContentDelta {
        /// Block index this fragment belongs to.
        index: usize,
        /// The fragment itself.
        fragment: String,
    },
    /// The content block at `index` is complete.
    ContentStop {
        /// The block that finished.
        index: usize,
    },
    /// A todo's status changed.
    PlanUpdate {
        /// The todo that transitioned.
        todo: TodoId,
        /// Its prior status label.
        from: String,
        /// Its new status label.
        to: String,
    },
    /// The loop is suspended awaiting a human decision.
    HitlConfirm {
        /// The question posed to the user.
        request: String,
    },
    /// The loop is suspended awaiting continue/stop past the turn cap.
    LongRunConfirm {
        /// Iterations completed so far.
        turns_so_far: u32,
    },
    /// A tool was invoked.
    ToolCall {
        /// The tool's name.
        name: String,
        /// The provider-assigned id for this call.
        tool_use_id: String,
    },
    /// A tool call's result.
    ToolResult {
        /// Echoes the originating call's id.
        tool_use_id: String,
        /// Whether the call failed.
        is_error: bool,
    },
    /// Running token totals.
    TokenUsage {
        /// Cumulative input tokens this turn.
        tokens_in: u64,
        /// Cumulative output tokens this turn.
        tokens_out: u64,
    },
    /// Context window fill level.
    ContextUsageUpdate {
        /// Tokens currently assembled.
        current_tokens: usize,
        /// Effective token budget.
        budget_tokens: usize,
        /// Traffic-light signal.
        color_level: ColorLevel,
    },
    /// Phase-2 compaction freed tokens.
    ContextTrimmingDone {
        /// Tokens freed by compaction.
        tokens_saved: u64,
    },
    /// A rollback was applied and the user is being told about it (S2).
    RollbackOffered,
    /// The turn finished normally.
    TurnComplete,
    /// The turn finished with a failure.
    TurnFailed {
        /// Closed, user-displayable category for why the turn failed.
        reason: ExitReason,
        /// Raw cause, for logs — not meant for direct display.
        detail: String,
    },
}

/// Assigns strictly increasing `seq` values within one turn.
#[derive(Debug, Default)]
pub(crate) struct SeqCounter(u64);

impl SeqCounter {
    pub(crate) fn next(&mut self) -> u64 {
        let s = self.0;
        self.0 += 1;
        s
    }
}

/// Where the executor sends outbound events.
///
/// A bounded `tokio::sync::mpsc::Sender` is the intended production
/// implementation — `send` backpressures the loop when the transport-side
/// consumer falls behind, per the outbound stream's backpressure
/// requirement; a full channel simply makes the loop wait rather than
/// drop events or grow unbounded memory.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    async fn send(&self, event: Event);
}

#[async_trait::async_trait]
impl EventSink for tokio::sync::mpsc::Sender<Event> {
    async fn send(&self, event: Event) {
        if tokio::sync::mpsc::Sender::send(self, event).await.is_err() {
            tracing::debug!("event receiver dropped, discarding event");
        }
    }
}

/// An [`EventSink`] that discards everything — useful when a caller has no
/// transport wired up yet.
#[derive(Debug, Default)]
pub struct NullEventSink;

#[async_trait::async_trait]
impl EventSink for NullEventSink {
    async fn send(&self, _event: Event) {}
}
