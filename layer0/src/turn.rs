//! The Turn protocol — what drives a single user turn to completion.

use crate::{content::Content, duration::DurationMs, error::TurnError, id::*};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What triggers a turn.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Human sent a message.
    User,
    /// System event (file change, webhook, scheduled wake-up, etc.).
    SystemEvent,
    /// Future trigger types.
    Custom(String),
}

/// Input to a turn. Everything the turn needs to execute.
///
/// `TurnInput` does NOT include conversation history or memory contents —
/// the turn reads those from a `StateReader`/`ConversationStore` during
/// context assembly. `TurnInput` carries the *new* information that
/// triggered this turn, not the accumulated state.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnInput {
    /// The new message that triggered this turn.
    pub message: Content,

    /// What caused this turn to start.
    pub trigger: TriggerType,

    /// Session for conversation continuity. If None, the turn is stateless.
    pub session: Option<SessionId>,

    /// Configuration for this specific turn execution.
    /// None means "use the implementation's defaults."
    pub config: Option<TurnConfig>,

    /// Opaque metadata that passes through the turn unchanged.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Per-turn configuration overrides. Every field is optional —
/// None means "use the implementation's default."
#[non_exhaustive]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Maximum iterations of the inner RVR-B loop.
    pub max_turns: Option<u32>,

    /// Maximum total token budget for this turn.
    pub max_total_tokens: Option<u64>,

    /// Maximum cost for this turn, in the provider's billing currency.
    pub max_cost: Option<Decimal>,

    /// Maximum wall-clock time for this turn.
    pub max_duration: Option<DurationMs>,

    /// Model override (implementation-specific string).
    pub model: Option<String>,

    /// Tool restrictions for this turn.
    /// None = use defaults. Some(list) = only these tools.
    pub allowed_tools: Option<Vec<String>>,

    /// Additional system prompt content to prepend/append.
    pub system_addendum: Option<String>,
}

/// Why a turn ended. The caller needs to know this to decide
/// what happens next (retry? continue? escalate?).
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Model produced a final response (natural completion).
    Complete,
    /// Hit the max_turns limit.
    MaxTurns,
    /// Hit the token or cost budget.
    BudgetExhausted,
    /// Wall-clock timeout.
    Timeout,
    /// The user aborted the turn.
    UserAbort,
    /// Unrecoverable error during execution.
    Error,
    /// Future exit reasons.
    Custom(String),
}

/// Output from a turn: the response and metadata about its execution.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutput {
    /// The turn's response content.
    pub message: Content,

    /// Why the turn ended.
    pub exit_reason: ExitReason,

    /// Execution metadata (cost, tokens, timing).
    pub metadata: TurnMetadata,
}

/// Execution metadata. Every field is concrete (not optional) because
/// every turn produces this data. Implementations that can't track
/// a field (e.g., cost for a local model) use zero/default.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMetadata {
    /// Input tokens consumed.
    pub tokens_in: u64,
    /// Output tokens generated.
    pub tokens_out: u64,
    /// Cost in the provider's billing currency.
    pub cost: Decimal,
    /// Number of RVR-B loop iterations used.
    pub turns_used: u32,
    /// Record of each tool call made.
    pub tools_called: Vec<ToolCallRecord>,
    /// Wall-clock duration of the turn.
    pub duration: DurationMs,
}

/// Record of a single tool invocation within a turn.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Name of the tool that was called.
    pub name: String,
    /// How long the tool call took.
    pub duration: DurationMs,
    /// Whether the call succeeded.
    pub success: bool,
}

impl Default for TurnMetadata {
    fn default() -> Self {
        Self {
            tokens_in: 0,
            tokens_out: 0,
            cost: Decimal::ZERO,
            turns_used: 0,
            tools_called: vec![],
            duration: DurationMs::ZERO,
        }
    }
}

impl TurnInput {
    /// Create a new TurnInput with required fields.
    pub fn new(message: Content, trigger: TriggerType) -> Self {
        Self {
            message,
            trigger,
            session: None,
            config: None,
            metadata: serde_json::Value::Null,
        }
    }
}

impl TurnOutput {
    /// Create a new TurnOutput with required fields.
    pub fn new(message: Content, exit_reason: ExitReason) -> Self {
        Self {
            message,
            exit_reason,
            metadata: TurnMetadata::default(),
        }
    }
}

impl ToolCallRecord {
    /// Create a new ToolCallRecord.
    pub fn new(name: impl Into<String>, duration: DurationMs, success: bool) -> Self {
        Self {
            name: name.into(),
            duration,
            success,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// THE TRAIT
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Protocol ① — The Turn
///
/// Drives one user turn from request to response. Receives input,
/// assembles context, reasons (model call), acts (tool execution),
/// produces output.
///
/// The RVR-B loop — React, Validate, Reflect, Backtrack — is this
/// trait's boundary. Implementations:
/// - the executor's RVR-B loop (full-featured turn with tools, snapshots,
///   and a plan)
/// - a raw model-call wrapper with no tools (the "simple intent" fast path)
/// - a mock (for testing)
///
/// The trait is intentionally one method. The turn is atomic from the
/// outside — you send input, you get output. Everything that happens
/// inside is the implementation's concern.
#[async_trait]
pub trait Turn: Send + Sync {
    /// Execute a single turn.
    ///
    /// The turn MAY read from a `StateReader` during context assembly.
    /// The turn MUST NOT write to external state directly during
    /// `execute` — persistence of the resulting messages is the caller's
    /// responsibility (the conversation store is an external collaborator).
    async fn execute(&self, input: TurnInput) -> Result<TurnOutput, TurnError>;
}
