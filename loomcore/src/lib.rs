#![deny(missing_docs)]
//! # loomcore — umbrella crate
//!
//! A single import surface for the loomcore agent execution core.
//! Re-exports the protocol and its implementations behind feature flags,
//! plus a `prelude` for the happy path: a `Turn` implementation, a tool
//! registry, and a provider trait are usually all a caller needs to
//! assemble the RVR-B loop.

#[cfg(feature = "core")]
pub use layer0;
#[cfg(feature = "core")]
pub use loomcore_context;
#[cfg(feature = "executor")]
pub use loomcore_dispatch;
#[cfg(feature = "executor")]
pub use loomcore_executor;
#[cfg(feature = "hooks")]
pub use loomcore_hooks;
#[cfg(feature = "executor")]
pub use loomcore_intent;
#[cfg(feature = "executor")]
pub use loomcore_plan;
#[cfg(feature = "executor")]
pub use loomcore_snapshot;
#[cfg(feature = "state-fs")]
pub use loomcore_state_fs;
#[cfg(feature = "state-memory")]
pub use loomcore_state_memory;
#[cfg(feature = "executor")]
pub use loomcore_termination;
#[cfg(feature = "core")]
pub use loomcore_tool;
#[cfg(feature = "core")]
pub use loomcore_turn;

/// Happy-path imports for assembling a loomcore-based agent.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use layer0::{
        Content, ContentBlock, ExitReason, Hook, HookAction, HookContext, HookPoint, Scope,
        SessionId, StateReader, StateStore, Turn, TurnConfig, TurnInput, TurnOutput,
    };

    #[cfg(feature = "hooks")]
    pub use loomcore_hooks::HookRegistry;

    #[cfg(feature = "core")]
    pub use loomcore_tool::{ToolDyn, ToolError, ToolRegistry};

    #[cfg(feature = "core")]
    pub use loomcore_turn::provider::{Provider, ProviderError};

    #[cfg(feature = "executor")]
    pub use loomcore_dispatch::{PolicyEngine, ToolDispatcher};

    #[cfg(feature = "executor")]
    pub use loomcore_executor::{
        BacktrackDecision, BusyPolicy, ConversationSupervisor, Executor, ExecutorConfig,
        RollbackChoice, UserChannel,
    };

    #[cfg(feature = "executor")]
    pub use loomcore_intent::IntentAnalyzer;

    #[cfg(feature = "executor")]
    pub use loomcore_plan::Plan;

    #[cfg(feature = "executor")]
    pub use loomcore_snapshot::SnapshotManager;

    #[cfg(feature = "state-memory")]
    pub use loomcore_state_memory::MemoryStore;

    #[cfg(feature = "state-fs")]
    pub use loomcore_state_fs::FsStore;
}
