//! # layer0 — Protocol traits for the loomcore agent execution core
//!
//! This crate defines the protocol boundaries and cross-cutting interfaces
//! that the execution core is built from.
//!
//! ## The Protocols
//!
//! | Protocol | Trait | What it does |
//! |----------|-------|-------------|
//! | ① Turn | [`Turn`] | What the agent does per user turn |
//! | ② State | [`StateStore`] | How data persists across turns |
//!
//! ## The Interfaces
//!
//! | Interface | Types | What it does |
//! |-----------|-------|-------------|
//! | ③ Hooks | [`Hook`], [`HookPoint`], [`HookAction`] | Observation + intervention |
//! | ④ Lifecycle | [`BudgetEvent`], [`CompactionEvent`] | Cross-layer coordination |
//!
//! ## Design Principle
//!
//! Every protocol trait is operation-defined, not mechanism-defined.
//! [`Turn::execute`] means "drive one user turn to completion" — not
//! "make an API call" or "run a subprocess." The executor's RVR-B loop,
//! a raw single-shot model call, and a test mock all implement the same
//! trait.
//!
//! ## Dependency Notes
//!
//! This crate depends on `serde_json::Value` for extension data fields
//! (metadata, tool inputs, custom payloads). This is an intentional choice:
//! JSON is the universal interchange format for agentic systems, and
//! `serde_json::Value` is the de facto standard in the Rust ecosystem.
//! The alternative (generic `T: Serialize`) would complicate trait object
//! safety without practical benefit.
//!
//! ## Future: Native Async Traits
//!
//! Protocol traits currently use `async-trait` (heap-allocated futures).
//! When Rust stabilizes `async fn in dyn Trait` with `Send` bounds,
//! these traits will migrate to native async. This will be a breaking
//! change in a minor version bump before v1.0.

#![deny(missing_docs)]

pub mod content;
pub mod duration;
pub mod error;
pub mod hook;
pub mod id;
pub mod lifecycle;
pub mod scope;
pub mod state;
pub mod turn;

#[cfg(feature = "test-utils")]
pub mod test_utils;

// Re-exports for convenience
pub use content::{Content, ContentBlock};
pub use duration::DurationMs;
pub use error::{HookError, StateError, TurnError};
pub use hook::{Hook, HookAction, HookContext, HookPoint};
pub use id::{ConversationId, SessionId, SkillId, SnapshotId, TurnId};
pub use lifecycle::{BudgetDecision, BudgetEvent, CompactionEvent, EventSource, ObservableEvent};
pub use scope::{LogLevel, Scope};
pub use state::{SearchResult, StateReader, StateStore};
pub use turn::{
    ExitReason, ToolCallRecord, Turn, TurnConfig, TurnInput, TurnMetadata, TurnOutput,
};
