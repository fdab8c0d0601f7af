#![deny(missing_docs)]
//! Acyclic todo DAG with status transitions, re-planning, and a transition
//! log for `plan_update` event construction.
//!
//! A `Plan`'s lifetime is bounded to one turn, owned exclusively by it —
//! this crate has no notion of multiple concurrent plans or persistence.

mod error;
mod id;
mod plan;

pub use error::PlanError;
pub use id::{PlanId, TodoId};
pub use plan::{Plan, ReplanDiff, ReplanOp, Status, Todo, TodoDraft, TransitionEntry};
