//! Errors from plan construction and status transitions.

use crate::id::TodoId;

/// Why a `Plan` operation was rejected.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// The draft list contains a dependency cycle.
    #[error("plan contains a dependency cycle")]
    Cyclic,
    /// A draft named a dependency index that doesn't exist.
    #[error("todo draft referenced an out-of-range dependency index {0}")]
    UnknownDependency(usize),
    /// The given todo id isn't part of this plan.
    #[error("unknown todo id {0}")]
    UnknownTodo(TodoId),
    /// The todo isn't in the state the requested transition requires.
    #[error("todo {id} is {state}, cannot {attempted}")]
    InvalidTransition {
        /// The todo whose transition was rejected.
        id: TodoId,
        /// Its current status.
        state: String,
        /// What was attempted.
        attempted: String,
    },
    /// Not all of a todo's dependencies are completed yet.
    #[error("todo {0} has incomplete dependencies")]
    DependenciesIncomplete(TodoId),
    /// A replan would have uncompleted an already-completed todo.
    #[error("replan would un-complete todo {0}")]
    ReplanWouldRegressCompletedTodo(TodoId),
}
