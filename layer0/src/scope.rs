//! Scoped state addressing shared by the state-store protocol and the
//! hook/lifecycle event payloads.

use crate::id::SessionId;
use serde::{Deserialize, Serialize};

/// Where state lives. Scopes are hierarchical — a session scope
/// is narrower than the global scope.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Per-conversation-session.
    Session(SessionId),
    /// Shared across all sessions.
    Global,
    /// Future scopes.
    Custom(String),
}

/// Log severity levels, shared by the hook and lifecycle event payloads.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Finest-grained tracing.
    Trace,
    /// Debug-level detail.
    Debug,
    /// Informational messages.
    Info,
    /// Warnings.
    Warn,
    /// Errors.
    Error,
}
