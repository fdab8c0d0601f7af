//! Plan and todo identifiers.

use std::fmt;

/// Dense `u32` index into a [`crate::Plan`]'s todo arena.
///
/// The only id in this workspace that isn't a typed string wrapper: the
/// DAG is modeled as an arena plus integer indices specifically to avoid a
/// graph of owning references, so the id has to be an arena index, not an
/// opaque string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct TodoId(pub u32);

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one `Plan` for the lifetime of its owning turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PlanId(pub String);

impl PlanId {
    /// Build a plan id from anything that converts to `String`.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
