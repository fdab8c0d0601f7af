//! The [`IntentFingerprint`] produced once per turn.

use std::collections::HashSet;

/// How involved the turn is expected to be; governs the turn budget and
/// default planning depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    /// A single tool call or no tool call at all.
    Simple,
    /// A handful of related steps.
    Medium,
    /// Multi-step work that benefits from an explicit plan.
    Complex,
}

/// Hint to `PlanManager` about how much up-front planning the turn needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanningDepth {
    /// Skip planning; the Executor proceeds without a `Plan`.
    None,
    /// A flat plan, no sub-todos.
    Minimal,
    /// A full DAG with dependencies.
    Full,
}

/// Configuration computed once at turn start and held immutable thereafter.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IntentFingerprint {
    /// Complexity classification driving budget and plan depth defaults.
    pub complexity: Complexity,
    /// Skills selected for this turn. Empty by default.
    pub selected_skills: HashSet<String>,
    /// Tools the turn is allowed to call, derived from selected skills plus
    /// always-available tools.
    pub tool_allowlist: HashSet<String>,
    /// True when the user's intent is to cancel/abort; short-circuits the
    /// loop to a graceful stop.
    pub wants_to_stop: bool,
    /// Hint to `PlanManager` about planning depth.
    pub planning_depth: PlanningDepth,
    /// The cache key this fingerprint was computed (or reused) under.
    pub cache_key: String,
}

impl IntentFingerprint {
    /// The fallback fingerprint used when analysis fails outright —
    /// malformed LLM JSON, or every cache layer and the LLM call itself
    /// erroring. Never aborts the turn.
    pub fn default_fallback(cache_key: impl Into<String>, default_tools: HashSet<String>) -> Self {
        Self {
            complexity: Complexity::Medium,
            selected_skills: HashSet::new(),
            tool_allowlist: default_tools,
            wants_to_stop: false,
            planning_depth: PlanningDepth::Minimal,
            cache_key: cache_key.into(),
        }
    }
}
