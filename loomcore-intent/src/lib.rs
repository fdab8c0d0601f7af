#![deny(missing_docs)]
//! Single-call intent analysis with a four-layer cache in front of it.
//!
//! `IntentAnalyzer` produces the [`IntentFingerprint`] that shapes
//! everything downstream of turn start: complexity, skill selection, tool
//! allowlisting, and whether the turn should stop immediately. Four cache
//! layers are tried in order before falling back to an LLM call, and a
//! failed or malformed call never aborts the turn — it falls back to a
//! conservative default fingerprint instead.

mod analyzer;
mod cache;
mod fingerprint;

pub use analyzer::{AnalyzeInput, IntentAnalyzer, SkillSummary};
pub use cache::{CacheLayer, Embedder, ExactMatchCache, FollowUpCache, HashEmbedder, IntentRequest, LayerStats, SemanticCache, base_allowlist, exact_match_key};
pub use fingerprint::{Complexity, IntentFingerprint, PlanningDepth};
