//! `IntentAnalyzer`: one LLM call (cache permitting) producing an
//! [`IntentFingerprint`] per turn.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use loomcore_turn::provider::Provider;
use loomcore_turn::types::{ContentPart, ProviderMessage, ProviderRequest, Role};
use tokio::sync::Mutex;

use crate::cache::{CacheLayer, IntentRequest, LayerStats, exact_match_key};
use crate::fingerprint::{Complexity, IntentFingerprint, PlanningDepth};

/// A skill's catalogue entry, as shown to the model.
#[derive(Debug, Clone)]
pub struct SkillSummary {
    /// Skill name.
    pub name: String,
    /// One-line description.
    pub description: String,
}

/// Everything `IntentAnalyzer::analyze` needs for one turn.
#[derive(Debug, Clone)]
pub struct AnalyzeInput {
    /// Plain-text extraction of the user's current message.
    pub user_text: String,
    /// Identifies the conversation, for cache scoping.
    pub conversation_signature: String,
    /// One-line `role: summary` entries for recent turns.
    pub recent_turns: Vec<String>,
    /// Skills available to select from.
    pub available_skills: Vec<SkillSummary>,
    /// Whether the prior turn left a plan in progress.
    pub has_active_plan: bool,
}

#[derive(serde::Deserialize)]
struct RawFingerprint {
    complexity: Complexity,
    #[serde(default)]
    selected_skills: HashSet<String>,
    #[serde(default)]
    wants_to_stop: bool,
    planning_depth: PlanningDepth,
}

/// Produces and caches [`IntentFingerprint`]s.
///
/// Owns an ordered chain of [`CacheLayer`]s, probed in order; a miss on
/// every layer falls through to one LLM call. A malformed or failed LLM
/// call never aborts the turn — it falls back to a conservative default.
pub struct IntentAnalyzer<P: Provider> {
    provider: P,
    model: Option<String>,
    layers: Vec<Box<dyn CacheLayer>>,
    always_available_tools: HashSet<String>,
    stats: Mutex<HashMap<&'static str, LayerStats>>,
}

impl<P: Provider> IntentAnalyzer<P> {
    /// Build an analyzer with the given cache chain, probed in the order
    /// given.
    pub fn new(provider: P, model: Option<String>, layers: Vec<Box<dyn CacheLayer>>, always_available_tools: HashSet<String>) -> Self {
        Self { provider, model, layers, always_available_tools, stats: Mutex::new(HashMap::new()) }
    }

    /// Current hit/miss/latency counters per cache layer.
    pub async fn stats(&self) -> HashMap<&'static str, LayerStats> {
        self.stats.lock().await.clone()
    }

    /// Produce the fingerprint for this turn, trying each cache layer in
    /// order before falling back to an LLM call.
    pub async fn analyze(&self, input: AnalyzeInput) -> IntentFingerprint {
        let req = IntentRequest {
            user_text: input.user_text.clone(),
            conversation_signature: input.conversation_signature.clone(),
            has_active_plan: input.has_active_plan,
        };

        for layer in &self.layers {
            let started = Instant::now();
            let result = layer.probe(&req).await;
            let hit = result.is_some();
            self.record(layer.name(), hit, started.elapsed().as_micros() as u64).await;
            if let Some(fingerprint) = result {
                return fingerprint;
            }
        }

        let fingerprint = self.call_llm(&input, &req).await;
        for layer in &self.layers {
            layer.store(&req, &fingerprint).await;
        }
        fingerprint
    }

    async fn record(&self, name: &'static str, hit: bool, micros: u64) {
        let mut stats = self.stats.lock().await;
        let entry = stats.entry(name).or_default();
        if hit {
            entry.hits += 1;
        } else {
            entry.misses += 1;
        }
        entry.total_micros += micros;
    }

    async fn call_llm(&self, input: &AnalyzeInput, req: &IntentRequest) -> IntentFingerprint {
        let cache_key = exact_match_key(req);
        let fallback = || IntentFingerprint::default_fallback(cache_key.clone(), self.always_available_tools.clone());

        let request = self.build_request(input);
        let response = match self.provider.complete(request).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "intent analysis LLM call failed, falling back");
                return fallback();
            }
        };

        let text = response.content.iter().find_map(|part| match part {
            ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        });
        let Some(text) = text else {
            tracing::warn!("intent analysis response had no text content, falling back");
            return fallback();
        };

        let raw: RawFingerprint = match serde_json::from_str(text) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "intent analysis returned malformed JSON, falling back");
                return fallback();
            }
        };

        let mut tool_allowlist = self.always_available_tools.clone();
        for skill in &raw.selected_skills {
            tool_allowlist.insert(skill.clone());
        }

        IntentFingerprint {
            complexity: raw.complexity,
            selected_skills: raw.selected_skills,
            tool_allowlist,
            wants_to_stop: raw.wants_to_stop,
            planning_depth: raw.planning_depth,
            cache_key,
        }
    }

    fn build_request(&self, input: &AnalyzeInput) -> ProviderRequest {
        let skills_listing = input
            .available_skills
            .iter()
            .map(|s| format!("- {}: {}", s.name, s.description))
            .collect::<Vec<_>>()
            .join("\n");
        let history = input.recent_turns.join("\n");

        let system = format!(
            "Classify the user's intent for this turn. Available skills:\n{skills_listing}\n\n\
             Recent turns:\n{history}\n\n\
             Respond with a single JSON object: \
             {{\"complexity\": \"simple\"|\"medium\"|\"complex\", \
             \"selected_skills\": [string], \"wants_to_stop\": bool, \
             \"planning_depth\": \"none\"|\"minimal\"|\"full\"}}. No other text."
        );

        ProviderRequest {
            model: self.model.clone(),
            messages: vec![ProviderMessage {
                role: Role::User,
                content: vec![ContentPart::Text { text: input.user_text.clone() }],
            }],
            tools: Vec::new(),
            max_tokens: Some(256),
            temperature: Some(0.0),
            system: Some(system),
            extra: serde_json::Value::Null,
        }
    }
}
