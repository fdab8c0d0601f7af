//! Exec policy engine: ordered glob rules over `(tool_name, args)`.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A single policy decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    /// Allow the call to proceed.
    Allow,
    /// Reject the call without invoking the tool.
    Deny,
}

/// One rule as loaded from `exec-policy.json`.
///
/// `pattern` is matched against a canonical string built from the tool name
/// and a stable serialization of its arguments, so a rule can target either
/// the tool as a whole (`"write_file *"`) or a specific argument shape
/// (`"run_command *rm -rf*"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Glob pattern (`*` and `?` only; everything else is matched literally).
    pub pattern: String,
    /// What to do when this rule matches.
    pub decision: PolicyDecision,
}

/// Ordered, compiled-once policy engine.
///
/// Rules are evaluated top-to-bottom; the first match wins. No match means
/// allow — the spec's default-allow posture, which differs from a
/// default-deny sandbox: this engine exists to carve out exceptions, not to
/// gate everything behind an allowlist.
#[derive(Debug)]
pub struct PolicyEngine {
    rules: Vec<(Regex, PolicyDecision)>,
}

impl PolicyEngine {
    /// Compile rules from their on-disk representation.
    ///
    /// A rule with an unparsable pattern is a load-time error — a malformed
    /// policy file must never silently fail open.
    pub fn from_rules(rules: Vec<PolicyRule>) -> Result<Self, PolicyLoadError> {
        let compiled = rules
            .into_iter()
            .map(|r| {
                glob_to_regex(&r.pattern)
                    .map(|re| (re, r.decision))
                    .ok_or_else(|| PolicyLoadError::InvalidPattern(r.pattern.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules: compiled })
    }

    /// Parse an `exec-policy.json` document.
    pub fn from_json(json: &str) -> Result<Self, PolicyLoadError> {
        let rules: Vec<PolicyRule> =
            serde_json::from_str(json).map_err(|e| PolicyLoadError::Parse(e.to_string()))?;
        Self::from_rules(rules)
    }

    /// An engine with no rules — everything is allowed.
    pub fn allow_all() -> Self {
        Self { rules: Vec::new() }
    }

    /// Decide whether `tool_name` called with `args` is allowed.
    pub fn evaluate(&self, tool_name: &str, args: &serde_json::Value) -> PolicyDecision {
        let canonical = canonical_call_string(tool_name, args);
        for (re, decision) in &self.rules {
            if re.is_match(&canonical) {
                return *decision;
            }
        }
        PolicyDecision::Allow
    }
}

/// Build the string a policy rule's pattern is matched against.
fn canonical_call_string(tool_name: &str, args: &serde_json::Value) -> String {
    format!("{tool_name} {args}")
}

/// A malformed `exec-policy.json`.
#[derive(Debug, thiserror::Error)]
pub enum PolicyLoadError {
    /// The document wasn't valid JSON or didn't match the rule schema.
    #[error("failed to parse policy document: {0}")]
    Parse(String),
    /// A rule's `pattern` could not be compiled.
    #[error("invalid policy pattern: {0}")]
    InvalidPattern(String),
}

/// Convert a simple shell glob pattern to a [`Regex`].
///
/// Only `*` (match anything) and `?` (match one char) are special;
/// everything else is matched literally.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, decision: PolicyDecision) -> PolicyRule {
        PolicyRule { pattern: pattern.to_string(), decision }
    }

    #[test]
    fn first_match_wins_regardless_of_decision() {
        let engine = PolicyEngine::from_rules(vec![
            rule("run_command *rm -rf*", PolicyDecision::Deny),
            rule("run_command *", PolicyDecision::Allow),
        ])
        .unwrap();
        let decision = engine.evaluate("run_command", &serde_json::json!({"cmd": "rm -rf /tmp"}));
        assert_eq!(decision, PolicyDecision::Deny);
    }

    #[test]
    fn later_allow_rule_does_not_override_earlier_deny() {
        let engine = PolicyEngine::from_rules(vec![
            rule("run_command *Format-*", PolicyDecision::Deny),
            rule("run_command *", PolicyDecision::Allow),
        ])
        .unwrap();
        let decision = engine.evaluate("run_command", &serde_json::json!({"cmd": "Format-Volume C:"}));
        assert_eq!(decision, PolicyDecision::Deny);
    }

    #[test]
    fn no_match_defaults_to_allow() {
        let engine = PolicyEngine::from_rules(vec![rule("run_command *Stop-Computer*", PolicyDecision::Deny)]).unwrap();
        let decision = engine.evaluate("read_file", &serde_json::json!({"path": "/tmp/x"}));
        assert_eq!(decision, PolicyDecision::Allow);
    }

    #[test]
    fn malformed_json_is_a_load_error_not_a_silent_skip() {
        let err = PolicyEngine::from_json("not json").unwrap_err();
        assert!(matches!(err, PolicyLoadError::Parse(_)));
    }

    #[test]
    fn allow_all_allows_everything() {
        let engine = PolicyEngine::allow_all();
        assert_eq!(
            engine.evaluate("anything", &serde_json::json!({})),
            PolicyDecision::Allow
        );
    }
}
