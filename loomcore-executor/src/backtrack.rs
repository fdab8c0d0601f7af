//! Reflect: mapping a failed tool call's `ErrorKind` to a `BacktrackDecision`.
//!
//! Every kind but `LogicError` is handled deterministically — the mapping is
//! fixed and needs no model call. `LogicError` means the tool ran without
//! erroring but its output looks wrong, which only the model can judge.

use loomcore_dispatch::ErrorKind;
use loomcore_turn::provider::{Provider, ProviderError};
use loomcore_turn::types::{ContentPart, ProviderMessage, ProviderRequest, Role};

/// What the Reflect step chooses to do about a failed tool call.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum BacktrackDecision {
    /// Keep looping in the same iteration; nothing needs adjusting.
    Continue,
    /// Re-invoke the same tool with adjusted arguments.
    ParamAdjust {
        /// Hints for the model on what to change.
        hints: String,
    },
    /// Substitute an allowlisted equivalent tool and re-invoke.
    ToolReplace {
        /// The tool to use instead.
        new_tool: String,
    },
    /// Apply a plan diff and re-enter the outer loop.
    PlanReplan {
        /// Why the plan needs to change.
        reason: String,
    },
    /// Inject enrichment content and continue.
    ContextEnrich {
        /// What to search for.
        query: String,
    },
    /// Suspend and ask the user a clarifying question.
    IntentClarify {
        /// The question to ask.
        question: String,
    },
    /// Give up on this todo/turn.
    Abort {
        /// Why.
        reason: String,
    },
}

#[derive(serde::Deserialize)]
struct RawLogicDecision {
    action: String,
    #[serde(default)]
    detail: String,
}

/// The deterministic half of Reflect: everything except `LogicError`.
///
/// Returns `None` for `LogicError` and for any future non-exhaustive
/// variant — the caller must fall through to [`reflect_logic_error`] in
/// that case.
pub fn reflect_deterministic(kind: ErrorKind, tool_name: &str, message: &str) -> Option<BacktrackDecision> {
    match kind {
        ErrorKind::Transient => Some(BacktrackDecision::Continue),
        ErrorKind::PermissionDenied | ErrorKind::PolicyDenied => Some(BacktrackDecision::IntentClarify {
            question: format!("`{tool_name}` was denied ({message}). How should I proceed?"),
        }),
        ErrorKind::InvalidArgs => Some(BacktrackDecision::ParamAdjust { hints: message.to_string() }),
        ErrorKind::NotFound => Some(BacktrackDecision::IntentClarify {
            question: format!("`{tool_name}` could not find its target ({message}). What should I use instead?"),
        }),
        ErrorKind::UserAbort => Some(BacktrackDecision::Abort { reason: "cancelled by user".into() }),
        ErrorKind::BudgetExhausted | ErrorKind::Fatal => Some(BacktrackDecision::Abort { reason: message.to_string() }),
        ErrorKind::LogicError => None,
        _ => Some(BacktrackDecision::Abort { reason: message.to_string() }),
    }
}

/// The LLM-assisted half of Reflect, for `LogicError`. Falls back to
/// `Abort` on any provider failure or malformed response — Reflect never
/// panics the turn over its own recovery step failing.
pub async fn reflect_logic_error<P: Provider>(provider: &P, tool_name: &str, observed: &str) -> BacktrackDecision {
    let system = format!(
        "A tool call to `{tool_name}` completed but its output looks wrong: {observed}\n\
         Choose exactly one recovery action and respond with a single JSON object: \
         {{\"action\": \"tool_replace\"|\"param_adjust\"|\"plan_replan\"|\"context_enrich\"|\"intent_clarify\"|\"abort\", \
         \"detail\": string}}. No other text."
    );
    let request = ProviderRequest {
        model: None,
        messages: vec![ProviderMessage {
            role: Role::User,
            content: vec![ContentPart::Text { text: observed.to_string() }],
        }],
        tools: Vec::new(),
        max_tokens: Some(200),
        temperature: Some(0.0),
        system: Some(system),
        extra: serde_json::Value::Null,
    };

    let response = match provider.complete(request).await {
        Ok(r) => r,
        Err(e) => return abort_on_provider_error(e),
    };

    let text = response.content.iter().find_map(|part| match part {
        ContentPart::Text { text } => Some(text.as_str()),
        _ => None,
    });
    let Some(text) = text else {
        return BacktrackDecision::Abort { reason: "reflect call returned no text".into() };
    };

    let raw: RawLogicDecision = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "reflect response was malformed, aborting this todo");
            return BacktrackDecision::Abort { reason: "malformed reflect response".into() };
        }
    };

    match raw.action.as_str() {
        "tool_replace" => BacktrackDecision::ToolReplace { new_tool: raw.detail },
        "param_adjust" => BacktrackDecision::ParamAdjust { hints: raw.detail },
        "plan_replan" => BacktrackDecision::PlanReplan { reason: raw.detail },
        "context_enrich" => BacktrackDecision::ContextEnrich { query: raw.detail },
        "intent_clarify" => BacktrackDecision::IntentClarify { question: raw.detail },
        _ => BacktrackDecision::Abort { reason: raw.detail },
    }
}

fn abort_on_provider_error(e: ProviderError) -> BacktrackDecision {
    tracing::warn!(error = %e, "reflect provider call failed, aborting this todo");
    BacktrackDecision::Abort { reason: e.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomcore_turn::types::{ProviderResponse, StopReason, TokenUsage};

    #[test]
    fn transient_continues() {
        assert_eq!(reflect_deterministic(ErrorKind::Transient, "t", "m"), Some(BacktrackDecision::Continue));
    }

    #[test]
    fn policy_denied_asks_for_clarification() {
        assert!(matches!(
            reflect_deterministic(ErrorKind::PolicyDenied, "rm", "blocked"),
            Some(BacktrackDecision::IntentClarify { .. })
        ));
    }

    #[test]
    fn budget_exhausted_aborts() {
        assert!(matches!(
            reflect_deterministic(ErrorKind::BudgetExhausted, "t", "m"),
            Some(BacktrackDecision::Abort { .. })
        ));
    }

    #[test]
    fn fatal_aborts() {
        assert!(matches!(reflect_deterministic(ErrorKind::Fatal, "t", "m"), Some(BacktrackDecision::Abort { .. })));
    }

    #[test]
    fn logic_error_defers_to_the_model() {
        assert_eq!(reflect_deterministic(ErrorKind::LogicError, "t", "m"), None);
    }

    struct ScriptedProvider(String);
    impl Provider for ScriptedProvider {
        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                content: vec![ContentPart::Text { text: self.0.clone() }],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
                model: "test".into(),
                cost: None,
                truncated: None,
            })
        }
    }

    struct FailingProvider;
    impl Provider for FailingProvider {
        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::RequestFailed("boom".into()))
        }
    }

    #[tokio::test]
    async fn logic_error_parses_a_well_formed_decision() {
        let provider = ScriptedProvider(r#"{"action":"tool_replace","detail":"read_file_v2"}"#.into());
        let decision = reflect_logic_error(&provider, "read_file", "returned binary garbage").await;
        assert_eq!(decision, BacktrackDecision::ToolReplace { new_tool: "read_file_v2".into() });
    }

    #[tokio::test]
    async fn logic_error_falls_back_to_abort_on_malformed_response() {
        let provider = ScriptedProvider("not json".into());
        let decision = reflect_logic_error(&provider, "read_file", "garbage").await;
        assert!(matches!(decision, BacktrackDecision::Abort { .. }));
    }

    #[tokio::test]
    async fn logic_error_falls_back_to_abort_on_provider_failure() {
        let decision = reflect_logic_error(&FailingProvider, "read_file", "garbage").await;
        assert!(matches!(decision, BacktrackDecision::Abort { .. }));
    }
}
