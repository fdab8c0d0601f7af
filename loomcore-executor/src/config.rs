//! Executor configuration: per-complexity turn budgets and the knobs the
//! RVR-B loop reads from when a turn's own `TurnConfig` doesn't override them.

use loomcore_intent::Complexity;

/// Iteration/token/wall-clock ceilings for one complexity tier.
#[derive(Debug, Clone, Copy)]
pub struct ComplexityBudget {
    /// Max react-loop iterations before requiring user confirmation.
    pub max_turns: u32,
    /// Hard ceiling on cumulative input+output tokens.
    pub max_total_tokens: u64,
    /// Wall-clock ceiling, relative to turn start.
    pub max_duration_millis: u64,
}

/// Configuration for an [`crate::Executor`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Budget applied when `IntentAnalyzer` classifies the turn as simple.
    pub simple: ComplexityBudget,
    /// Budget applied for medium complexity.
    pub medium: ComplexityBudget,
    /// Budget applied for complex, multi-step turns.
    pub complex: ComplexityBudget,
    /// How many backtracks a single todo/turn may absorb before the loop
    /// forces an abort (P7).
    pub max_backtracks_per_todo: u32,
    /// How long a `hitl_confirm`/`long_run_confirm` suspension waits before
    /// it's treated as a user abort.
    pub hitl_timeout_millis: u64,
    /// When true, a cooperative cancellation or backtrack abort commits the
    /// snapshot instead of rolling it back.
    pub commit_on_abort: bool,
    /// Tool output longer than this is truncated before it's echoed back
    /// into the live turn, to keep one noisy tool from blowing the context
    /// budget on its own.
    pub max_tool_output_chars: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            simple: ComplexityBudget { max_turns: 4, max_total_tokens: 20_000, max_duration_millis: 30_000 },
            medium: ComplexityBudget { max_turns: 12, max_total_tokens: 80_000, max_duration_millis: 120_000 },
            complex: ComplexityBudget { max_turns: 30, max_total_tokens: 250_000, max_duration_millis: 600_000 },
            max_backtracks_per_todo: 3,
            hitl_timeout_millis: 300_000,
            commit_on_abort: false,
            max_tool_output_chars: 8_000,
        }
    }
}

impl ExecutorConfig {
    /// The budget tier for a given complexity classification.
    pub fn budget_for(&self, complexity: Complexity) -> ComplexityBudget {
        match complexity {
            Complexity::Simple => self.simple,
            Complexity::Medium => self.medium,
            Complexity::Complex => self.complex,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complexity_selects_the_matching_tier() {
        let config = ExecutorConfig::default();
        assert_eq!(config.budget_for(Complexity::Simple).max_turns, config.simple.max_turns);
        assert_eq!(config.budget_for(Complexity::Complex).max_total_tokens, config.complex.max_total_tokens);
    }
}
