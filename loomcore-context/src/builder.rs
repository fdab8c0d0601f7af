//! The three-phase message assembly: stable prefix, decayed history, live
//! turn, packed into a token budget.

use layer0::id::TurnId;
use layer0::lifecycle::CompactionEvent;
use loomcore_turn::context::ContextStrategy;
use loomcore_turn::types::{ContentPart, ProviderMessage, Role};

use crate::counter::{TokenCounter, TokenEstimator};
use crate::prefix::StablePrefix;

/// Configured fractions of the token budget that separate green/yellow/
/// orange/red, so a very small or very large budget still produces a
/// meaningful signal instead of a fixed percentage.
#[derive(Debug, Clone)]
pub struct ColorThresholds {
    /// Fraction above which usage is yellow instead of green.
    pub yellow_at: f64,
    /// Fraction above which usage is orange instead of yellow.
    pub orange_at: f64,
    /// Fraction above which usage is red instead of orange.
    pub red_at: f64,
}

impl Default for ColorThresholds {
    fn default() -> Self {
        Self {
            yellow_at: 0.5,
            orange_at: 0.75,
            red_at: 0.9,
        }
    }
}

/// Traffic-light signal for how full the context window is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorLevel {
    /// Plenty of headroom.
    Green,
    /// Getting full; no action needed yet.
    Yellow,
    /// Compaction likely needed soon.
    Orange,
    /// At or near the budget ceiling.
    Red,
}

impl ColorLevel {
    fn from_fraction(fraction: f64, thresholds: &ColorThresholds) -> Self {
        if fraction >= thresholds.red_at {
            ColorLevel::Red
        } else if fraction >= thresholds.orange_at {
            ColorLevel::Orange
        } else if fraction >= thresholds.yellow_at {
            ColorLevel::Yellow
        } else {
            ColorLevel::Green
        }
    }
}

/// Configuration for a [`ContextBuilder`].
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Total token ceiling for the assembled messages.
    pub token_budget_total: usize,
    /// Tokens reserved for the model's own output, subtracted from the budget.
    pub context_reserve_for_output: usize,
    /// Number of most-recent turns kept verbatim before decay kicks in.
    pub history_keep_full_turns: usize,
    /// Thresholds for the usage color signal.
    pub color_thresholds: ColorThresholds,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget_total: 100_000,
            context_reserve_for_output: 4_096,
            history_keep_full_turns: 6,
            color_thresholds: ColorThresholds::default(),
        }
    }
}

/// What `ContextBuilder::build` produced, alongside the events a caller
/// should forward to observers.
#[derive(Debug, Clone)]
pub struct BuildResult {
    /// The assembled messages, ready to send to the provider.
    pub messages: Vec<ProviderMessage>,
    /// Estimated token count of `messages`.
    pub current_tokens: usize,
    /// The effective budget (`token_budget_total - context_reserve_for_output`).
    pub budget_tokens: usize,
    /// Traffic-light signal for how full the window is.
    pub color_level: ColorLevel,
    /// Set when phase-2 compression fired this build.
    pub trimming: Option<CompactionEvent>,
}

/// Assembles per-turn provider messages from three phases — stable prefix,
/// decayed history, live turn — honoring a token budget and shrinking the
/// least cache-sensitive phase first when over budget.
pub struct ContextBuilder {
    config: ContextConfig,
    counter: TokenCounter,
    history_strategies: Vec<Box<dyn ContextStrategy>>,
}

impl ContextBuilder {
    /// Create a builder with the given configuration and an ordered list of
    /// phase-2 compaction strategies, tried least-destructive first.
    pub fn new(config: ContextConfig, history_strategies: Vec<Box<dyn ContextStrategy>>) -> Self {
        Self {
            config,
            counter: TokenCounter::new(),
            history_strategies,
        }
    }

    fn effective_budget(&self) -> usize {
        self.config
            .token_budget_total
            .saturating_sub(self.config.context_reserve_for_output)
    }

    /// Build the messages array for one sub-step of the loop.
    ///
    /// `stable_prefix` is phase 1 (system prompt, tools, skills, memory).
    /// `history` is the prior conversation turns, oldest first. `live_turn`
    /// is phase 3: the user message, in-progress assistant content, and any
    /// just-produced tool results, always included verbatim.
    pub fn build(
        &self,
        turn: TurnId,
        stable_prefix: &StablePrefix,
        history: Vec<ProviderMessage>,
        live_turn: Vec<ProviderMessage>,
    ) -> BuildResult {
        let budget = self.effective_budget();

        let prefix_text = stable_prefix.render();
        let prefix_message = ProviderMessage {
            role: Role::System,
            content: vec![ContentPart::Text { text: prefix_text }],
        };

        let mut decayed_history = history;
        let mut trimming = None;

        let assembled_without_history_decay =
            self.assemble(&prefix_message, &decayed_history, &live_turn);
        let mut current_tokens = self.counter.estimate_messages(&assembled_without_history_decay);

        if current_tokens > budget {
            let before = current_tokens;
            for strategy in &self.history_strategies {
                let assembled = self.assemble(&prefix_message, &decayed_history, &live_turn);
                if self.counter.estimate_messages(&assembled) <= budget {
                    break;
                }
                decayed_history = strategy.compact(decayed_history);
            }
            let assembled = self.assemble(&prefix_message, &decayed_history, &live_turn);
            current_tokens = self.counter.estimate_messages(&assembled);

            if current_tokens < before {
                trimming = Some(CompactionEvent::CompactionComplete {
                    turn,
                    strategy: "phase2_chain".into(),
                    tokens_freed: (before - current_tokens) as u64,
                });
            }
        }

        // Phase-1 shrinking: only reached if phase-2 compression alone
        // wasn't enough. Collapse skill/tool detail to headers, never touch
        // phase 3.
        let mut prefix_message = prefix_message;
        if current_tokens > budget {
            let collapsed = stable_prefix.headers_only();
            prefix_message = ProviderMessage {
                role: Role::System,
                content: vec![ContentPart::Text {
                    text: collapsed.render(),
                }],
            };
            let assembled = self.assemble(&prefix_message, &decayed_history, &live_turn);
            current_tokens = self.counter.estimate_messages(&assembled);
        }

        let messages = self.assemble(&prefix_message, &decayed_history, &live_turn);
        let fill_fraction = if budget == 0 {
            1.0
        } else {
            (current_tokens as f64 / budget as f64).min(1.0)
        };
        let color_level = ColorLevel::from_fraction(fill_fraction, &self.config.color_thresholds);

        BuildResult {
            messages,
            current_tokens,
            budget_tokens: budget,
            color_level,
            trimming,
        }
    }

    fn assemble(
        &self,
        prefix_message: &ProviderMessage,
        history: &[ProviderMessage],
        live_turn: &[ProviderMessage],
    ) -> Vec<ProviderMessage> {
        let mut result = Vec::with_capacity(1 + history.len() + live_turn.len());
        result.push(prefix_message.clone());
        result.extend(history.iter().cloned());
        result.extend(live_turn.iter().cloned());
        result
    }

    /// Build a `ContextPressure` event for the current usage, without
    /// running a full build — used for the periodic `context_usage_update`
    /// emitted independent of compaction.
    pub fn pressure_event(&self, turn: TurnId, current_tokens: u64) -> CompactionEvent {
        let budget = self.effective_budget() as u64;
        CompactionEvent::ContextPressure {
            turn,
            fill_fraction: if budget == 0 {
                1.0
            } else {
                (current_tokens as f64 / budget as f64).min(1.0)
            },
            tokens_used: current_tokens,
            tokens_available: budget.saturating_sub(current_tokens),
        }
    }
}
