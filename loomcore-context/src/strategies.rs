//! Compaction strategies implementing [`ContextStrategy`], chained by
//! [`CompositeStrategy`] and tried from least to most destructive.

use loomcore_turn::context::ContextStrategy;
use loomcore_turn::types::{ContentPart, ProviderMessage, Role};

use crate::counter::{TokenCounter, TokenEstimator};

/// Keeps the first message (typically the initial user message or a system
/// prompt) plus the most recent messages that fit, dropping everything in
/// between.
pub struct SlidingWindowStrategy {
    counter: TokenCounter,
    max_tokens: usize,
}

impl SlidingWindowStrategy {
    /// Create a strategy that compacts once the estimated token count
    /// exceeds `max_tokens`.
    pub fn new(max_tokens: usize) -> Self {
        Self {
            counter: TokenCounter::new(),
            max_tokens,
        }
    }

    /// Create with a custom token counter.
    pub fn with_counter(max_tokens: usize, counter: TokenCounter) -> Self {
        Self { counter, max_tokens }
    }
}

impl ContextStrategy for SlidingWindowStrategy {
    fn token_estimate(&self, messages: &[ProviderMessage]) -> usize {
        self.counter.estimate_messages(messages)
    }

    fn should_compact(&self, messages: &[ProviderMessage], _limit: usize) -> bool {
        self.counter.estimate_messages(messages) > self.max_tokens
    }

    fn compact(&self, messages: Vec<ProviderMessage>) -> Vec<ProviderMessage> {
        if messages.len() <= 2 {
            return messages;
        }

        let first = messages[0].clone();
        let rest = &messages[1..];
        let target = self.max_tokens;

        let mut kept = Vec::new();
        let mut current_tokens = self.counter.estimate_message(&first);

        for msg in rest.iter().rev() {
            let msg_tokens = self.counter.estimate_message(msg);
            if current_tokens + msg_tokens > target && !kept.is_empty() {
                break;
            }
            kept.push(msg.clone());
            current_tokens += msg_tokens;
        }

        kept.reverse();
        let mut result = vec![first];
        result.extend(kept);
        result
    }
}

/// Replaces old tool result content with a placeholder, keeping the most
/// recent `keep_recent_n` tool results intact. Preserves `tool_use_id` so
/// the conversation still makes semantic sense to the model.
pub struct ToolResultClearingStrategy {
    keep_recent_n: usize,
}

impl ToolResultClearingStrategy {
    /// Create a strategy that leaves the `keep_recent_n` most recent tool
    /// results untouched and clears the rest.
    pub fn new(keep_recent_n: usize) -> Self {
        Self { keep_recent_n }
    }
}

impl ContextStrategy for ToolResultClearingStrategy {
    fn token_estimate(&self, messages: &[ProviderMessage]) -> usize {
        TokenCounter::new().estimate_messages(messages)
    }

    fn should_compact(&self, messages: &[ProviderMessage], limit: usize) -> bool {
        self.token_estimate(messages) > limit
    }

    fn compact(&self, messages: Vec<ProviderMessage>) -> Vec<ProviderMessage> {
        let total_results = messages
            .iter()
            .flat_map(|m| &m.content)
            .filter(|p| matches!(p, ContentPart::ToolResult { .. }))
            .count();
        let to_clear = total_results.saturating_sub(self.keep_recent_n);
        if to_clear == 0 {
            return messages;
        }

        let mut cleared = 0;
        messages
            .into_iter()
            .map(|mut msg| {
                msg.content = msg
                    .content
                    .into_iter()
                    .map(|part| match part {
                        ContentPart::ToolResult {
                            tool_use_id,
                            is_error,
                            ..
                        } if cleared < to_clear => {
                            cleared += 1;
                            ContentPart::ToolResult {
                                tool_use_id,
                                content: "[tool result cleared]".into(),
                                is_error,
                            }
                        }
                        other => other,
                    })
                    .collect();
                msg
            })
            .collect()
    }
}

/// Collapses older turns into a one-line structural summary instead of
/// dropping them outright — "turn N: user asked about X; assistant used
/// tools [a, b]; outcome: ..." — cheaper than an LLM summarization call and
/// deterministic, which matters for the turn-replay determinism property.
pub struct StructuralSummaryStrategy {
    preserve_recent: usize,
}

impl StructuralSummaryStrategy {
    /// Create a strategy that preserves the last `preserve_recent` messages
    /// verbatim and structurally summarizes everything before them.
    pub fn new(preserve_recent: usize) -> Self {
        Self { preserve_recent }
    }

    fn summarize_one(index: usize, msg: &ProviderMessage) -> String {
        let tool_names: Vec<&str> = msg
            .content
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolUse { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        let text_preview: String = msg
            .content
            .iter()
            .find_map(|p| match p {
                ContentPart::Text { text } => Some(text.chars().take(60).collect::<String>()),
                _ => None,
            })
            .unwrap_or_default();

        match (tool_names.is_empty(), text_preview.is_empty()) {
            (false, _) => format!("turn {index}: used tools [{}]", tool_names.join(", ")),
            (true, false) => format!("turn {index}: \"{text_preview}\""),
            (true, true) => format!("turn {index}: (no content)"),
        }
    }
}

impl ContextStrategy for StructuralSummaryStrategy {
    fn token_estimate(&self, messages: &[ProviderMessage]) -> usize {
        TokenCounter::new().estimate_messages(messages)
    }

    fn should_compact(&self, messages: &[ProviderMessage], limit: usize) -> bool {
        self.token_estimate(messages) > limit
    }

    fn compact(&self, messages: Vec<ProviderMessage>) -> Vec<ProviderMessage> {
        if messages.len() <= self.preserve_recent {
            return messages;
        }

        let split = messages.len() - self.preserve_recent;
        let (old, recent) = messages.split_at(split);

        let summary_lines: Vec<String> = old
            .iter()
            .enumerate()
            .map(|(i, msg)| Self::summarize_one(i, msg))
            .collect();

        let summary_msg = ProviderMessage {
            role: Role::User,
            content: vec![ContentPart::Text {
                text: format!(
                    "[structural summary of {} earlier turns]\n{}",
                    old.len(),
                    summary_lines.join("\n")
                ),
            }],
        };

        let mut result = vec![summary_msg];
        result.extend(recent.iter().cloned());
        result
    }
}

/// Chains multiple strategies, applying each in order until the running
/// estimate falls under budget. Least destructive first: stops as soon as
/// a prefix of the chain suffices.
pub struct CompositeStrategy {
    strategies: Vec<Box<dyn ContextStrategy>>,
    max_tokens: usize,
}

impl CompositeStrategy {
    /// Build a composite from an ordered list of strategies.
    pub fn new(strategies: Vec<Box<dyn ContextStrategy>>, max_tokens: usize) -> Self {
        Self {
            strategies,
            max_tokens,
        }
    }
}

impl ContextStrategy for CompositeStrategy {
    fn token_estimate(&self, messages: &[ProviderMessage]) -> usize {
        TokenCounter::new().estimate_messages(messages)
    }

    fn should_compact(&self, messages: &[ProviderMessage], _limit: usize) -> bool {
        self.token_estimate(messages) > self.max_tokens
    }

    fn compact(&self, messages: Vec<ProviderMessage>) -> Vec<ProviderMessage> {
        let counter = TokenCounter::new();
        let mut current = messages;
        for strategy in &self.strategies {
            if counter.estimate_messages(&current) <= self.max_tokens {
                break;
            }
            current = strategy.compact(current);
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_msg(text: &str) -> ProviderMessage {
        ProviderMessage {
            role: Role::User,
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }

    fn assistant_msg(text: &str) -> ProviderMessage {
        ProviderMessage {
            role: Role::Assistant,
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }

    fn tool_use_msg(id: &str, name: &str) -> ProviderMessage {
        ProviderMessage {
            role: Role::Assistant,
            content: vec![ContentPart::ToolUse {
                id: id.into(),
                name: name.into(),
                input: serde_json::json!({}),
            }],
        }
    }

    fn tool_result_msg(tool_use_id: &str, content: &str) -> ProviderMessage {
        ProviderMessage {
            role: Role::User,
            content: vec![ContentPart::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
                is_error: false,
            }],
        }
    }

    #[test]
    fn sliding_window_preserves_first_and_recent() {
        let sw = SlidingWindowStrategy::new(40);
        let messages = vec![
            user_msg(&"first ".repeat(20)),
            assistant_msg(&"old ".repeat(20)),
            user_msg(&"middle ".repeat(20)),
            assistant_msg(&"recent ".repeat(20)),
            user_msg(&"latest ".repeat(20)),
        ];

        let compacted = sw.compact(messages.clone());
        assert_eq!(compacted[0].content, messages[0].content);
        assert!(compacted.len() < messages.len());
        assert_eq!(
            compacted.last().unwrap().content,
            messages.last().unwrap().content
        );
    }

    #[test]
    fn sliding_window_short_conversation_unchanged() {
        let sw = SlidingWindowStrategy::new(1000);
        let messages = vec![user_msg("hi"), assistant_msg("hello")];
        let compacted = sw.compact(messages.clone());
        assert_eq!(compacted.len(), messages.len());
    }

    #[test]
    fn tool_result_clearing_clears_oldest_first() {
        let strategy = ToolResultClearingStrategy::new(1);
        let messages = vec![
            user_msg("start"),
            tool_use_msg("id1", "search"),
            tool_result_msg("id1", "first result"),
            tool_use_msg("id2", "search"),
            tool_result_msg("id2", "second result"),
        ];

        let compacted = strategy.compact(messages);
        let results: Vec<&str> = compacted
            .iter()
            .flat_map(|m| &m.content)
            .filter_map(|p| match p {
                ContentPart::ToolResult { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect();

        assert_eq!(results[0], "[tool result cleared]");
        assert_eq!(results[1], "second result");
    }

    #[test]
    fn tool_result_clearing_noop_under_keep_limit() {
        let strategy = ToolResultClearingStrategy::new(5);
        let messages = vec![tool_result_msg("id1", "only result")];
        let compacted = strategy.compact(messages.clone());
        assert_eq!(compacted, messages);
    }

    #[test]
    fn structural_summary_preserves_recent_verbatim() {
        let strategy = StructuralSummaryStrategy::new(1);
        let messages = vec![
            user_msg("what's the weather"),
            tool_use_msg("id1", "get_weather"),
            user_msg("thanks, what about tomorrow"),
        ];

        let compacted = strategy.compact(messages.clone());
        assert_eq!(compacted.len(), 2);
        assert_eq!(compacted.last().unwrap(), messages.last().unwrap());
        match &compacted[0].content[0] {
            ContentPart::Text { text } => assert!(text.contains("structural summary")),
            _ => panic!("expected a text summary"),
        }
    }

    #[test]
    fn composite_stops_as_soon_as_under_budget() {
        let messages = vec![
            user_msg("start"),
            tool_use_msg("id1", "search"),
            tool_result_msg("id1", &"x".repeat(400)),
            assistant_msg("done"),
        ];

        let composite = CompositeStrategy::new(
            vec![
                Box::new(ToolResultClearingStrategy::new(0)),
                Box::new(SlidingWindowStrategy::new(1)),
            ],
            10,
        );

        let compacted = composite.compact(messages);
        // ToolResultClearingStrategy alone should bring it under budget,
        // so SlidingWindowStrategy (which would drop the first message)
        // never runs and "start" survives.
        assert!(matches!(
            &compacted[0].content[0],
            ContentPart::Text { text } if text == "start"
        ));
    }

    #[test]
    fn composite_with_no_strategies_returns_input_unchanged() {
        let composite = CompositeStrategy::new(vec![], 0);
        let messages = vec![user_msg("hi")];
        let compacted = composite.compact(messages.clone());
        assert_eq!(compacted, messages);
    }
}
