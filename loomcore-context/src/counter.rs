//! Pluggable token estimation.
//!
//! A real tokenizer is a provider-specific dependency this crate doesn't
//! want to pull in; estimates within 10% of the real count are good enough
//! to drive budget decisions, per a cheap chars-per-token heuristic.

use loomcore_turn::types::{ContentPart, ProviderMessage};

/// Estimates token counts for a slice of messages.
///
/// Implementations don't need to be exact — callers treat the result as an
/// estimate within roughly 10% of whatever the provider's real tokenizer
/// would report.
pub trait TokenEstimator: Send + Sync {
    /// Estimate the total token count across all messages.
    fn estimate_messages(&self, messages: &[ProviderMessage]) -> usize;

    /// Estimate the token count of a single message.
    fn estimate_message(&self, message: &ProviderMessage) -> usize;
}

/// Default chars-per-token heuristic, matching the estimate `NoCompaction`
/// uses in `loomcore-turn`.
#[derive(Debug, Clone)]
pub struct TokenCounter {
    chars_per_token: usize,
    per_message_overhead: usize,
}

impl TokenCounter {
    /// Create a counter with the default 4-chars-per-token ratio.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a counter with a custom chars-per-token ratio.
    pub fn with_ratio(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
            ..Self::default()
        }
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self {
            chars_per_token: 4,
            per_message_overhead: 4,
        }
    }
}

impl TokenEstimator for TokenCounter {
    fn estimate_messages(&self, messages: &[ProviderMessage]) -> usize {
        messages.iter().map(|m| self.estimate_message(m)).sum()
    }

    fn estimate_message(&self, message: &ProviderMessage) -> usize {
        let content_tokens: usize = message
            .content
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => text.len() / self.chars_per_token,
                ContentPart::ToolUse { input, .. } => {
                    input.to_string().len() / self.chars_per_token
                }
                ContentPart::ToolResult { content, .. } => content.len() / self.chars_per_token,
                ContentPart::Image { .. } => 1000,
            })
            .sum();
        content_tokens + self.per_message_overhead
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomcore_turn::types::Role;

    fn text_message(role: Role, text: &str) -> ProviderMessage {
        ProviderMessage {
            role,
            content: vec![ContentPart::Text {
                text: text.to_string(),
            }],
        }
    }

    #[test]
    fn estimate_text_scales_with_length() {
        let counter = TokenCounter::new();
        let short = counter.estimate_message(&text_message(Role::User, "hi"));
        let long = counter.estimate_message(&text_message(Role::User, &"a".repeat(400)));
        assert!(long > short);
    }

    #[test]
    fn estimate_messages_is_monotonic_as_messages_are_added() {
        let counter = TokenCounter::new();
        let messages: Vec<_> = (0..10)
            .map(|i| text_message(Role::User, &format!("message number {i}")))
            .collect();

        let mut prev = 0;
        for i in 1..=messages.len() {
            let count = counter.estimate_messages(&messages[..i]);
            assert!(count >= prev);
            prev = count;
        }
    }

    #[test]
    fn custom_ratio_changes_estimate() {
        let fine = TokenCounter::with_ratio(1);
        let coarse = TokenCounter::with_ratio(8);
        let msg = text_message(Role::User, &"a".repeat(400));
        assert!(fine.estimate_message(&msg) > coarse.estimate_message(&msg));
    }

    #[test]
    fn image_parts_use_flat_estimate() {
        let counter = TokenCounter::new();
        let msg = ProviderMessage {
            role: Role::User,
            content: vec![ContentPart::Image {
                source: loomcore_turn::types::ImageSource::Url {
                    url: "https://example.com/x.png".into(),
                },
                media_type: "image/png".into(),
            }],
        };
        assert_eq!(counter.estimate_message(&msg), 1004);
    }
}
