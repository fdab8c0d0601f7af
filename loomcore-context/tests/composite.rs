//! Integration tests for CompositeStrategy.

use loomcore_context::strategies::{CompositeStrategy, SlidingWindowStrategy, ToolResultClearingStrategy};
use loomcore_turn::context::ContextStrategy;
use loomcore_turn::types::{ContentPart, ProviderMessage, Role};

fn user_msg(text: &str) -> ProviderMessage {
    ProviderMessage {
        role: Role::User,
        content: vec![ContentPart::Text { text: text.into() }],
    }
}

fn tool_use_msg(id: &str) -> ProviderMessage {
    ProviderMessage {
        role: Role::Assistant,
        content: vec![ContentPart::ToolUse {
            id: id.into(),
            name: "my_tool".into(),
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
fn stops_early_once_first_strategy_suffices() {
    let strategy = CompositeStrategy::new(
        vec![
            Box::new(ToolResultClearingStrategy::new(0)),
            Box::new(SlidingWindowStrategy::new(1)),
        ],
        10,
    );

    let messages = vec![
        user_msg("start"),
        tool_use_msg("id1"),
        tool_result_msg("id1", &"x".repeat(400)),
        user_msg("done"),
    ];

    let compacted = strategy.compact(messages);
    // The first strategy alone clears the oversized tool result and brings
    // the estimate under budget, so the first user message survives.
    assert!(matches!(
        &compacted[0].content[0],
        ContentPart::Text { text } if text == "start"
    ));
}

#[test]
fn falls_through_to_later_strategies_when_needed() {
    let strategy = CompositeStrategy::new(
        vec![
            Box::new(ToolResultClearingStrategy::new(10)), // nothing to clear
            Box::new(SlidingWindowStrategy::new(5)),
        ],
        5,
    );

    let messages: Vec<ProviderMessage> = (0..20)
        .map(|i| user_msg(&format!("turn number {i}")))
        .collect();

    let compacted = strategy.compact(messages.clone());
    assert!(compacted.len() < messages.len());
}

#[test]
fn empty_chain_is_a_passthrough() {
    let strategy = CompositeStrategy::new(vec![], 0);
    let messages = vec![user_msg("unchanged")];
    assert_eq!(strategy.compact(messages.clone()), messages);
}
