//! Integration tests for SlidingWindowStrategy.

use loomcore_context::strategies::SlidingWindowStrategy;
use loomcore_turn::context::ContextStrategy;
use loomcore_turn::types::{ContentPart, ProviderMessage, Role};

fn msg(role: Role, text: &str) -> ProviderMessage {
    ProviderMessage {
        role,
        content: vec![ContentPart::Text { text: text.into() }],
    }
}

#[test]
fn compacts_once_over_threshold() {
    let strategy = SlidingWindowStrategy::new(50);
    let messages = vec![
        msg(Role::User, &"a".repeat(400)),
        msg(Role::Assistant, &"b".repeat(400)),
    ];

    assert!(strategy.should_compact(&messages, 0));
    let compacted = strategy.compact(messages.clone());
    assert!(compacted.len() <= messages.len());
}

#[test]
fn under_threshold_is_a_noop_signal() {
    let strategy = SlidingWindowStrategy::new(100_000);
    let messages = vec![msg(Role::User, "hi")];
    assert!(!strategy.should_compact(&messages, 0));
}

#[test]
fn keeps_first_and_last_message() {
    let strategy = SlidingWindowStrategy::new(30);
    let messages = vec![
        msg(Role::User, "first message here"),
        msg(Role::Assistant, &"filler ".repeat(50)),
        msg(Role::Assistant, &"filler ".repeat(50)),
        msg(Role::User, "latest message here"),
    ];

    let compacted = strategy.compact(messages.clone());
    assert_eq!(compacted.first().unwrap().content, messages[0].content);
    assert_eq!(
        compacted.last().unwrap().content,
        messages.last().unwrap().content
    );
}
