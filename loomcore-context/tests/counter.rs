//! Integration tests for TokenCounter.

use loomcore_context::{TokenCounter, TokenEstimator};
use loomcore_turn::types::{ContentPart, ImageSource, ProviderMessage, Role};

fn text_message(role: Role, text: &str) -> ProviderMessage {
    ProviderMessage {
        role,
        content: vec![ContentPart::Text { text: text.to_string() }],
    }
}

fn tool_use_message(id: &str, name: &str, input: serde_json::Value) -> ProviderMessage {
    ProviderMessage {
        role: Role::Assistant,
        content: vec![ContentPart::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input,
        }],
    }
}

fn tool_result_message(tool_use_id: &str, text: &str) -> ProviderMessage {
    ProviderMessage {
        role: Role::User,
        content: vec![ContentPart::ToolResult {
            tool_use_id: tool_use_id.to_string(),
            content: text.to_string(),
            is_error: false,
        }],
    }
}

fn image_message() -> ProviderMessage {
    ProviderMessage {
        role: Role::User,
        content: vec![ContentPart::Image {
            source: ImageSource::Url {
                url: "https://example.com/x.png".into(),
            },
            media_type: "image/png".into(),
        }],
    }
}

#[test]
fn estimate_text_returns_reasonable_values() {
    let counter = TokenCounter::new();
    let msg = text_message(Role::User, "Hello, world!");
    assert!(counter.estimate_message(&msg) > 0);
}

#[test]
fn estimate_tool_use_accounts_for_input_size() {
    let counter = TokenCounter::new();
    let small = tool_use_message("id1", "tool", serde_json::json!({}));
    let large = tool_use_message(
        "id1",
        "tool",
        serde_json::json!({"payload": "a".repeat(1000)}),
    );
    assert!(counter.estimate_message(&large) > counter.estimate_message(&small));
}

#[test]
fn estimate_tool_result_scales_with_content() {
    let counter = TokenCounter::new();
    let short = tool_result_message("id1", "ok");
    let long = tool_result_message("id1", &"result ".repeat(200));
    assert!(counter.estimate_message(&long) > counter.estimate_message(&short));
}

#[test]
fn estimate_image_uses_flat_cost() {
    let counter = TokenCounter::new();
    assert_eq!(counter.estimate_message(&image_message()), 1004);
}

#[test]
fn estimate_messages_sums_across_conversation() {
    let counter = TokenCounter::new();
    let messages = vec![
        text_message(Role::User, "hello"),
        text_message(Role::Assistant, "hi there"),
    ];
    let total = counter.estimate_messages(&messages);
    let sum: usize = messages.iter().map(|m| counter.estimate_message(m)).sum();
    assert_eq!(total, sum);
}
