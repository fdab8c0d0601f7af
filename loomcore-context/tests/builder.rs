//! Integration tests for the three-phase ContextBuilder.

use layer0::id::TurnId;
use layer0::lifecycle::CompactionEvent;
use loomcore_context::strategies::{SlidingWindowStrategy, ToolResultClearingStrategy};
use loomcore_context::{ColorLevel, ContextBuilder, ContextConfig, PrefixSection, StablePrefix};
use loomcore_turn::context::ContextStrategy;
use loomcore_turn::types::{ContentPart, ProviderMessage, Role};

fn msg(text: &str) -> ProviderMessage {
    ProviderMessage {
        role: Role::User,
        content: vec![ContentPart::Text { text: text.into() }],
    }
}

fn prefix_with(content: &str) -> StablePrefix {
    let mut prefix = StablePrefix::new();
    prefix.add_section(PrefixSection {
        label: "System".into(),
        content: content.into(),
        priority: 0,
    });
    prefix
}

#[test]
fn phase_order_is_prefix_then_history_then_live_turn() {
    let builder = ContextBuilder::new(ContextConfig::default(), vec![]);
    let result = builder.build(
        TurnId::new("t1"),
        &prefix_with("you are an assistant"),
        vec![msg("history turn")],
        vec![msg("live turn")],
    );

    assert_eq!(result.messages.len(), 3);
    assert_eq!(result.messages[0].role, Role::System);
    assert_eq!(result.messages[1].content, msg("history turn").content);
    assert_eq!(result.messages[2].content, msg("live turn").content);
}

#[test]
fn live_turn_survives_heavy_compaction() {
    let strategies: Vec<Box<dyn ContextStrategy>> = vec![
        Box::new(ToolResultClearingStrategy::new(0)),
        Box::new(SlidingWindowStrategy::new(1)),
    ];
    let config = ContextConfig {
        token_budget_total: 30,
        context_reserve_for_output: 0,
        ..Default::default()
    };
    let builder = ContextBuilder::new(config, strategies);

    let history: Vec<ProviderMessage> = (0..50).map(|i| msg(&format!("turn {i}"))).collect();
    let live_turn = vec![msg("the actual question")];

    let result = builder.build(TurnId::new("t1"), &prefix_with("system"), history, live_turn.clone());

    assert_eq!(result.messages.last().unwrap().content, live_turn[0].content);
    match result.trimming {
        Some(CompactionEvent::CompactionComplete { tokens_freed, .. }) => {
            assert!(tokens_freed > 0);
        }
        other => panic!("expected a CompactionComplete event, got {other:?}"),
    }
}

#[test]
fn token_budget_invariant_estimated_tokens_under_budget() {
    let strategies: Vec<Box<dyn ContextStrategy>> = vec![Box::new(SlidingWindowStrategy::new(1))];
    let config = ContextConfig {
        token_budget_total: 100,
        context_reserve_for_output: 20,
        ..Default::default()
    };
    let builder = ContextBuilder::new(config, strategies);

    let history: Vec<ProviderMessage> = (0..30).map(|i| msg(&format!("turn {i} filler text"))).collect();
    let result = builder.build(
        TurnId::new("t1"),
        &prefix_with("system"),
        history,
        vec![msg("short live turn")],
    );

    // Phase 3 (live turn) is never dropped, so a pathological case can still
    // exceed budget once prefix + live turn alone are large; here they're
    // small, so the invariant should hold after compaction.
    assert!(result.current_tokens <= result.budget_tokens || result.color_level == ColorLevel::Red);
}

#[test]
fn pressure_event_escalates_color_with_usage() {
    let builder = ContextBuilder::new(
        ContextConfig {
            token_budget_total: 1000,
            context_reserve_for_output: 0,
            ..Default::default()
        },
        vec![],
    );

    let low = builder.build(TurnId::new("t1"), &prefix_with("s"), vec![], vec![msg("hi")]);
    assert_eq!(low.color_level, ColorLevel::Green);
}
