//! Wiring an `Executor` end to end with a mock provider and one tool.
//!
//! No network access or API key required — this exercises the RVR-B loop
//! against a scripted `Provider` so the example runs anywhere.
//!
//! Run with:
//!
//! ```sh
//! cargo run --example basic_agent -p loomcore --features executor
//! ```

use std::collections::{HashSet, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use layer0::turn::TriggerType;
use loomcore::prelude::*;
use loomcore_context::{ContextBuilder, ContextConfig, StablePrefix};
use loomcore_tool::{ToolDyn, ToolError, ToolRegistry};
use loomcore_turn::types::{ContentPart, ProviderRequest, ProviderResponse, StopReason, TokenUsage};

/// A provider that plays back a fixed script of responses, in order.
///
/// Real callers implement `Provider` against Anthropic, OpenAI, or any
/// other backend; this one exists purely to make the example runnable
/// without credentials.
struct ScriptedProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }
}

impl Provider for ScriptedProvider {
    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::RequestFailed("script exhausted".into()))
    }
}

fn text(body: &str, stop_reason: StopReason) -> ProviderResponse {
    ProviderResponse {
        content: vec![ContentPart::Text { text: body.to_string() }],
        stop_reason,
        usage: TokenUsage::default(),
        model: "scripted".into(),
        cost: None,
        truncated: None,
    }
}

fn tool_call(id: &str, name: &str, input: serde_json::Value) -> ProviderResponse {
    ProviderResponse {
        content: vec![ContentPart::ToolUse { id: id.into(), name: name.into(), input }],
        stop_reason: StopReason::ToolUse,
        usage: TokenUsage::default(),
        model: "scripted".into(),
        cost: None,
        truncated: None,
    }
}

struct AddTool;

impl ToolDyn for AddTool {
    fn name(&self) -> &str {
        "add"
    }

    fn description(&self) -> &str {
        "Add two numbers given as {\"a\": _, \"b\": _}"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    fn call(
        &self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>>
    {
        Box::pin(async move {
            let a = input["a"].as_f64().unwrap_or(0.0);
            let b = input["b"].as_f64().unwrap_or(0.0);
            Ok(serde_json::json!({ "result": a + b }))
        })
    }
}

#[tokio::main]
async fn main() {
    // The intent analyzer gets its own provider call, scripted separately
    // from the main loop's. A real deployment points both at the same
    // backend; splitting them here just makes the script order explicit.
    let intent_provider = ScriptedProvider::new(vec![text(
        r#"{"complexity":"simple","selected_skills":[],"wants_to_stop":false,"planning_depth":"none"}"#,
        StopReason::EndTurn,
    )]);
    let intent = IntentAnalyzer::new(intent_provider, None, vec![], HashSet::new());

    let exec_provider = ScriptedProvider::new(vec![
        tool_call("call_1", "add", serde_json::json!({"a": 3, "b": 4})),
        text("3 + 4 = 7", StopReason::EndTurn),
    ]);

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(AddTool));
    let dispatcher = ToolDispatcher::new(registry, PolicyEngine::allow_all(), []);

    let root = std::env::temp_dir().join("loomcore-basic-agent-example");

    let executor = Executor::new(
        exec_provider,
        intent,
        dispatcher,
        HookRegistry::new(),
        SnapshotManager::new(&root),
        ContextBuilder::new(ContextConfig::default(), vec![]),
        StablePrefix::new(),
        Arc::new(loomcore_executor::NullStateReader),
        Arc::new(loomcore_executor::NullUserChannel),
        Arc::new(loomcore_executor::NullEventSink),
        ExecutorConfig::default(),
        Arc::new(loomcore_executor::SystemClock),
        Arc::new(loomcore_executor::CounterIdSource::new()),
    );

    let output = executor
        .execute(TurnInput::new(Content::text("What is 3 + 4?"), TriggerType::User))
        .await
        .expect("turn should complete");

    println!("Exit reason: {:?}", output.exit_reason);
    println!("Response:    {}", output.message.as_text().unwrap_or(""));
    println!("Tools used:  {}", output.metadata.tools_called.len());
}
