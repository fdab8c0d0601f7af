//! Middleware example: logging and an auth check on tool calls.
//!
//! Run with: cargo run --example middleware -p loomcore-tool

use loomcore_tool::middleware::{ToolContext, ToolPipeline};
use loomcore_tool::{ToolDyn, ToolError, ToolRegistry, tool_middleware_fn};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

struct CalculateTool;

impl ToolDyn for CalculateTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Perform basic arithmetic on two numbers"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["left", "right", "operator"],
            "properties": {
                "left": {"type": "number"},
                "right": {"type": "number"},
                "operator": {"type": "string"}
            }
        })
    }

    fn call(
        &self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let left = input["left"].as_f64().unwrap_or_default();
            let right = input["right"].as_f64().unwrap_or_default();
            let operator = input["operator"].as_str().unwrap_or_default();
            let result = match operator {
                "add" => left + right,
                "sub" => left - right,
                "mul" => left * right,
                "div" => left / right,
                other => {
                    return Err(ToolError::InvalidInput(format!("unsupported operator: {other}")));
                }
            };
            Ok(serde_json::json!({"result": result}))
        })
    }
}

#[tokio::main]
async fn main() {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CalculateTool));
    let mut pipeline = ToolPipeline::new(registry);

    // Global logging middleware — runs on every tool call.
    pipeline.add_middleware(tool_middleware_fn(|call, ctx, next| {
        Box::pin(async move {
            println!("[log] >>> calling tool '{}' with input: {}", call.name, call.input);
            let result = next.run(call, ctx).await;
            match &result {
                Ok(output) => println!("[log] <<< tool '{}' succeeded: {output}", call.name),
                Err(e) => println!("[log] <<< tool '{}' failed: {e}", call.name),
            }
            result
        })
    }));

    // Per-tool auth middleware on "calculate" — rejects calls missing an "auth" key.
    pipeline.add_tool_middleware(
        "calculate",
        tool_middleware_fn(|call, ctx, next| {
            Box::pin(async move {
                if call.input.get("auth").is_none() {
                    return Err(ToolError::InvalidInput("missing 'auth' key in input".to_string()));
                }
                println!("[auth] validated auth for tool '{}'", call.name);
                next.run(call, ctx).await
            })
        }),
    );

    let ctx = ToolContext::default();

    println!("=== Call with auth ===");
    let input_with_auth = serde_json::json!({
        "left": 10.0,
        "right": 3.0,
        "operator": "add",
        "auth": "token-abc123"
    });
    match pipeline.execute("1", "calculate", input_with_auth, &ctx).await {
        Ok(output) => println!("Result: {output}"),
        Err(e) => println!("Error: {e}"),
    }

    println!("\n=== Call without auth ===");
    let input_no_auth = serde_json::json!({
        "left": 10.0,
        "right": 3.0,
        "operator": "add"
    });
    match pipeline.execute("2", "calculate", input_no_auth, &ctx).await {
        Ok(output) => println!("Result: {output}"),
        Err(e) => println!("Error (expected): {e}"),
    }
}
