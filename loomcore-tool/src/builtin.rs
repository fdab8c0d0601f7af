//! Built-in middleware implementations.

use std::collections::HashMap;
use std::time::Duration;

use crate::ToolRegistry;
use crate::ToolError;
use crate::middleware::{BoxFuture, Next, ToolCall, ToolContext, ToolMiddleware};

/// Middleware that truncates string values in a tool's output to a maximum
/// character length.
///
/// Long tool outputs can consume excessive tokens in the context window.
/// Recurses into JSON objects and arrays so a single oversized string field
/// doesn't blow the budget for an otherwise small result.
pub struct OutputFormatter {
    max_chars: usize,
}

impl OutputFormatter {
    /// Create a new output formatter with the given character limit.
    #[must_use]
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl ToolMiddleware for OutputFormatter {
    fn process<'a>(
        &'a self,
        call: &'a ToolCall,
        ctx: &'a ToolContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<serde_json::Value, ToolError>> {
        Box::pin(async move {
            let output = next.run(call, ctx).await?;
            Ok(truncate_value(output, self.max_chars))
        })
    }
}

fn truncate_value(value: serde_json::Value, max_chars: usize) -> serde_json::Value {
    match value {
        serde_json::Value::String(text) if text.len() > max_chars => {
            // Find the nearest char boundary at or before max_chars to avoid
            // slicing in the middle of a multi-byte UTF-8 character. This is
            // a stable polyfill for str::floor_char_boundary.
            let mut boundary = max_chars;
            while boundary > 0 && !text.is_char_boundary(boundary) {
                boundary -= 1;
            }
            serde_json::Value::String(format!(
                "{}... [truncated, {} chars total]",
                &text[..boundary],
                text.len()
            ))
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, truncate_value(v, max_chars)))
                .collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(|v| truncate_value(v, max_chars)).collect())
        }
        other => other,
    }
}

/// Middleware that validates tool call input against the tool's JSON Schema.
///
/// Performs lightweight structural validation: checks that the input is an
/// object, required fields are present, and property types match the schema.
/// This catches obvious input errors before the tool executes, without
/// depending on a full JSON Schema validation library.
pub struct SchemaValidator {
    schemas: HashMap<String, serde_json::Value>,
}

impl SchemaValidator {
    /// Create a new schema validator from the current tool registry.
    ///
    /// Snapshots all tool schemas at construction time. Tools registered
    /// after this call will not be validated.
    #[must_use]
    pub fn new(registry: &ToolRegistry) -> Self {
        let schemas = registry
            .iter()
            .map(|tool| (tool.name().to_string(), tool.input_schema()))
            .collect();
        Self { schemas }
    }
}

impl ToolMiddleware for SchemaValidator {
    fn process<'a>(
        &'a self,
        call: &'a ToolCall,
        ctx: &'a ToolContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<serde_json::Value, ToolError>> {
        Box::pin(async move {
            if let Some(schema) = self.schemas.get(&call.name) {
                validate_input(&call.input, schema)?;
            }
            next.run(call, ctx).await
        })
    }
}

/// Validate a JSON input value against a JSON Schema object.
///
/// Performs lightweight structural checks:
/// - Input must be an object (if schema says `"type": "object"`)
/// - All `"required"` fields must be present
/// - Property types must match the schema's `"type"` declarations
fn validate_input(input: &serde_json::Value, schema: &serde_json::Value) -> Result<(), ToolError> {
    let schema_obj = match schema.as_object() {
        Some(obj) => obj,
        None => return Ok(()),
    };

    if let Some(serde_json::Value::String(ty)) = schema_obj.get("type")
        && ty == "object"
        && !input.is_object()
    {
        return Err(ToolError::InvalidInput("expected object input".to_string()));
    }

    let input_obj = match input.as_object() {
        Some(obj) => obj,
        None => return Ok(()),
    };

    if let Some(serde_json::Value::Array(required)) = schema_obj.get("required") {
        for field in required {
            if let Some(field_name) = field.as_str()
                && !input_obj.contains_key(field_name)
            {
                return Err(ToolError::InvalidInput(format!(
                    "missing required field: {field_name}"
                )));
            }
        }
    }

    if let Some(serde_json::Value::Object(properties)) = schema_obj.get("properties") {
        for (field_name, prop_schema) in properties {
            if let Some(value) = input_obj.get(field_name)
                && let Some(serde_json::Value::String(expected_type)) = prop_schema.get("type")
                && !json_type_matches(value, expected_type)
            {
                return Err(ToolError::InvalidInput(format!(
                    "field '{field_name}' expected type '{expected_type}', got {}",
                    json_type_name(value)
                )));
            }
        }
    }

    Ok(())
}

fn json_type_matches(value: &serde_json::Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Middleware that enforces a timeout on tool execution.
///
/// Wraps the downstream tool call in [`tokio::time::timeout`]. If the tool
/// does not complete within the configured duration, returns
/// `ToolError::ExecutionFailed` with a descriptive message so the model
/// can adapt.
///
/// Per-tool overrides allow different timeouts for tools with known
/// different latency profiles (e.g., web scraping vs. simple computation).
pub struct TimeoutMiddleware {
    default_timeout: Duration,
    per_tool: HashMap<String, Duration>,
}

impl TimeoutMiddleware {
    /// Create a new timeout middleware with the given default timeout.
    #[must_use]
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            default_timeout,
            per_tool: HashMap::new(),
        }
    }

    /// Set a per-tool timeout override.
    #[must_use]
    pub fn with_tool_timeout(mut self, tool_name: impl Into<String>, timeout: Duration) -> Self {
        self.per_tool.insert(tool_name.into(), timeout);
        self
    }
}

impl ToolMiddleware for TimeoutMiddleware {
    fn process<'a>(
        &'a self,
        call: &'a ToolCall,
        ctx: &'a ToolContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<serde_json::Value, ToolError>> {
        Box::pin(async move {
            let timeout = self.per_tool.get(&call.name).unwrap_or(&self.default_timeout);
            match tokio::time::timeout(*timeout, next.run(call, ctx)).await {
                Ok(result) => result,
                Err(_elapsed) => Err(ToolError::ExecutionFailed(format!(
                    "tool '{}' timed out after {:.1}s",
                    call.name,
                    timeout.as_secs_f64()
                ))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolDyn;
    use serde_json::json;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;

    struct EchoTool;

    impl ToolDyn for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes input"
        }
        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object", "required": ["text"], "properties": {"text": {"type": "string"}}})
        }
        fn call(
            &self,
            input: serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>> {
            Box::pin(async move { Ok(input) })
        }
    }

    fn call(input: serde_json::Value) -> ToolCall {
        ToolCall { id: "1".into(), name: "echo".into(), input }
    }

    #[test]
    fn schema_validator_rejects_missing_required_field() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let validator = SchemaValidator::new(&registry);
        let err = validate_input(&json!({}), validator.schemas.get("echo").unwrap()).unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[test]
    fn schema_validator_rejects_wrong_type() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let validator = SchemaValidator::new(&registry);
        let err = validate_input(&json!({"text": 5}), validator.schemas.get("echo").unwrap()).unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[test]
    fn schema_validator_accepts_valid_input() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let validator = SchemaValidator::new(&registry);
        assert!(validate_input(&json!({"text": "hi"}), validator.schemas.get("echo").unwrap()).is_ok());
    }

    #[test]
    fn output_formatter_truncates_long_strings() {
        let long = "x".repeat(100);
        let truncated = truncate_value(json!(long), 10);
        let text = truncated.as_str().unwrap();
        assert!(text.starts_with("xxxxxxxxxx"));
        assert!(text.contains("truncated"));
    }

    #[test]
    fn output_formatter_leaves_short_strings_alone() {
        assert_eq!(truncate_value(json!("short"), 100), json!("short"));
    }

    #[test]
    fn output_formatter_recurses_into_nested_objects() {
        let long = "x".repeat(50);
        let nested = json!({"outer": {"inner": long}});
        let truncated = truncate_value(nested, 10);
        let inner = &truncated["outer"]["inner"];
        assert!(inner.as_str().unwrap().contains("truncated"));
    }

    #[tokio::test]
    async fn timeout_middleware_fails_slow_tool() {
        struct SlowTool;
        impl ToolDyn for SlowTool {
            fn name(&self) -> &str {
                "slow"
            }
            fn description(&self) -> &str {
                "sleeps"
            }
            fn input_schema(&self) -> serde_json::Value {
                json!({})
            }
            fn call(
                &self,
                _input: serde_json::Value,
            ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>> {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(json!(null))
                })
            }
        }

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SlowTool));
        let tool = registry.get("slow").unwrap();
        let middleware: Vec<Arc<dyn ToolMiddleware>> =
            vec![Arc::new(TimeoutMiddleware::new(Duration::from_millis(1)))];
        let next = Next::new(tool.as_ref(), &middleware);
        let result = next
            .run(&call(json!(null)), &ToolContext::default())
            .await;
        assert!(matches!(result, Err(ToolError::ExecutionFailed(_))));
    }
}
