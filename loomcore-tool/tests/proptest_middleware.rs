//! Property-based tests: middleware chain ordering.

use loomcore_tool::middleware::{ToolContext, ToolPipeline};
use loomcore_tool::{ToolDyn, ToolError};
use proptest::prelude::*;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

struct NoOpTool;

impl ToolDyn for NoOpTool {
    fn name(&self) -> &str {
        "noop"
    }
    fn description(&self) -> &str {
        "no-op tool for testing"
    }
    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object"})
    }
    fn call(
        &self,
        _input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>> {
        Box::pin(async move { Ok(json!(null)) })
    }
}

proptest! {
    #[test]
    fn middleware_execution_order(n_middleware in 2usize..6) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let log = Arc::new(Mutex::new(Vec::new()));

            let mut registry = loomcore_tool::ToolRegistry::new();
            registry.register(Arc::new(NoOpTool));
            let mut pipeline = ToolPipeline::new(registry);

            for i in 0..n_middleware {
                let log = log.clone();
                pipeline.add_middleware(loomcore_tool::tool_middleware_fn(move |call, ctx, next| {
                    let log = log.clone();
                    Box::pin(async move {
                        log.lock().unwrap().push(i);
                        next.run(call, ctx).await
                    })
                }));
            }

            let _ = pipeline.execute("1", "noop", json!(null), &ToolContext::default()).await;

            let recorded = log.lock().unwrap().clone();
            assert_eq!(recorded.len(), n_middleware,
                "Expected {} middleware calls, got {}", n_middleware, recorded.len());
            for (idx, &val) in recorded.iter().enumerate() {
                assert_eq!(idx, val,
                    "Middleware {} ran at position {}", val, idx);
            }
        });
    }
}
