use loomcore_tool::middleware::{ToolContext, ToolPipeline};
use loomcore_tool::{ToolDyn, ToolError, tool_middleware_fn};
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

struct NoOpTool;

impl ToolDyn for NoOpTool {
    fn name(&self) -> &str {
        "noop"
    }
    fn description(&self) -> &str {
        "does nothing"
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

fn pipeline() -> ToolPipeline {
    let mut registry = loomcore_tool::ToolRegistry::new();
    registry.register(Arc::new(NoOpTool));
    ToolPipeline::new(registry)
}

#[tokio::test]
async fn global_middleware_wraps_all_tools() {
    let counter = Arc::new(AtomicUsize::new(0));
    let counter_clone = counter.clone();

    let mut pipeline = pipeline();
    pipeline.add_middleware(tool_middleware_fn(move |call, ctx, next| {
        let c = counter_clone.clone();
        Box::pin(async move {
            c.fetch_add(1, Ordering::SeqCst);
            next.run(call, ctx).await
        })
    }));

    pipeline
        .execute("1", "noop", json!(null), &ToolContext::default())
        .await
        .unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn per_tool_middleware_only_applies_to_named_tool() {
    let counter = Arc::new(AtomicUsize::new(0));
    let counter_clone = counter.clone();

    let mut pipeline = pipeline();
    pipeline.add_tool_middleware(
        "noop",
        tool_middleware_fn(move |call, ctx, next| {
            let c = counter_clone.clone();
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
                next.run(call, ctx).await
            })
        }),
    );

    pipeline
        .execute("1", "noop", json!(null), &ToolContext::default())
        .await
        .unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn middleware_can_short_circuit() {
    let mut pipeline = pipeline();
    pipeline.add_middleware(tool_middleware_fn(|_call, _ctx, _next| {
        Box::pin(async { Ok(json!({"blocked": true})) })
    }));

    let result = pipeline
        .execute("1", "noop", json!(null), &ToolContext::default())
        .await
        .unwrap();
    assert_eq!(result, json!({"blocked": true}));
}

#[tokio::test]
async fn middleware_ordering_global_before_per_tool() {
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let order1 = order.clone();
    let order2 = order.clone();

    let mut pipeline = pipeline();
    pipeline.add_middleware(tool_middleware_fn(move |call, ctx, next| {
        let o = order1.clone();
        Box::pin(async move {
            o.lock().unwrap().push("global");
            next.run(call, ctx).await
        })
    }));
    pipeline.add_tool_middleware(
        "noop",
        tool_middleware_fn(move |call, ctx, next| {
            let o = order2.clone();
            Box::pin(async move {
                o.lock().unwrap().push("per_tool");
                next.run(call, ctx).await
            })
        }),
    );

    pipeline
        .execute("1", "noop", json!(null), &ToolContext::default())
        .await
        .unwrap();

    let executed = order.lock().unwrap();
    assert_eq!(&*executed, &["global", "per_tool"]);
}

#[tokio::test]
async fn execute_unknown_tool_returns_not_found() {
    let pipeline = pipeline();
    let err = pipeline
        .execute("1", "nonexistent", json!(null), &ToolContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::NotFound(_)));
}
