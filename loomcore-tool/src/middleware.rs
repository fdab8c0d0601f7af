//! Middleware types for the tool execution pipeline.
//!
//! Middleware wraps tool execution with cross-cutting concerns like
//! schema validation, timeouts, and output truncation.
//!
//! The pattern is identical to axum's `from_fn` — each middleware
//! receives a `Next` that it can call to continue the chain, or
//! skip to short-circuit.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use layer0::id::{ConversationId, TurnId};

use crate::{ToolDyn, ToolError, ToolRegistry};

/// Boxed future used for dyn-compatible middleware.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A tool call in flight through the middleware pipeline.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Unique identifier for this tool call (assigned by the model/executor).
    pub id: String,
    /// Name of the tool being called.
    pub name: String,
    /// JSON input arguments.
    pub input: serde_json::Value,
}

/// Per-call context threaded through the middleware chain.
///
/// Carries the identifiers a middleware might need to log or scope by —
/// not the tool's business input, which lives on [`ToolCall`].
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// The turn this call is executing within, if known.
    pub turn_id: Option<TurnId>,
    /// The conversation this call belongs to, if known.
    pub conversation_id: Option<ConversationId>,
    /// Free-form metadata middleware can stash and read back.
    pub metadata: HashMap<String, String>,
}

/// Middleware that wraps tool execution.
///
/// Each middleware receives the call, context, and a [`Next`] to continue
/// the chain. Middleware can:
/// - Inspect/modify the call before passing it on
/// - Short-circuit by returning without calling `next.run()`
/// - Inspect/modify the result after the tool executes
///
/// Uses boxed futures for dyn-compatibility (heterogeneous middleware
/// collections).
pub trait ToolMiddleware: Send + Sync {
    /// Process a tool call, optionally delegating to the next middleware/tool.
    fn process<'a>(
        &'a self,
        call: &'a ToolCall,
        ctx: &'a ToolContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<serde_json::Value, ToolError>>;
}

/// The remaining middleware chain plus the underlying tool.
///
/// Consumed on call to prevent double-invoke.
pub struct Next<'a> {
    tool: &'a dyn ToolDyn,
    middleware: &'a [Arc<dyn ToolMiddleware>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(tool: &'a dyn ToolDyn, middleware: &'a [Arc<dyn ToolMiddleware>]) -> Self {
        Self { tool, middleware }
    }

    /// Continue the middleware chain, eventually calling the tool.
    pub async fn run(self, call: &'a ToolCall, ctx: &'a ToolContext) -> Result<serde_json::Value, ToolError> {
        if let Some((head, tail)) = self.middleware.split_first() {
            let next = Next::new(self.tool, tail);
            head.process(call, ctx, next).await
        } else {
            self.tool.call(call.input.clone()).await
        }
    }
}

struct MiddlewareFn<F> {
    f: F,
}

impl<F> ToolMiddleware for MiddlewareFn<F>
where
    F: for<'a> Fn(&'a ToolCall, &'a ToolContext, Next<'a>) -> BoxFuture<'a, Result<serde_json::Value, ToolError>>
        + Send
        + Sync,
{
    fn process<'a>(
        &'a self,
        call: &'a ToolCall,
        ctx: &'a ToolContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<serde_json::Value, ToolError>> {
        (self.f)(call, ctx, next)
    }
}

/// Create middleware from a closure (like axum's `from_fn`).
///
/// The closure must return a `Box::pin(async move { ... })` future.
#[must_use]
pub fn tool_middleware_fn<F>(f: F) -> impl ToolMiddleware
where
    F: for<'a> Fn(&'a ToolCall, &'a ToolContext, Next<'a>) -> BoxFuture<'a, Result<serde_json::Value, ToolError>>
        + Send
        + Sync,
{
    MiddlewareFn { f }
}

/// A [`ToolRegistry`] wrapped with a global and per-tool middleware chain.
///
/// Global middleware runs on every call, in registration order, followed by
/// any middleware registered specifically for the called tool.
pub struct ToolPipeline {
    registry: ToolRegistry,
    global: Vec<Arc<dyn ToolMiddleware>>,
    per_tool: HashMap<String, Vec<Arc<dyn ToolMiddleware>>>,
}

impl ToolPipeline {
    /// Wrap a registry with an empty middleware chain.
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            global: Vec::new(),
            per_tool: HashMap::new(),
        }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Register middleware that runs on every tool call.
    pub fn add_middleware(&mut self, mw: impl ToolMiddleware + 'static) -> &mut Self {
        self.global.push(Arc::new(mw));
        self
    }

    /// Register middleware that only runs for calls to `tool_name`.
    pub fn add_tool_middleware(&mut self, tool_name: impl Into<String>, mw: impl ToolMiddleware + 'static) -> &mut Self {
        self.per_tool.entry(tool_name.into()).or_default().push(Arc::new(mw));
        self
    }

    /// Execute a tool call through the middleware chain.
    ///
    /// Global middleware runs first, then any middleware registered for
    /// `name` specifically, then the tool itself.
    pub async fn execute(
        &self,
        call_id: impl Into<String>,
        name: &str,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        let mut chain: Vec<Arc<dyn ToolMiddleware>> = self.global.clone();
        if let Some(per) = self.per_tool.get(name) {
            chain.extend(per.iter().cloned());
        }

        let call = ToolCall {
            id: call_id.into(),
            name: name.to_string(),
            input,
        };
        let next = Next::new(tool.as_ref(), &chain);
        next.run(&call, ctx).await
    }
}
