//! Ties policy, snapshot capture, tool invocation, and classification
//! together into a single dispatch call.

use std::collections::HashMap;

use layer0::id::TurnId;
use loomcore_snapshot::{RollbackScope, SnapshotError, SnapshotHandle, SnapshotManager};
use loomcore_tool::{ToolError, ToolRegistry};
use tokio::sync::Mutex;

use crate::error::ErrorKind;
use crate::log::OperationLog;
use crate::policy::{PolicyDecision, PolicyEngine};

/// A tool invocation requested by the model, as pulled off its message.
#[derive(Debug, Clone)]
pub struct ToolUse {
    /// The provider-assigned id for this call, echoed back in the result.
    pub id: String,
    /// Name of the tool being invoked.
    pub name: String,
    /// Arguments to the call.
    pub input: serde_json::Value,
}

/// What goes back to the model for a dispatched [`ToolUse`].
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// Echoes the originating [`ToolUse::id`].
    pub tool_use_id: String,
    /// The tool's output, or a description of why it failed.
    pub output: serde_json::Value,
    /// Whether this result represents a failure.
    pub is_error: bool,
}

/// A dispatched call's result plus the Executor-facing classification of
/// what went wrong, if anything.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    /// The result to hand back to the model.
    pub result: ToolResult,
    /// `None` on success; `Some(_)` steers the reflect step on failure.
    pub error_kind: Option<ErrorKind>,
    /// The operation log entry id this call was recorded under.
    pub op_id: u64,
}

/// Per-call context a dispatch needs beyond the tool name and input.
pub struct DispatchContext<'a> {
    /// The turn this call happens within.
    pub turn_id: TurnId,
    /// Snapshot manager plus the handle for this turn's snapshot, if
    /// mutating tools should be protected. `None` skips capture entirely
    /// (for tools known never to touch the filesystem).
    pub snapshot: Option<(&'a SnapshotManager, &'a SnapshotHandle)>,
}

/// Extracts a candidate filesystem path from a tool call's arguments.
///
/// Mutating tools conventionally take their target path under one of a
/// handful of common argument names; this is a heuristic, not a schema.
fn extract_path(input: &serde_json::Value) -> Option<std::path::PathBuf> {
    for key in ["path", "file_path", "filename", "target_path"] {
        if let Some(s) = input.get(key).and_then(|v| v.as_str()) {
            return Some(std::path::PathBuf::from(s));
        }
    }
    None
}

/// Classifies a failed pre-capture so a missing or unreadable source file
/// steers the reflect step the same way a tool reporting the same problem
/// would, instead of always looking fatal.
fn classify_capture_failure(err: &SnapshotError) -> ErrorKind {
    match err {
        SnapshotError::CaptureFailed { io_kind, .. } => match io_kind {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::Fatal,
        },
        _ => ErrorKind::Fatal,
    }
}

/// How many times a tool may time out before escalating to [`ErrorKind::Fatal`].
const DEFAULT_MAX_TIMEOUT_RETRIES: u32 = 2;

/// Dispatches tool calls: policy check, snapshot capture, invocation,
/// classification, and logging, in that order.
pub struct ToolDispatcher {
    registry: ToolRegistry,
    policy: PolicyEngine,
    mutating_tools: std::collections::HashSet<String>,
    max_timeout_retries: u32,
    timeout_counts: Mutex<HashMap<String, u32>>,
    log: Mutex<OperationLog>,
}

impl ToolDispatcher {
    /// Build a dispatcher around a populated registry and policy engine.
    ///
    /// `mutating_tools` names the tools whose calls should be preceded by a
    /// snapshot capture of any path-like argument they're given.
    pub fn new(
        registry: ToolRegistry,
        policy: PolicyEngine,
        mutating_tools: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            registry,
            policy,
            mutating_tools: mutating_tools.into_iter().collect(),
            max_timeout_retries: DEFAULT_MAX_TIMEOUT_RETRIES,
            timeout_counts: Mutex::new(HashMap::new()),
            log: Mutex::new(OperationLog::new()),
        }
    }

    /// Override the number of per-tool timeouts tolerated before a
    /// timeout escalates from [`ErrorKind::Transient`] to [`ErrorKind::Fatal`].
    pub fn with_max_timeout_retries(mut self, max: u32) -> Self {
        self.max_timeout_retries = max;
        self
    }

    /// The registry this dispatcher wraps.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Every recorded operation for this dispatcher's lifetime.
    pub async fn operation_log(&self) -> tokio::sync::MutexGuard<'_, OperationLog> {
        self.log.lock().await
    }

    /// Validate policy, capture a pre-image if the tool mutates state,
    /// invoke it, classify the outcome, and append it to the operation log.
    pub async fn dispatch(&self, call: ToolUse, ctx: &DispatchContext<'_>) -> ToolOutcome {
        let decision = self.policy.evaluate(&call.name, &call.input);
        if decision == PolicyDecision::Deny {
            return self.record_denied(call).await;
        }

        if self.mutating_tools.contains(&call.name) {
            if let (Some((manager, handle)), Some(path)) = (ctx.snapshot, extract_path(&call.input)) {
                let op_id = self.log.lock().await.peek_next_op_id();
                if let Err(e) = manager.capture(handle, &path, op_id).await {
                    let kind = classify_capture_failure(&e);
                    return self.record_failure(call, kind, e.to_string()).await;
                }
            }
        }

        let Some(tool) = self.registry.get(&call.name) else {
            return self.record_failure(call, ErrorKind::NotFound, format!("tool not found: {}", call.name)).await;
        };

        match tool.call(call.input.clone()).await {
            Ok(output) => self.record_success(call, output).await,
            Err(err) => {
                let kind = self.classify(&call.name, &err).await;
                self.record_failure(call, kind, err.to_string()).await
            }
        }
    }

    /// Restore the snapshot's pre-images for everything captured since
    /// `since_op_id`, undoing the side effects of a failed backtrack step.
    pub async fn rollback_since(
        &self,
        manager: &SnapshotManager,
        handle: &SnapshotHandle,
        since_op_id: u64,
    ) -> Result<loomcore_snapshot::RollbackReport, loomcore_snapshot::SnapshotError> {
        manager.rollback(handle, RollbackScope::BeforeOp(since_op_id)).await
    }

    async fn classify(&self, tool_name: &str, err: &ToolError) -> ErrorKind {
        match err {
            ToolError::NotFound(_) => ErrorKind::NotFound,
            ToolError::InvalidInput(_) => ErrorKind::InvalidArgs,
            ToolError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            ToolError::ExecutionFailed(msg) if msg.to_lowercase().contains("timed out") || msg.to_lowercase().contains("timeout") => {
                self.classify_timeout(tool_name).await
            }
            ToolError::ExecutionFailed(_) => ErrorKind::Transient,
            ToolError::Other(_) => ErrorKind::Transient,
        }
    }

    async fn classify_timeout(&self, tool_name: &str) -> ErrorKind {
        let mut counts = self.timeout_counts.lock().await;
        let count = counts.entry(tool_name.to_string()).or_insert(0);
        *count += 1;
        if *count > self.max_timeout_retries {
            ErrorKind::Fatal
        } else {
            ErrorKind::Transient
        }
    }

    async fn record_success(&self, call: ToolUse, output: serde_json::Value) -> ToolOutcome {
        let op_id = self.log.lock().await.append(call.name, call.input, false, None);
        ToolOutcome {
            result: ToolResult { tool_use_id: call.id, output, is_error: false },
            error_kind: None,
            op_id,
        }
    }

    async fn record_failure(&self, call: ToolUse, kind: ErrorKind, message: String) -> ToolOutcome {
        let op_id = self.log.lock().await.append(call.name, call.input, true, Some(kind));
        ToolOutcome {
            result: ToolResult {
                tool_use_id: call.id,
                output: serde_json::json!({"error": message}),
                is_error: true,
            },
            error_kind: Some(kind),
            op_id,
        }
    }

    async fn record_denied(&self, call: ToolUse) -> ToolOutcome {
        let message = format!("call to {} denied by exec policy", call.name);
        self.record_failure(call, ErrorKind::PolicyDenied, message).await
    }
}
