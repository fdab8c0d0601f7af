//! Classification of a failed tool call.

/// How a failed tool call should steer the Executor's reflect step.
///
/// This is the dispatcher's output, not an error type of its own — a
/// `ToolOutcome` with `error_kind: Some(_)` always carries a `ToolResult`
/// too, so the model still sees what happened.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Likely to succeed on retry with no change (network blip, rate limit).
    Transient,
    /// The tool call was blocked by exec policy before it ran.
    PolicyDenied,
    /// The underlying tool reported an access/permission failure.
    PermissionDenied,
    /// The referenced resource (file, id, endpoint) does not exist.
    NotFound,
    /// The arguments themselves were malformed or failed validation.
    InvalidArgs,
    /// The tool ran successfully but its output failed a declared validator.
    LogicError,
    /// The user cancelled the call or a pending confirmation timed out.
    UserAbort,
    /// The turn's token or cost ceiling was hit mid-call.
    BudgetExhausted,
    /// Not retryable; the turn cannot continue past this.
    Fatal,
}
