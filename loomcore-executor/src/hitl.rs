//! Human-in-the-loop suspension points: a clarifying question mid-turn, or
//! confirmation to keep going past the turn cap.

use layer0::id::TurnId;
use std::time::Duration;

/// A question the loop needs a human answer to before it can proceed.
#[derive(Debug, Clone)]
pub struct HitlRequest {
    /// The turn asking.
    pub turn_id: TurnId,
    /// The question text.
    pub question: String,
    /// How long to wait before treating this as an abort.
    pub timeout: Duration,
}

/// Which captured paths the user chose to actually roll back after a
/// failed turn (S2: "rollback files 4 and 5 only, keep 1–3").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackChoice {
    /// Roll back every path this turn captured — the safe default when
    /// there's no transport to ask, or the user doesn't respond in time.
    All,
    /// Roll back only the named paths; everything else is left as the
    /// tools wrote it.
    Paths(Vec<String>),
}

/// The transport-facing side of a suspended turn.
///
/// A `None`/`false` return always means "timed out or the user declined" —
/// there's no separate error path; the loop treats both identically and
/// maps them to an abort.
#[async_trait::async_trait]
pub trait UserChannel: Send + Sync {
    /// Ask a clarifying question and wait for a free-text answer.
    /// Returns `None` on timeout or explicit cancellation.
    async fn ask_clarification(&self, request: HitlRequest) -> Option<String>;

    /// Ask whether to keep running past the turn cap.
    /// Returns `false` on timeout or explicit decline.
    async fn ask_continue(&self, turn_id: &TurnId, turns_so_far: u32) -> bool;

    /// Offer a choice of which captured paths to roll back after a failed
    /// turn. `paths` lists every path this turn's mutating tools touched.
    /// Returns [`RollbackChoice::All`] on timeout, decline, or when there's
    /// no transport to ask.
    async fn offer_rollback(&self, turn_id: &TurnId, paths: &[String]) -> RollbackChoice;
}

/// A [`UserChannel`] for headless callers with no transport wired up —
/// every suspension point resolves to "stop" immediately.
#[derive(Debug, Default)]
pub struct NullUserChannel;

#[async_trait::async_trait]
impl UserChannel for NullUserChannel {
    async fn ask_clarification(&self, _request: HitlRequest) -> Option<String> {
        None
    }

    async fn ask_continue(&self, _turn_id: &TurnId, _turns_so_far: u32) -> bool {
        false
    }

    async fn offer_rollback(&self, _turn_id: &TurnId, _paths: &[String]) -> RollbackChoice {
        RollbackChoice::All
    }
}
