//! Injected time, id generation, and cooperative cancellation — the three
//! pieces of ambient state the loop needs but mustn't read directly, so
//! tests can pin them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Wall-clock source, swappable for a fixed sequence in tests.
pub trait Clock: Send + Sync {
    /// Current time as Unix milliseconds.
    fn now_millis(&self) -> u64;
}

/// [`Clock`] backed by [`std::time::SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Generates the ids the executor hands to `TurnId`/`SnapshotId`, swappable
/// for a deterministic counter in tests (P8: determinism via replay).
pub trait IdSource: Send + Sync {
    /// Produce the next id as a lowercase hex string.
    fn next_id(&self) -> String;
}

/// [`IdSource`] backed by a process-wide atomic counter. Purely sequential —
/// no time or randomness involved, so a fresh counter started at the same
/// value reproduces the same id sequence run over run.
#[derive(Debug, Default)]
pub struct CounterIdSource {
    counter: AtomicU64,
}

impl CounterIdSource {
    /// A counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdSource for CounterIdSource {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{n:012x}")
    }
}

/// Cooperative cancellation flag, checked at every suspension point in the
/// loop (top of each iteration, before a HITL wait). Setting it never
/// interrupts in-flight work directly — the loop notices on its own next
/// check, within one iteration's bound.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that starts uncancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
