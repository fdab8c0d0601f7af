//! Conversation-level serialization above the Executor: one active turn per
//! conversation at a time, a new request on a busy conversation either
//! waits or is rejected per policy.
//!
//! This does not implement `layer0::Turn` itself — `execute_for` needs an
//! extra `ConversationId` parameter that the trait's fixed one-method
//! signature has no room for.

use std::collections::HashMap;
use std::sync::Arc;

use layer0::id::ConversationId;
use layer0::turn::{Turn, TurnInput, TurnOutput};
use layer0::error::TurnError;
use tokio::sync::Mutex as AsyncMutex;

/// What to do when a request targets a conversation with an already
/// in-flight turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyPolicy {
    /// Wait for the in-flight turn to finish, then run.
    Queue,
    /// Reject immediately with a non-retryable error.
    AbortNew,
}

/// Serializes turns per conversation over an inner [`Turn`] implementation.
pub struct ConversationSupervisor<T: Turn> {
    turn: Arc<T>,
    policy: BusyPolicy,
    locks: AsyncMutex<HashMap<ConversationId, Arc<AsyncMutex<()>>>>,
}

impl<T: Turn> ConversationSupervisor<T> {
    /// Wrap `turn`, applying `policy` to concurrent requests on the same
    /// conversation.
    pub fn new(turn: Arc<T>, policy: BusyPolicy) -> Self {
        Self { turn, policy, locks: AsyncMutex::new(HashMap::new()) }
    }

    async fn lock_for(&self, conversation: &ConversationId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(conversation.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Run `input` as a turn of `conversation`, respecting the configured
    /// busy policy against any turn already running for it.
    pub async fn execute_for(&self, conversation: ConversationId, input: TurnInput) -> Result<TurnOutput, TurnError> {
        let lock = self.lock_for(&conversation).await;
        let _guard = match self.policy {
            BusyPolicy::Queue => lock.lock().await,
            BusyPolicy::AbortNew => match lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    return Err(TurnError::NonRetryable(format!("conversation {conversation} has a turn already in flight")));
                }
            },
        };
        self.turn.execute(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layer0::content::Content;
    use layer0::turn::{ExitReason, TriggerType};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct SlowTurn {
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Turn for SlowTurn {
        async fn execute(&self, _input: TurnInput) -> Result<TurnOutput, TurnError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(TurnOutput::new(Content::text("done"), ExitReason::Complete))
        }
    }

    fn input() -> TurnInput {
        TurnInput::new(Content::text("hi"), TriggerType::User)
    }

    #[tokio::test]
    async fn abort_new_rejects_a_second_call_on_the_same_conversation() {
        let supervisor = Arc::new(ConversationSupervisor::new(Arc::new(SlowTurn { calls: AtomicU32::new(0) }), BusyPolicy::AbortNew));
        let conv = ConversationId::new("c1");

        let s1 = supervisor.clone();
        let c1 = conv.clone();
        let first = tokio::spawn(async move { s1.execute_for(c1, input()).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = supervisor.execute_for(conv, input()).await;
        assert!(second.is_err());
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn queue_policy_serializes_instead_of_rejecting() {
        let supervisor = Arc::new(ConversationSupervisor::new(Arc::new(SlowTurn { calls: AtomicU32::new(0) }), BusyPolicy::Queue));
        let conv = ConversationId::new("c1");

        let s1 = supervisor.clone();
        let c1 = conv.clone();
        let first = tokio::spawn(async move { s1.execute_for(c1, input()).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = supervisor.execute_for(conv, input()).await;
        assert!(second.is_ok());
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn distinct_conversations_never_contend() {
        let supervisor = ConversationSupervisor::new(Arc::new(SlowTurn { calls: AtomicU32::new(0) }), BusyPolicy::AbortNew);
        let a = supervisor.execute_for(ConversationId::new("a"), input());
        let b = supervisor.execute_for(ConversationId::new("b"), input());
        let (a, b) = tokio::join!(a, b);
        assert!(a.is_ok());
        assert!(b.is_ok());
    }
}
