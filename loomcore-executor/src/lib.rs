#![deny(missing_docs)]
//! The RVR-B loop: the executor that drives one turn to completion.
//!
//! `Executor<P>` implements `layer0::Turn` by running React (model call),
//! Validate (classify tool outcomes), Reflect (choose a recovery), and
//! Backtrack (apply it) — bounded by a termination controller and
//! protected by lazy filesystem snapshots. `ConversationSupervisor` sits
//! above it to serialize turns per conversation.

mod backtrack;
mod clock;
mod config;
mod event;
mod executor;
mod hitl;
mod supervisor;

pub use backtrack::{reflect_deterministic, reflect_logic_error, BacktrackDecision};
pub use clock::{CancelToken, Clock, CounterIdSource, IdSource, SystemClock};
pub use config::{ComplexityBudget, ExecutorConfig};
pub use event::{Event, EventKind, EventSink, NullEventSink};
pub use executor::{Executor, NullStateReader};
pub use hitl::{HitlRequest, NullUserChannel, RollbackChoice, UserChannel};
pub use supervisor::{BusyPolicy, ConversationSupervisor};
