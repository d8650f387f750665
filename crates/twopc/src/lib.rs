//! Two-phase commit over a watched hierarchical coordination store.
//!
//! The coordinator and its participants never talk to each other directly.
//! All communication goes through nodes in the store:
//! 1. The coordinator creates a uniquely named transaction directory
//! 2. Participants register session-bound child nodes under it
//! 3. The coordinator writes `PREPARE` into every child and watches them
//! 4. Participants run their prepare hook and write `PREPARED` or `ABORTED`
//! 5. The coordinator writes `COMMIT` on unanimity, `ABORT` on any dissent
//! 6. Participants commit (retrying with backoff) and report `COMMITTED`
//! 7. The coordinator deletes the directory, or escalates to an operator
//!
//! A participant whose connection drops loses its node, which the
//! coordinator treats as an `ABORTED` vote.

pub mod alert;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod hooks;
pub mod layout;
pub mod message;
pub mod participant;
pub mod retry;
pub mod state;
pub mod transaction;
pub mod vote;

pub use alert::{
    AlertReason, AlertSink, DEFAULT_ALERT_LIMIT, InMemoryAlertSink, OperatorAlert,
    TracingAlertSink,
};
pub use config::{CoordinatorConfig, ParticipantConfig};
pub use coordinator::{Coordinator, CoordinatorHandle};
pub use error::{CoordinatorError, HookError, ParticipantError, ProtocolError};
pub use hooks::{AccountDebitHooks, AccountLedger, InMemoryHooks, TransactionHooks};
pub use layout::{ParticipantPath, TransactionLayout, TransactionPath};
pub use message::{CoordinatorOrder, NodePayload, ParticipantReport};
pub use participant::{Participant, ParticipantOutcome};
pub use retry::{Backoff, RetryPolicy};
pub use state::{CoordinatorState, ParticipantState};
pub use transaction::{TransactionOutcome, TransactionRecord, TransactionSnapshot};
pub use vote::{RecordOutcome, VoteLedger};
