//! Business hooks run by participants, and in-memory implementations.

pub mod account;
pub mod in_memory;

use async_trait::async_trait;

use crate::error::HookError;
use crate::layout::TransactionPath;

pub use account::{AccountDebitHooks, AccountLedger};
pub use in_memory::InMemoryHooks;

/// The local work a participant performs for a transaction.
///
/// `prepare` must leave the participant able to commit or roll back.
/// `commit` may be called several times for the same transaction when an
/// earlier attempt failed, so it must tolerate retries.
#[async_trait]
pub trait TransactionHooks: Send + Sync {
    /// Stages the local change. An error becomes an `ABORTED` vote.
    async fn prepare(&self, transaction: &TransactionPath) -> Result<(), HookError>;

    /// Makes the staged change durable.
    async fn commit(&self, transaction: &TransactionPath) -> Result<(), HookError>;

    /// Discards the staged change.
    async fn rollback(&self, transaction: &TransactionPath) -> Result<(), HookError>;
}
