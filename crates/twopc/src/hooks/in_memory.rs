//! Scriptable in-memory hooks.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use super::TransactionHooks;
use crate::error::HookError;
use crate::layout::TransactionPath;

#[derive(Debug, Default)]
struct InMemoryHooksState {
    fail_on_prepare: bool,
    fail_on_commit: bool,
    commit_failures_remaining: u32,
    prepare_delay: Option<Duration>,
    prepare_count: u32,
    commit_attempts: u32,
    rollback_count: u32,
    committed: bool,
}

/// In-memory hooks for testing, with injectable failures.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHooks {
    state: Arc<RwLock<InMemoryHooksState>>,
}

impl InMemoryHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the prepare hook to fail.
    pub fn set_fail_on_prepare(&self, fail: bool) {
        self.write().fail_on_prepare = fail;
    }

    /// Configures the commit hook to fail on every attempt.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.write().fail_on_commit = fail;
    }

    /// Configures the next `count` commit attempts to fail.
    pub fn set_commit_failures(&self, count: u32) {
        self.write().commit_failures_remaining = count;
    }

    /// Makes the prepare hook take `delay` before returning.
    pub fn set_prepare_delay(&self, delay: Duration) {
        self.write().prepare_delay = Some(delay);
    }

    pub fn prepare_count(&self) -> u32 {
        self.read().prepare_count
    }

    pub fn commit_attempts(&self) -> u32 {
        self.read().commit_attempts
    }

    pub fn rollback_count(&self) -> u32 {
        self.read().rollback_count
    }

    /// Returns true once a commit attempt has succeeded.
    pub fn is_committed(&self) -> bool {
        self.read().committed
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryHooksState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryHooksState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TransactionHooks for InMemoryHooks {
    async fn prepare(&self, _transaction: &TransactionPath) -> Result<(), HookError> {
        let (delay, fail) = {
            let mut state = self.write();
            state.prepare_count += 1;
            (state.prepare_delay, state.fail_on_prepare)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(HookError::new("prepare rejected"));
        }
        Ok(())
    }

    async fn commit(&self, _transaction: &TransactionPath) -> Result<(), HookError> {
        let mut state = self.write();
        state.commit_attempts += 1;

        if state.fail_on_commit {
            return Err(HookError::new("commit rejected"));
        }
        if state.commit_failures_remaining > 0 {
            state.commit_failures_remaining -= 1;
            return Err(HookError::new(format!(
                "commit attempt {} failed",
                state.commit_attempts
            )));
        }

        state.committed = true;
        Ok(())
    }

    async fn rollback(&self, _transaction: &TransactionPath) -> Result<(), HookError> {
        self.write().rollback_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn() -> TransactionPath {
        TransactionPath::new("/transactions/dx0000000000")
    }

    #[tokio::test]
    async fn test_prepare_and_commit() {
        let hooks = InMemoryHooks::new();
        hooks.prepare(&txn()).await.unwrap();
        hooks.commit(&txn()).await.unwrap();

        assert_eq!(hooks.prepare_count(), 1);
        assert_eq!(hooks.commit_attempts(), 1);
        assert!(hooks.is_committed());
    }

    #[tokio::test]
    async fn test_fail_on_prepare() {
        let hooks = InMemoryHooks::new();
        hooks.set_fail_on_prepare(true);
        assert!(hooks.prepare(&txn()).await.is_err());
        assert_eq!(hooks.prepare_count(), 1);
    }

    #[tokio::test]
    async fn test_commit_failures_then_success() {
        let hooks = InMemoryHooks::new();
        hooks.set_commit_failures(2);

        assert!(hooks.commit(&txn()).await.is_err());
        assert!(hooks.commit(&txn()).await.is_err());
        assert!(!hooks.is_committed());
        assert!(hooks.commit(&txn()).await.is_ok());
        assert_eq!(hooks.commit_attempts(), 3);
        assert!(hooks.is_committed());
    }

    #[tokio::test]
    async fn test_rollback_counts() {
        let hooks = InMemoryHooks::new();
        hooks.rollback(&txn()).await.unwrap();
        assert_eq!(hooks.rollback_count(), 1);
    }
}
