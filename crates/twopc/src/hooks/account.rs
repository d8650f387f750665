//! Account debit hooks.
//!
//! Prepare places a hold on the funds, commit turns the hold into a debit,
//! rollback releases it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::TransactionHooks;
use crate::error::HookError;
use crate::layout::TransactionPath;

#[derive(Debug, Default)]
struct Account {
    balance: u64,
    holds: HashMap<TransactionPath, u64>,
}

impl Account {
    fn available(&self) -> u64 {
        self.balance.saturating_sub(self.holds.values().sum())
    }
}

/// Shared in-memory account balances, in cents.
#[derive(Debug, Clone, Default)]
pub struct AccountLedger {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
}

impl AccountLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens an account, or resets its balance and holds.
    pub fn open(&self, account: impl Into<String>, balance: u64) {
        self.accounts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                account.into(),
                Account {
                    balance,
                    holds: HashMap::new(),
                },
            );
    }

    /// Returns the booked balance, ignoring holds.
    pub fn balance(&self, account: &str) -> Option<u64> {
        self.accounts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(account)
            .map(|a| a.balance)
    }

    /// Returns the balance minus every outstanding hold.
    pub fn available(&self, account: &str) -> Option<u64> {
        self.accounts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(account)
            .map(Account::available)
    }

    fn hold(
        &self,
        account: &str,
        transaction: &TransactionPath,
        amount: u64,
    ) -> Result<(), HookError> {
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        let entry = accounts
            .get_mut(account)
            .ok_or_else(|| HookError::new(format!("unknown account {account}")))?;

        if entry.holds.contains_key(transaction) {
            return Ok(());
        }
        if entry.available() < amount {
            return Err(HookError::new(format!(
                "insufficient funds in {account}: available {}, requested {amount}",
                entry.available()
            )));
        }
        entry.holds.insert(transaction.clone(), amount);
        Ok(())
    }

    fn settle(&self, account: &str, transaction: &TransactionPath) -> Result<(), HookError> {
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        let entry = accounts
            .get_mut(account)
            .ok_or_else(|| HookError::new(format!("unknown account {account}")))?;

        // A retried commit finds the hold already settled.
        let Some(amount) = entry.holds.remove(transaction) else {
            return Ok(());
        };
        entry.balance -= amount;
        Ok(())
    }

    fn release(&self, account: &str, transaction: &TransactionPath) {
        if let Some(entry) = self
            .accounts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(account)
        {
            entry.holds.remove(transaction);
        }
    }
}

/// Debits a fixed amount from one account as part of a transaction.
#[derive(Debug, Clone)]
pub struct AccountDebitHooks {
    ledger: AccountLedger,
    account: String,
    amount: u64,
}

impl AccountDebitHooks {
    pub fn new(ledger: AccountLedger, account: impl Into<String>, amount: u64) -> Self {
        Self {
            ledger,
            account: account.into(),
            amount,
        }
    }
}

#[async_trait]
impl TransactionHooks for AccountDebitHooks {
    async fn prepare(&self, transaction: &TransactionPath) -> Result<(), HookError> {
        self.ledger.hold(&self.account, transaction, self.amount)
    }

    async fn commit(&self, transaction: &TransactionPath) -> Result<(), HookError> {
        self.ledger.settle(&self.account, transaction)
    }

    async fn rollback(&self, transaction: &TransactionPath) -> Result<(), HookError> {
        self.ledger.release(&self.account, transaction);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn(n: u32) -> TransactionPath {
        TransactionPath::new(format!("/transactions/dx{n:010}"))
    }

    #[tokio::test]
    async fn test_hold_then_commit_debits() {
        let ledger = AccountLedger::new();
        ledger.open("alice", 10_000);
        let hooks = AccountDebitHooks::new(ledger.clone(), "alice", 2_500);

        hooks.prepare(&txn(1)).await.unwrap();
        assert_eq!(ledger.balance("alice"), Some(10_000));
        assert_eq!(ledger.available("alice"), Some(7_500));

        hooks.commit(&txn(1)).await.unwrap();
        assert_eq!(ledger.balance("alice"), Some(7_500));
        assert_eq!(ledger.available("alice"), Some(7_500));

        // Retried commit is a no-op.
        hooks.commit(&txn(1)).await.unwrap();
        assert_eq!(ledger.balance("alice"), Some(7_500));
    }

    #[tokio::test]
    async fn test_rollback_releases_hold() {
        let ledger = AccountLedger::new();
        ledger.open("bob", 1_000);
        let hooks = AccountDebitHooks::new(ledger.clone(), "bob", 1_000);

        hooks.prepare(&txn(1)).await.unwrap();
        assert_eq!(ledger.available("bob"), Some(0));

        hooks.rollback(&txn(1)).await.unwrap();
        assert_eq!(ledger.available("bob"), Some(1_000));
        assert_eq!(ledger.balance("bob"), Some(1_000));
    }

    #[tokio::test]
    async fn test_insufficient_funds_rejects_prepare() {
        let ledger = AccountLedger::new();
        ledger.open("carol", 500);
        let hooks = AccountDebitHooks::new(ledger.clone(), "carol", 400);

        hooks.prepare(&txn(1)).await.unwrap();
        let err = hooks.prepare(&txn(2)).await.unwrap_err();
        assert!(err.message.contains("insufficient funds"));
        assert_eq!(ledger.available("carol"), Some(100));
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let hooks = AccountDebitHooks::new(AccountLedger::new(), "nobody", 1);
        assert!(hooks.prepare(&txn(1)).await.is_err());
    }
}
