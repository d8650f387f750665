//! Operator alerts.
//!
//! Every failure other than an ordinary `ABORTED` vote ends up here. Sinks
//! decide where alerts go; the engines only raise them.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::layout::{ParticipantPath, TransactionPath};

/// Why an operator is being paged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertReason {
    /// COMMIT was sent but not every participant confirmed in time.
    CommitUnconfirmed,
    /// A participant's node vanished after COMMIT, before it reported COMMITTED.
    ParticipantLostAfterCommit,
    /// The raising side's session expired.
    SessionExpired,
    /// A participant gave up retrying its commit hook.
    CommitRetriesExhausted,
    /// A prepared participant lost its node before learning the outcome.
    InDoubt,
    /// The store stayed unavailable or rejected a required operation.
    StoreFault,
}

impl AlertReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertReason::CommitUnconfirmed => "commit_unconfirmed",
            AlertReason::ParticipantLostAfterCommit => "participant_lost_after_commit",
            AlertReason::SessionExpired => "session_expired",
            AlertReason::CommitRetriesExhausted => "commit_retries_exhausted",
            AlertReason::InDoubt => "in_doubt",
            AlertReason::StoreFault => "store_fault",
        }
    }
}

impl std::fmt::Display for AlertReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request for human intervention.
#[derive(Debug, Clone, Serialize)]
pub struct OperatorAlert {
    pub transaction: Option<TransactionPath>,
    pub reason: AlertReason,
    pub detail: String,
    /// Participants involved, e.g. those that never confirmed a commit.
    pub participants: Vec<ParticipantPath>,
    pub raised_at: DateTime<Utc>,
}

impl OperatorAlert {
    pub fn new(
        transaction: Option<TransactionPath>,
        reason: AlertReason,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            transaction,
            reason,
            detail: detail.into(),
            participants: Vec::new(),
            raised_at: Utc::now(),
        }
    }

    pub fn with_participants(mut self, participants: Vec<ParticipantPath>) -> Self {
        self.participants = participants;
        self
    }
}

/// Destination for operator alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn raise(&self, alert: OperatorAlert);
}

/// Alert sink that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn raise(&self, alert: OperatorAlert) {
        metrics::counter!("twopc_alerts_total", "reason" => alert.reason.as_str()).increment(1);
        tracing::error!(
            reason = %alert.reason,
            transaction = ?alert.transaction.as_ref().map(TransactionPath::as_str),
            participants = alert.participants.len(),
            detail = %alert.detail,
            "operator intervention required"
        );
    }
}

/// Number of alerts kept by [`InMemoryAlertSink::new`].
pub const DEFAULT_ALERT_LIMIT: usize = 1000;

/// Alert sink that logs and keeps the most recent alerts in memory.
#[derive(Debug, Clone)]
pub struct InMemoryAlertSink {
    alerts: Arc<RwLock<VecDeque<OperatorAlert>>>,
    limit: usize,
}

impl Default for InMemoryAlertSink {
    fn default() -> Self {
        Self::with_limit(DEFAULT_ALERT_LIMIT)
    }
}

impl InMemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink that keeps at most `limit` alerts, dropping the oldest.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            alerts: Arc::new(RwLock::new(VecDeque::new())),
            limit: limit.max(1),
        }
    }

    /// Returns the retained alerts, oldest first.
    pub fn alerts(&self) -> Vec<OperatorAlert> {
        self.alerts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns true if an alert with `reason` was raised.
    pub fn has_reason(&self, reason: AlertReason) -> bool {
        self.alerts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|a| a.reason == reason)
    }
}

#[async_trait]
impl AlertSink for InMemoryAlertSink {
    async fn raise(&self, alert: OperatorAlert) {
        TracingAlertSink.raise(alert.clone()).await;
        let mut alerts = self.alerts.write().unwrap_or_else(|e| e.into_inner());
        if alerts.len() == self.limit {
            alerts.pop_front();
        }
        alerts.push_back(alert);
    }
}

#[async_trait]
impl<T: AlertSink + ?Sized> AlertSink for Arc<T> {
    async fn raise(&self, alert: OperatorAlert) {
        (**self).raise(alert).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_sink_keeps_alerts() {
        let sink = InMemoryAlertSink::new();
        let txn = TransactionPath::new("/transactions/dx0000000000");

        sink.raise(
            OperatorAlert::new(Some(txn.clone()), AlertReason::CommitUnconfirmed, "timeout")
                .with_participants(vec![ParticipantPath::new(
                    "/transactions/dx0000000000/participant-0000000000",
                )]),
        )
        .await;

        assert_eq!(sink.alert_count(), 1);
        assert!(sink.has_reason(AlertReason::CommitUnconfirmed));
        assert!(!sink.has_reason(AlertReason::StoreFault));
        let alert = &sink.alerts()[0];
        assert_eq!(alert.transaction, Some(txn));
        assert_eq!(alert.participants.len(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_alerts() {
        let sink = InMemoryAlertSink::new();
        let shared: Arc<dyn AlertSink> = Arc::new(sink.clone());
        shared
            .raise(OperatorAlert::new(None, AlertReason::SessionExpired, "gone"))
            .await;
        assert_eq!(sink.alert_count(), 1);
    }

    #[tokio::test]
    async fn test_oldest_alerts_are_dropped_at_limit() {
        let sink = InMemoryAlertSink::with_limit(2);
        for detail in ["first", "second", "third"] {
            sink.raise(OperatorAlert::new(None, AlertReason::StoreFault, detail))
                .await;
        }

        let details: Vec<String> = sink.alerts().into_iter().map(|a| a.detail).collect();
        assert_eq!(details, vec!["second", "third"]);
        assert_eq!(sink.alert_count(), 2);
    }

    #[test]
    fn test_alert_serializes_reason_in_snake_case() {
        let alert = OperatorAlert::new(None, AlertReason::ParticipantLostAfterCommit, "lost");
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["reason"], "participant_lost_after_commit");
    }
}
