//! Coordinator engine.
//!
//! One coordinator drives one transaction over one store session. All
//! notifications for the session are consumed by [`Coordinator::run`],
//! which dispatches them to a handler per event kind. Handlers update the
//! [`TransactionRecord`] under its lock, then carry out the resulting
//! [`FollowUp`] against the store with the lock released.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use coord_store::{
    CoordinationStore, CoordinationStoreExt, CreateMode, EventReceiver, EventType, SessionState,
    StoreError, WatchedEvent,
};
use futures_util::future::join_all;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::alert::{AlertReason, AlertSink, OperatorAlert};
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::layout::{ParticipantPath, TransactionPath};
use crate::message::{CoordinatorOrder, NodePayload};
use crate::retry::{retry_transient, wait_until};
use crate::state::CoordinatorState;
use crate::transaction::{FollowUp, TransactionOutcome, TransactionRecord, TransactionSnapshot};

struct CoordinatorInner<S, A> {
    session: S,
    alerts: A,
    config: CoordinatorConfig,
    record: Mutex<TransactionRecord>,
    wake: Notify,
}

/// Drives a single transaction from directory creation to cleanup.
///
/// ```text
/// begin_transaction()  ──► notify_to_prepare()  ──► run() ──► TransactionOutcome
/// ```
pub struct Coordinator<S, A> {
    inner: Arc<CoordinatorInner<S, A>>,
    events: EventReceiver,
}

/// Clonable handle for observing or cancelling a running coordinator.
pub struct CoordinatorHandle<S, A> {
    inner: Arc<CoordinatorInner<S, A>>,
}

impl<S, A> Clone for CoordinatorHandle<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, A> Coordinator<S, A>
where
    S: CoordinationStore,
    A: AlertSink,
{
    /// Creates a coordinator over an open session and its notification channel.
    pub fn new(session: S, events: EventReceiver, alerts: A, config: CoordinatorConfig) -> Self {
        let record = TransactionRecord::new(&config);
        Self {
            inner: Arc::new(CoordinatorInner {
                session,
                alerts,
                config,
                record: Mutex::new(record),
                wake: Notify::new(),
            }),
            events,
        }
    }

    pub fn handle(&self) -> CoordinatorHandle<S, A> {
        CoordinatorHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Returns the transaction directory once it exists.
    pub async fn transaction(&self) -> Option<TransactionPath> {
        self.inner.record.lock().await.path().cloned()
    }

    pub async fn state(&self) -> CoordinatorState {
        self.inner.record.lock().await.state()
    }

    /// Creates the transaction directory under the layout root.
    ///
    /// Transient store faults are retried with the configured budget.
    #[tracing::instrument(skip(self), fields(root = %self.inner.config.layout.root()))]
    pub async fn begin_transaction(&self) -> Result<TransactionPath> {
        {
            let record = self.inner.record.lock().await;
            if record.state() != CoordinatorState::Init {
                return Err(CoordinatorError::InvalidState {
                    expected: CoordinatorState::Init.to_string(),
                    actual: record.state(),
                });
            }
        }

        let session = &self.inner.session;
        let policy = &self.inner.config.store_retry;
        let root = self.inner.config.layout.root();
        let prefix = self.inner.config.layout.transaction_prefix_path();
        let prefix = prefix.as_str();

        retry_transient(policy, "ensure_root", move || session.ensure_path(root))
            .await
            .map_err(|(e, attempts)| CoordinatorError::from_store("ensure_root", attempts, e))?;

        let created = retry_transient(policy, "create_transaction", move || {
            session.create(prefix, &[], CreateMode::PersistentSequential)
        })
        .await
        .map_err(|(e, attempts)| CoordinatorError::from_store("create_transaction", attempts, e))?;

        let path = TransactionPath::new(created);
        self.inner.record.lock().await.dir_created(path.clone())?;

        metrics::counter!("twopc_transactions_begun_total").increment(1);
        tracing::info!(transaction = %path, "transaction directory created");
        Ok(path)
    }

    /// Sends PREPARE to every registered participant and starts watching.
    ///
    /// Fails with `NoParticipants` if nobody has registered yet; the
    /// transaction stays open and the call may be repeated.
    #[tracing::instrument(skip(self))]
    pub async fn notify_to_prepare(&self) -> Result<()> {
        let path = {
            let record = self.inner.record.lock().await;
            match record.path() {
                Some(path) if record.state().can_prepare() => path.clone(),
                _ => {
                    return Err(CoordinatorError::InvalidState {
                        expected: CoordinatorState::DirCreated.to_string(),
                        actual: record.state(),
                    });
                }
            }
        };

        let members = self.inner.list_participants(&path, true).await?;
        let follow_up = self.inner.record.lock().await.begin_prepare(members)?;

        tracing::info!(transaction = %path, "prepare phase started");
        self.inner.perform(follow_up).await
    }

    /// Consumes notifications until the transaction reaches a terminal state.
    ///
    /// Returns the outcome, or an error if the session expired or the store
    /// stayed unavailable while work was outstanding.
    #[tracing::instrument(skip(self))]
    pub async fn run(&mut self) -> Result<TransactionOutcome> {
        loop {
            let (outcome, deadline) = {
                let record = self.inner.record.lock().await;
                (record.outcome(), record.deadline())
            };
            if let Some(outcome) = outcome {
                tracing::info!(%outcome, "transaction finished");
                return Ok(outcome);
            }

            let step = tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.inner.dispatch(event).await,
                    None => Err(CoordinatorError::ConnectionClosed),
                },
                _ = wait_until(deadline) => self.inner.on_deadline().await,
                _ = self.inner.wake.notified() => Ok(()),
            };

            if let Err(err) = step {
                self.inner.fail(&err).await;
                return Err(err);
            }
        }
    }

    /// Closes the coordinator's session.
    pub async fn close(&self) -> Result<()> {
        self.inner.session.close().await?;
        Ok(())
    }
}

impl<S, A> CoordinatorHandle<S, A>
where
    S: CoordinationStore,
    A: AlertSink,
{
    /// Returns a snapshot of the transaction.
    pub async fn status(&self) -> TransactionSnapshot {
        self.inner.record.lock().await.snapshot()
    }

    /// Aborts the transaction if no decision has been made yet.
    #[tracing::instrument(skip(self, reason))]
    pub async fn cancel(&self, reason: impl Into<String>) -> Result<()> {
        let follow_up = self.inner.record.lock().await.cancel(reason)?;
        let result = self.inner.perform(follow_up).await;
        self.inner.wake.notify_one();
        result
    }
}

impl<S, A> CoordinatorInner<S, A>
where
    S: CoordinationStore,
    A: AlertSink,
{
    async fn dispatch(&self, event: WatchedEvent) -> Result<()> {
        match event {
            WatchedEvent::Node { event_type, path } => match event_type {
                EventType::NodeChildrenChanged => self.on_children_changed(&path).await,
                EventType::NodeDataChanged => self.on_data_changed(&path).await,
                EventType::NodeDeleted => self.on_node_deleted(&path).await,
                EventType::NodeCreated => Ok(()),
            },
            WatchedEvent::SessionStateChanged(state) => self.on_session_state(state).await,
        }
    }

    async fn on_children_changed(&self, path: &str) -> Result<()> {
        let (transaction, watching) = {
            let record = self.record.lock().await;
            (record.path().cloned(), record.is_watching())
        };
        let Some(transaction) = transaction.filter(|t| t.as_str() == path) else {
            return Ok(());
        };
        if !watching {
            return Ok(());
        }

        let members = match self.list_participants(&transaction, true).await {
            Ok(members) => members,
            Err(CoordinatorError::Store(StoreError::NoNode(_))) => {
                tracing::warn!(
                    transaction = %transaction,
                    "transaction directory removed externally"
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        let follow_up = self.record.lock().await.on_membership(&members);
        self.perform(follow_up).await
    }

    async fn on_data_changed(&self, path: &str) -> Result<()> {
        let participant = ParticipantPath::new(path);
        if !self.record.lock().await.knows(&participant) {
            return Ok(());
        }
        let follow_up = self.refresh_participant(&participant).await?;
        self.perform(follow_up).await
    }

    async fn on_node_deleted(&self, path: &str) -> Result<()> {
        let participant = ParticipantPath::new(path);
        let follow_up = self.record.lock().await.on_vanished(&participant);
        self.perform(follow_up).await
    }

    async fn on_session_state(&self, state: SessionState) -> Result<()> {
        match state {
            SessionState::Connected => {
                tracing::debug!("coordinator session connected");
                Ok(())
            }
            SessionState::Disconnected => {
                tracing::warn!("coordinator session disconnected; waiting for reconnect");
                Ok(())
            }
            SessionState::Expired => Err(CoordinatorError::SessionExpired),
        }
    }

    async fn on_deadline(&self) -> Result<()> {
        let follow_up = self.record.lock().await.on_deadline(Instant::now());
        self.perform(follow_up).await
    }

    /// Carries out a follow-up and everything it leads to.
    async fn perform(&self, follow_up: FollowUp) -> Result<()> {
        let mut queue = VecDeque::from([follow_up]);

        while let Some(follow_up) = queue.pop_front() {
            match follow_up {
                FollowUp::Nothing => {}
                FollowUp::SendPrepare(targets) => {
                    let delivered = self.broadcast(CoordinatorOrder::Prepare, &targets).await?;
                    for (participant, exists) in targets.iter().zip(delivered) {
                        let next = if exists {
                            self.refresh_participant(participant).await?
                        } else {
                            self.record.lock().await.on_vanished(participant)
                        };
                        queue.push_back(next);
                    }
                }
                FollowUp::Broadcast { order, targets } => {
                    tracing::info!(%order, participants = targets.len(), "decision broadcast");
                    let delivered = self.broadcast(order, &targets).await?;
                    for (participant, exists) in targets.iter().zip(delivered) {
                        if !exists {
                            queue.push_back(self.record.lock().await.on_vanished(participant));
                        }
                    }
                }
                FollowUp::Close => self.close_transaction().await,
                FollowUp::Escalate {
                    reason,
                    detail,
                    participants,
                } => {
                    let transaction = {
                        let mut record = self.record.lock().await;
                        record.freeze();
                        record_duration(&record);
                        record.path().cloned()
                    };
                    self.alerts
                        .raise(
                            OperatorAlert::new(transaction, reason, detail)
                                .with_participants(participants),
                        )
                        .await;
                }
            }
        }
        Ok(())
    }

    /// Writes `order` into every target concurrently.
    ///
    /// Returns, per target, whether its node still existed.
    async fn broadcast(
        &self,
        order: CoordinatorOrder,
        targets: &[ParticipantPath],
    ) -> Result<Vec<bool>> {
        let writes = join_all(targets.iter().map(|p| self.write_order(p, order))).await;
        writes.into_iter().collect()
    }

    async fn write_order(
        &self,
        participant: &ParticipantPath,
        order: CoordinatorOrder,
    ) -> Result<bool> {
        let session = &self.session;
        let path = participant.as_str();
        let written = retry_transient(&self.config.store_retry, "write_order", move || {
            session.set_data(path, order.payload(), None)
        })
        .await;

        match written {
            Ok(_) => Ok(true),
            Err((StoreError::NoNode(_), _)) => Ok(false),
            Err((e, attempts)) => Err(CoordinatorError::from_store("write_order", attempts, e)),
        }
    }

    /// Re-reads a participant node and feeds what it says into the record.
    ///
    /// The data watch is re-armed while reports still matter.
    async fn refresh_participant(&self, participant: &ParticipantPath) -> Result<FollowUp> {
        let watch = matches!(
            self.record.lock().await.state(),
            CoordinatorState::AwaitingVotes | CoordinatorState::DecidedCommit
        );
        let session = &self.session;
        let path = participant.as_str();
        let read = retry_transient(&self.config.store_retry, "read_participant", move || {
            session.get_data(path, watch)
        })
        .await;

        let data = match read {
            Ok((data, _)) => data,
            Err((StoreError::NoNode(_), _)) => {
                return Ok(self.record.lock().await.on_vanished(participant));
            }
            Err((e, attempts)) => {
                return Err(CoordinatorError::from_store("read_participant", attempts, e));
            }
        };

        match NodePayload::parse(&data) {
            Ok(NodePayload::Report(report)) => {
                tracing::debug!(participant = %participant, %report, "participant reported");
                Ok(self.record.lock().await.on_report(participant, report))
            }
            // Still holds our own order, or nothing yet.
            Ok(NodePayload::Order(_) | NodePayload::Empty) => Ok(FollowUp::Nothing),
            Err(e) => {
                tracing::warn!(
                    participant = %participant,
                    error = %e,
                    "unreadable participant node"
                );
                Ok(FollowUp::Nothing)
            }
        }
    }

    async fn list_participants(
        &self,
        transaction: &TransactionPath,
        watch: bool,
    ) -> Result<Vec<ParticipantPath>> {
        let session = &self.session;
        let path = transaction.as_str();
        let children = retry_transient(&self.config.store_retry, "list_participants", move || {
            session.get_children(path, watch)
        })
        .await
        .map_err(|(e, attempts)| CoordinatorError::from_store("list_participants", attempts, e))?;

        Ok(self
            .config
            .layout
            .participants_of(transaction, &children)
            .collect())
    }

    async fn close_transaction(&self) {
        let Some(transaction) = self.record.lock().await.path().cloned() else {
            return;
        };
        let session = &self.session;
        let path = transaction.as_str();
        let deleted = retry_transient(&self.config.store_retry, "delete_transaction", move || {
            session.delete_recursive(path)
        })
        .await;

        match deleted {
            Ok(removed) => {
                tracing::info!(
                    transaction = %transaction,
                    removed,
                    "transaction directory deleted"
                );
            }
            Err((e, attempts)) => {
                tracing::error!(transaction = %transaction, attempts, error = %e, "cleanup failed");
                self.alerts
                    .raise(OperatorAlert::new(
                        Some(transaction.clone()),
                        AlertReason::StoreFault,
                        format!("could not delete transaction directory: {e}"),
                    ))
                    .await;
            }
        }

        let mut record = self.record.lock().await;
        record.closed();
        record_duration(&record);
    }

    /// Raises the alert for an error that ends [`Coordinator::run`].
    async fn fail(&self, err: &CoordinatorError) {
        let transaction = {
            let mut record = self.record.lock().await;
            if record.state().is_terminal() {
                return;
            }
            // Only a decided outcome has to be finished by an operator.
            if record.state().is_decided() {
                record.freeze();
            }
            record.path().cloned()
        };

        let reason = match err {
            CoordinatorError::SessionExpired => AlertReason::SessionExpired,
            _ => AlertReason::StoreFault,
        };
        self.alerts
            .raise(OperatorAlert::new(transaction, reason, err.to_string()))
            .await;
    }
}

fn record_duration(record: &TransactionRecord) {
    if let Some(began_at) = record.began_at() {
        let elapsed = (Utc::now() - began_at).num_milliseconds().max(0) as f64 / 1000.0;
        metrics::histogram!("twopc_transaction_duration_seconds").record(elapsed);
    }
}
