//! Participant engine.
//!
//! A participant owns one session-bound node under a transaction directory.
//! The coordinator writes orders into that node and the participant answers
//! by overwriting it with its report. Hooks run on spawned tasks and report
//! back through a channel, so [`Participant::run`] keeps consuming store
//! notifications while a prepare, a rollback or a commit retry loop is in
//! progress.
//!
//! After reporting COMMITTED the participant keeps its node until the
//! coordinator removes the transaction directory, so closing the session
//! once `run` returns can never hide the report from the coordinator.

use std::sync::Arc;

use coord_store::{
    CoordinationStore, CreateMode, EventReceiver, EventType, SessionId, SessionState, StoreError,
    Version, WatchedEvent,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::alert::{AlertReason, AlertSink, OperatorAlert};
use crate::config::ParticipantConfig;
use crate::error::{HookError, ParticipantError};
use crate::hooks::TransactionHooks;
use crate::layout::{ParticipantPath, TransactionPath};
use crate::message::{CoordinatorOrder, NodePayload, ParticipantReport};
use crate::retry::{RetryPolicy, retry_transient, wait_until};
use crate::state::ParticipantState;

type Result<T> = std::result::Result<T, ParticipantError>;

/// How a participant's part in a transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantOutcome {
    /// The commit hook succeeded after `attempts` tries and COMMITTED was reported.
    Committed { attempts: u32 },
    Aborted,
}

enum HookCompletion {
    Prepared(std::result::Result<(), HookError>),
    Committed {
        attempts: u32,
        result: std::result::Result<(), HookError>,
    },
    RolledBack(std::result::Result<(), HookError>),
}

/// One participant in one transaction.
pub struct Participant<S, H, A> {
    session: S,
    hooks: Arc<H>,
    alerts: A,
    config: ParticipantConfig,
    events: EventReceiver,
    state: ParticipantState,
    transaction: Option<TransactionPath>,
    node: Option<ParticipantPath>,
    /// Version of the node when the order being answered was read.
    order_version: Option<Version>,
    abort_requested: bool,
    /// Set once the coordinator has removed the node after COMMITTED.
    released: bool,
    release_deadline: Option<Instant>,
    commit_attempts: u32,
    completions_tx: mpsc::UnboundedSender<HookCompletion>,
    completions_rx: mpsc::UnboundedReceiver<HookCompletion>,
}

impl<S, H, A> Participant<S, H, A>
where
    S: CoordinationStore,
    H: TransactionHooks + 'static,
    A: AlertSink,
{
    /// Creates a participant over an open session and its notification channel.
    pub fn new(
        session: S,
        events: EventReceiver,
        hooks: H,
        alerts: A,
        config: ParticipantConfig,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            session,
            hooks: Arc::new(hooks),
            alerts,
            config,
            events,
            state: ParticipantState::Unregistered,
            transaction: None,
            node: None,
            order_version: None,
            abort_requested: false,
            released: false,
            release_deadline: None,
            commit_attempts: 0,
            completions_tx,
            completions_rx,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session.session_id()
    }

    pub fn state(&self) -> ParticipantState {
        self.state
    }

    /// Returns the participant's node once registered.
    pub fn path(&self) -> Option<&ParticipantPath> {
        self.node.as_ref()
    }

    /// Registers under `transaction` and starts watching the new node.
    ///
    /// An order already present in the node is acted upon immediately.
    #[tracing::instrument(skip(self, transaction), fields(transaction = %transaction))]
    pub async fn register(&mut self, transaction: &TransactionPath) -> Result<ParticipantPath> {
        if self.state != ParticipantState::Unregistered {
            return Err(self.invalid_state("Unregistered"));
        }

        let session = &self.session;
        let prefix = self.config.layout.participant_prefix_path(transaction);
        let prefix = prefix.as_str();
        let created = retry_transient(&self.config.store_retry, "register", move || {
            session.create(prefix, &[], CreateMode::EphemeralSequential)
        })
        .await
        .map_err(|(e, attempts)| ParticipantError::from_store("register", attempts, e))?;

        let node = ParticipantPath::new(created);
        self.transaction = Some(transaction.clone());
        self.node = Some(node.clone());
        self.state = ParticipantState::Registered;
        tracing::info!(participant = %node, "registered");

        self.refresh().await?;
        Ok(node)
    }

    /// Consumes notifications and hook completions until the participant
    /// reaches a terminal state.
    #[tracing::instrument(
        skip(self),
        fields(participant = ?self.node.as_ref().map(ParticipantPath::as_str))
    )]
    pub async fn run(&mut self) -> Result<ParticipantOutcome> {
        if self.state == ParticipantState::Unregistered {
            return Err(self.invalid_state("Registered"));
        }

        loop {
            if let Some(outcome) = self.outcome() {
                tracing::info!(?outcome, "participant finished");
                return Ok(outcome);
            }

            let release_deadline = self.release_deadline;
            let step = tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.dispatch(event).await,
                    None => Err(ParticipantError::ConnectionClosed),
                },
                Some(done) = self.completions_rx.recv() => self.on_completion(done).await,
                _ = wait_until(release_deadline) => {
                    tracing::warn!("coordinator did not release the node in time");
                    self.released = true;
                    Ok(())
                }
            };

            if let Err(err) = step {
                self.fail(&err).await;
                return Err(err);
            }
        }
    }

    /// Closes the session, removing the participant node if it still exists.
    pub async fn close(&self) -> Result<()> {
        self.session.close().await?;
        Ok(())
    }

    fn outcome(&self) -> Option<ParticipantOutcome> {
        match self.state {
            ParticipantState::VotedCommitted if self.released => {
                Some(ParticipantOutcome::Committed {
                    attempts: self.commit_attempts,
                })
            }
            ParticipantState::Aborted => Some(ParticipantOutcome::Aborted),
            _ => None,
        }
    }

    async fn dispatch(&mut self, event: WatchedEvent) -> Result<()> {
        match event {
            WatchedEvent::Node { event_type, path } => {
                if self.node.as_ref().map(ParticipantPath::as_str) != Some(path.as_str()) {
                    return Ok(());
                }
                match event_type {
                    EventType::NodeDataChanged | EventType::NodeCreated => self.refresh().await,
                    EventType::NodeDeleted => self.on_node_deleted().await,
                    EventType::NodeChildrenChanged => Ok(()),
                }
            }
            WatchedEvent::SessionStateChanged(state) => self.on_session_state(state),
        }
    }

    fn on_session_state(&self, state: SessionState) -> Result<()> {
        match state {
            SessionState::Connected => {
                tracing::debug!("participant session connected");
                Ok(())
            }
            SessionState::Disconnected => {
                tracing::warn!("participant session disconnected; waiting for reconnect");
                Ok(())
            }
            SessionState::Expired => Err(ParticipantError::SessionExpired),
        }
    }

    /// Re-reads the node, re-arms its watch and acts on what it holds.
    async fn refresh(&mut self) -> Result<()> {
        let Some(node) = self.node.clone() else {
            return Ok(());
        };
        let session = &self.session;
        let path = node.as_str();
        let read = retry_transient(&self.config.store_retry, "read_node", move || {
            session.get_data(path, true)
        })
        .await;

        let (data, stat) = match read {
            Ok(read) => read,
            Err((StoreError::NoNode(_), _)) => return self.on_node_deleted().await,
            Err((e, attempts)) => {
                return Err(ParticipantError::from_store("read_node", attempts, e));
            }
        };

        match NodePayload::parse(&data) {
            Ok(NodePayload::Order(order)) => self.on_order(order, stat.version).await,
            // Our own report, or nothing yet.
            Ok(NodePayload::Report(_) | NodePayload::Empty) => Ok(()),
            Err(e) => {
                tracing::warn!(participant = %node, error = %e, "ignoring unreadable node value");
                Ok(())
            }
        }
    }

    async fn on_order(&mut self, order: CoordinatorOrder, version: Version) -> Result<()> {
        tracing::debug!(%order, state = %self.state, "order received");
        match order {
            CoordinatorOrder::Prepare if self.state.can_prepare() => {
                self.order_version = Some(version);
                self.state = ParticipantState::Preparing;
                self.spawn_prepare();
                Ok(())
            }
            CoordinatorOrder::Commit if self.state.can_commit() => {
                self.order_version = Some(version);
                self.state = ParticipantState::Committing;
                self.spawn_commit();
                Ok(())
            }
            CoordinatorOrder::Abort if self.state.can_abort() => {
                self.order_version = Some(version);
                self.on_abort().await
            }
            CoordinatorOrder::Commit if self.state == ParticipantState::Committing => Ok(()),
            CoordinatorOrder::Abort if self.state == ParticipantState::RollingBack => Ok(()),
            _ => {
                tracing::warn!(
                    %order,
                    state = %self.state,
                    "ignoring order invalid in current state"
                );
                Ok(())
            }
        }
    }

    async fn on_abort(&mut self) -> Result<()> {
        match self.state {
            ParticipantState::Registered => {
                self.state = ParticipantState::Aborted;
                Ok(())
            }
            // The prepare hook is still running; roll back once it returns.
            ParticipantState::Preparing => {
                self.abort_requested = true;
                Ok(())
            }
            ParticipantState::VotedPrepared | ParticipantState::VotedAborted => {
                self.spawn_rollback();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn on_node_deleted(&mut self) -> Result<()> {
        match self.state {
            ParticipantState::Registered | ParticipantState::Preparing => {
                tracing::info!("participant node removed before voting; aborting");
                self.on_abort().await
            }
            ParticipantState::VotedAborted => {
                self.spawn_rollback();
                Ok(())
            }
            ParticipantState::VotedPrepared => {
                let node = self
                    .node
                    .as_ref()
                    .map(ParticipantPath::to_string)
                    .unwrap_or_default();
                Err(ParticipantError::TransactionVanished(node))
            }
            ParticipantState::VotedCommitted => {
                tracing::info!("coordinator released the participant node");
                self.released = true;
                Ok(())
            }
            // COMMIT was already received; the outcome is known.
            _ => Ok(()),
        }
    }

    async fn on_completion(&mut self, done: HookCompletion) -> Result<()> {
        match done {
            HookCompletion::Prepared(result) => {
                if self.abort_requested {
                    self.spawn_rollback();
                    return Ok(());
                }
                match result {
                    Ok(()) => {
                        self.state = ParticipantState::VotedPrepared;
                        self.write_report(ParticipantReport::Prepared).await
                    }
                    Err(e) => {
                        tracing::info!(error = %e, "prepare hook failed; voting ABORTED");
                        self.state = ParticipantState::VotedAborted;
                        self.write_report(ParticipantReport::Aborted).await
                    }
                }
            }
            HookCompletion::Committed { attempts, result } => {
                self.commit_attempts = attempts;
                match result {
                    Ok(()) => {
                        self.write_report(ParticipantReport::Committed).await?;
                        self.state = ParticipantState::VotedCommitted;
                        self.release_deadline = Some(Instant::now() + self.config.release_timeout);
                        Ok(())
                    }
                    Err(e) => {
                        self.state = ParticipantState::CommitFailed;
                        Err(ParticipantError::CommitRetriesExhausted {
                            attempts,
                            reason: e.to_string(),
                        })
                    }
                }
            }
            HookCompletion::RolledBack(result) => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "rollback hook failed");
                }
                self.state = ParticipantState::Aborted;
                Ok(())
            }
        }
    }

    /// Writes a report into the node.
    ///
    /// Votes are conditional on the version the order was read at; a
    /// conflict means a newer order is waiting and will be seen on the next
    /// notification. COMMITTED is written unconditionally.
    async fn write_report(&mut self, report: ParticipantReport) -> Result<()> {
        let Some(node) = self.node.clone() else {
            return Err(self.invalid_state("Registered"));
        };

        let expected = match report {
            ParticipantReport::Committed => None,
            _ => self.order_version,
        };
        let session = &self.session;
        let path = node.as_str();
        let written = retry_transient(&self.config.store_retry, "write_report", move || {
            session.set_data(path, report.payload(), expected)
        })
        .await;

        match written {
            Ok(_) => {
                tracing::info!(participant = %node, %report, "report written");
                Ok(())
            }
            Err((StoreError::BadVersion { .. }, _)) => {
                tracing::info!(
                    participant = %node,
                    %report,
                    "node changed before vote; awaiting new order"
                );
                Ok(())
            }
            Err((StoreError::NoNode(_), _)) if report == ParticipantReport::Committed => {
                tracing::warn!(
                    participant = %node,
                    "node gone before COMMITTED could be reported"
                );
                self.released = true;
                Ok(())
            }
            Err((StoreError::NoNode(_), _)) => self.on_node_deleted().await,
            Err((e, attempts)) => Err(ParticipantError::from_store("write_report", attempts, e)),
        }
    }

    fn spawn_rollback(&mut self) {
        self.abort_requested = false;
        let Some(transaction) = self.transaction.clone() else {
            self.state = ParticipantState::Aborted;
            return;
        };
        self.state = ParticipantState::RollingBack;
        let hooks = Arc::clone(&self.hooks);
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = hooks.rollback(&transaction).await;
            let _ = completions.send(HookCompletion::RolledBack(result));
        });
    }

    fn spawn_prepare(&self) {
        let Some(transaction) = self.transaction.clone() else {
            return;
        };
        let hooks = Arc::clone(&self.hooks);
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = hooks.prepare(&transaction).await;
            let _ = completions.send(HookCompletion::Prepared(result));
        });
    }

    fn spawn_commit(&self) {
        let Some(transaction) = self.transaction.clone() else {
            return;
        };
        let hooks = Arc::clone(&self.hooks);
        let completions = self.completions_tx.clone();
        let policy = self.config.commit_retry;
        tokio::spawn(async move {
            let (attempts, result) = commit_with_retry(&*hooks, &transaction, &policy).await;
            let _ = completions.send(HookCompletion::Committed { attempts, result });
        });
    }

    /// Raises the alert for an error that ends [`Participant::run`].
    async fn fail(&self, err: &ParticipantError) {
        let reason = match err {
            ParticipantError::SessionExpired => AlertReason::SessionExpired,
            ParticipantError::CommitRetriesExhausted { .. } => AlertReason::CommitRetriesExhausted,
            ParticipantError::TransactionVanished(_) => AlertReason::InDoubt,
            ParticipantError::StoreUnavailable { .. } | ParticipantError::Store(_) => {
                AlertReason::StoreFault
            }
            _ => return,
        };
        let alert = OperatorAlert::new(self.transaction.clone(), reason, err.to_string())
            .with_participants(self.node.iter().cloned().collect());
        self.alerts.raise(alert).await;
    }

    fn invalid_state(&self, expected: &str) -> ParticipantError {
        ParticipantError::InvalidState {
            expected: expected.to_string(),
            actual: self.state,
        }
    }
}

/// Runs the commit hook until it succeeds or the policy's attempts run out.
///
/// Returns the number of attempts made and the last result.
async fn commit_with_retry<H: TransactionHooks + ?Sized>(
    hooks: &H,
    transaction: &TransactionPath,
    policy: &RetryPolicy,
) -> (u32, std::result::Result<(), HookError>) {
    let mut attempt = 1;
    loop {
        metrics::counter!("twopc_commit_attempts_total").increment(1);
        match hooks.commit(transaction).await {
            Ok(()) => return (attempt, Ok(())),
            Err(e) if attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(attempt, ?delay, error = %e, "commit attempt failed; retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(attempt, error = %e, "commit attempts exhausted");
                return (attempt, Err(e));
            }
        }
    }
}
