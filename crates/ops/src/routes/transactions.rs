//! Demonstration transaction endpoints.
//!
//! `POST /transactions` runs a full transaction against the shared in-memory
//! store with in-process participants, optionally scripted to vote ABORTED or
//! to fail their first commit attempts.

use std::collections::VecDeque;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use coord_store::{CoordinationStore, InMemoryCoordinationStore, InMemorySession};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use twopc::{
    Coordinator, CoordinatorConfig, InMemoryAlertSink, InMemoryHooks, Participant,
    ParticipantConfig, ParticipantError, ParticipantOutcome, ParticipantPath, TransactionOutcome,
    TransactionPath, TransactionSnapshot,
};
use uuid::Uuid;

use crate::error::ApiError;

const MAX_PARTICIPANTS: usize = 32;
const HISTORY_LIMIT: usize = 100;

type DemoCoordinator = Coordinator<InMemorySession, InMemoryAlertSink>;
type DemoParticipant = Participant<InMemorySession, InMemoryHooks, InMemoryAlertSink>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub store: InMemoryCoordinationStore,
    pub alerts: InMemoryAlertSink,
    pub coordinator_config: CoordinatorConfig,
    pub participant_config: ParticipantConfig,
    /// Most recent runs, newest first.
    pub history: RwLock<VecDeque<TransactionReport>>,
}

impl AppState {
    async fn record(&self, report: TransactionReport) {
        let mut history = self.history.write().await;
        history.push_front(report);
        history.truncate(HISTORY_LIMIT);
    }
}

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct RunTransactionRequest {
    #[serde(default = "default_participants")]
    pub participants: usize,
    /// Indices of participants whose prepare hook fails.
    #[serde(default)]
    pub abort_votes: Vec<usize>,
    #[serde(default)]
    pub commit_failures: Vec<CommitFailureRequest>,
}

#[derive(Debug, Deserialize)]
pub struct CommitFailureRequest {
    pub participant: usize,
    /// Number of commit attempts that fail before one succeeds.
    pub failures: u32,
}

fn default_participants() -> usize {
    3
}

impl RunTransactionRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.participants == 0 || self.participants > MAX_PARTICIPANTS {
            return Err(ApiError::BadRequest(format!(
                "participants must be between 1 and {MAX_PARTICIPANTS}"
            )));
        }
        let indices = self
            .abort_votes
            .iter()
            .chain(self.commit_failures.iter().map(|f| &f.participant));
        for &index in indices {
            if index >= self.participants {
                return Err(ApiError::BadRequest(format!(
                    "participant index {index} out of range"
                )));
            }
        }
        Ok(())
    }

    fn hooks_for(&self, index: usize) -> InMemoryHooks {
        let hooks = InMemoryHooks::new();
        hooks.set_fail_on_prepare(self.abort_votes.contains(&index));
        if let Some(failure) = self.commit_failures.iter().find(|f| f.participant == index) {
            hooks.set_commit_failures(failure.failures);
        }
        hooks
    }
}

// -- Response types --

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantRun {
    pub path: ParticipantPath,
    pub outcome: Option<ParticipantOutcome>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionReport {
    pub id: Uuid,
    pub transaction: TransactionPath,
    pub outcome: Option<TransactionOutcome>,
    pub error: Option<String>,
    pub status: TransactionSnapshot,
    pub participants: Vec<ParticipantRun>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TransactionReport {
    fn outcome_label(&self) -> &'static str {
        self.outcome.map(|o| o.as_str()).unwrap_or("failed")
    }
}

// -- Handlers --

/// POST /transactions: run one demonstration transaction to completion.
#[tracing::instrument(skip(state, req), fields(participants = req.participants))]
pub async fn run(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RunTransactionRequest>,
) -> Result<(StatusCode, Json<TransactionReport>), ApiError> {
    req.validate()?;

    let report = run_demo(&state, &req).await?;
    metrics::counter!("ops_demo_transactions_total", "outcome" => report.outcome_label())
        .increment(1);
    tracing::info!(
        transaction = %report.transaction,
        outcome = report.outcome_label(),
        "demo transaction finished"
    );

    state.record(report.clone()).await;
    Ok((StatusCode::CREATED, Json(report)))
}

/// GET /transactions: list recent runs, newest first.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<TransactionReport>> {
    Json(state.history.read().await.iter().cloned().collect())
}

/// GET /transactions/{id}: fetch one recent run.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TransactionReport>, ApiError> {
    let id = Uuid::parse_str(&id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))?;
    state
        .history
        .read()
        .await
        .iter()
        .find(|r| r.id == id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Transaction run {id} not found")))
}

async fn run_demo(
    state: &AppState,
    req: &RunTransactionRequest,
) -> Result<TransactionReport, ApiError> {
    let started_at = Utc::now();
    let (session, events) = state.store.connect().await;
    let mut coordinator: DemoCoordinator = Coordinator::new(
        session,
        events,
        state.alerts.clone(),
        state.coordinator_config.clone(),
    );
    let transaction = match coordinator.begin_transaction().await {
        Ok(transaction) => transaction,
        Err(err) => {
            close_coordinator(&coordinator).await;
            return Err(err.into());
        }
    };

    let participants = match enlist(state, req, &coordinator, &transaction).await {
        Ok(participants) => participants,
        Err(err) => {
            abandon(&coordinator).await;
            return Err(err);
        }
    };

    let tasks: Vec<_> = participants
        .into_iter()
        .map(|enlisted| {
            let Enlisted {
                mut participant,
                path,
                session,
            } = enlisted;
            let task = tokio::spawn(async move { participant.run().await });
            (path, session, task)
        })
        .collect();

    let result = coordinator.run().await;
    let status = coordinator.handle().status().await;

    let mut runs = Vec::with_capacity(tasks.len());
    for (path, session, mut task) in tasks {
        let wait = state.coordinator_config.abort_grace;
        let run = match tokio::time::timeout(wait, &mut task).await {
            Ok(Ok(result)) => participant_run(path, result),
            Ok(Err(join_err)) => ParticipantRun {
                path,
                outcome: None,
                error: Some(join_err.to_string()),
            },
            Err(_) => {
                task.abort();
                ParticipantRun {
                    path,
                    outcome: None,
                    error: Some("participant did not finish".to_string()),
                }
            }
        };
        // Closing through a second handle works whether or not the task
        // still owns the participant.
        close_session(&session).await;
        runs.push(run);
    }

    close_coordinator(&coordinator).await;

    let (outcome, error) = match result {
        Ok(outcome) => (Some(outcome), None),
        Err(err) => (None, Some(err.to_string())),
    };
    Ok(TransactionReport {
        id: Uuid::new_v4(),
        transaction,
        outcome,
        error,
        status,
        participants: runs,
        started_at,
        finished_at: Utc::now(),
    })
}

/// A registered participant and a second handle on its session.
struct Enlisted {
    participant: DemoParticipant,
    path: ParticipantPath,
    session: InMemorySession,
}

/// Registers the scripted participants and sends PREPARE.
///
/// Every session opened here is closed again if enlisting fails.
async fn enlist(
    state: &AppState,
    req: &RunTransactionRequest,
    coordinator: &DemoCoordinator,
    transaction: &TransactionPath,
) -> Result<Vec<Enlisted>, ApiError> {
    let mut enlisted = Vec::with_capacity(req.participants);
    for index in 0..req.participants {
        let (session, events) = state.store.connect().await;
        let handle = session.clone();
        let mut participant = Participant::new(
            session,
            events,
            req.hooks_for(index),
            state.alerts.clone(),
            state.participant_config.clone(),
        );
        match participant.register(transaction).await {
            Ok(path) => enlisted.push(Enlisted {
                participant,
                path,
                session: handle,
            }),
            Err(err) => {
                close_session(&handle).await;
                close_all(&enlisted).await;
                return Err(err.into());
            }
        }
    }

    if let Err(err) = coordinator.notify_to_prepare().await {
        close_all(&enlisted).await;
        return Err(err.into());
    }
    Ok(enlisted)
}

/// Aborts an undecided transaction and releases the coordinator session.
async fn abandon(coordinator: &DemoCoordinator) {
    if let Err(err) = coordinator.handle().cancel("demo setup failed").await {
        tracing::warn!(error = %err, "failed to cancel demo transaction");
    }
    close_coordinator(coordinator).await;
}

async fn close_coordinator(coordinator: &DemoCoordinator) {
    if let Err(err) = coordinator.close().await {
        tracing::warn!(error = %err, "failed to close coordinator session");
    }
}

async fn close_all(enlisted: &[Enlisted]) {
    for entry in enlisted {
        close_session(&entry.session).await;
    }
}

async fn close_session(session: &InMemorySession) {
    if let Err(err) = session.close().await {
        tracing::warn!(session = %session.session_id(), error = %err, "failed to close session");
    }
}

fn participant_run(
    path: ParticipantPath,
    result: Result<ParticipantOutcome, ParticipantError>,
) -> ParticipantRun {
    match result {
        Ok(outcome) => ParticipantRun {
            path,
            outcome: Some(outcome),
            error: None,
        },
        Err(err) => ParticipantRun {
            path,
            outcome: None,
            error: Some(err.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(participants: usize) -> RunTransactionRequest {
        RunTransactionRequest {
            participants,
            abort_votes: Vec::new(),
            commit_failures: Vec::new(),
        }
    }

    #[test]
    fn test_rejects_empty_and_oversized_runs() {
        assert!(request(0).validate().is_err());
        assert!(request(MAX_PARTICIPANTS + 1).validate().is_err());
        assert!(request(MAX_PARTICIPANTS).validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_indices() {
        let mut req = request(2);
        req.abort_votes = vec![2];
        assert!(req.validate().is_err());

        let mut req = request(2);
        req.commit_failures = vec![CommitFailureRequest {
            participant: 1,
            failures: 3,
        }];
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_request_defaults_to_three_participants() {
        let req: RunTransactionRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.participants, 3);
        assert!(req.abort_votes.is_empty());
    }
}
