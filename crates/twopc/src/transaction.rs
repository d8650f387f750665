//! Coordinator-side transaction record.
//!
//! [`TransactionRecord`] holds everything the coordinator knows about one
//! transaction and decides what happens next. It never touches the store:
//! every method returns a [`FollowUp`] that the coordinator carries out
//! after releasing its lock.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::alert::AlertReason;
use crate::config::CoordinatorConfig;
use crate::error::CoordinatorError;
use crate::layout::{ParticipantPath, TransactionPath};
use crate::message::{CoordinatorOrder, ParticipantReport};
use crate::state::CoordinatorState;
use crate::vote::{RecordOutcome, VoteLedger};

/// How a finished transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionOutcome {
    Committed,
    Aborted,
    /// COMMIT was sent but could not be confirmed; the directory is kept.
    NeedsIntervention,
}

impl TransactionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionOutcome::Committed => "committed",
            TransactionOutcome::Aborted => "aborted",
            TransactionOutcome::NeedsIntervention => "needs_intervention",
        }
    }
}

impl std::fmt::Display for TransactionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Store work the coordinator must do after a state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    Nothing,
    /// Write PREPARE into these participants and start watching them.
    SendPrepare(Vec<ParticipantPath>),
    /// Write the decided order into these participants.
    Broadcast {
        order: CoordinatorOrder,
        targets: Vec<ParticipantPath>,
    },
    /// Delete the transaction subtree.
    Close,
    /// Raise an operator alert and keep the directory.
    Escalate {
        reason: AlertReason,
        detail: String,
        participants: Vec<ParticipantPath>,
    },
}

/// Serializable view of a transaction.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionSnapshot {
    pub path: Option<TransactionPath>,
    pub state: CoordinatorState,
    pub participants: Vec<ParticipantPath>,
    pub departed: Vec<ParticipantPath>,
    pub votes: VoteLedger,
    pub decision: Option<CoordinatorOrder>,
    pub abort_cause: Option<String>,
    pub began_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Everything the coordinator knows about its transaction.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    path: Option<TransactionPath>,
    state: CoordinatorState,
    /// Every participant PREPARE was sent to, including departed ones.
    participants: BTreeSet<ParticipantPath>,
    /// Participants whose node disappeared.
    departed: BTreeSet<ParticipantPath>,
    votes: VoteLedger,
    decision: Option<CoordinatorOrder>,
    abort_cause: Option<String>,
    began_at: Option<DateTime<Utc>>,
    decided_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    deadline: Option<Instant>,
    prepare_timeout: Option<Duration>,
    confirmation_timeout: Duration,
    abort_grace: Duration,
}

impl TransactionRecord {
    /// Creates a record in `Init` using the deadlines of `config`.
    pub fn new(config: &CoordinatorConfig) -> Self {
        Self {
            path: None,
            state: CoordinatorState::Init,
            participants: BTreeSet::new(),
            departed: BTreeSet::new(),
            votes: VoteLedger::new(),
            decision: None,
            abort_cause: None,
            began_at: None,
            decided_at: None,
            closed_at: None,
            deadline: None,
            prepare_timeout: config.prepare_timeout,
            confirmation_timeout: config.commit_confirmation_timeout,
            abort_grace: config.abort_grace,
        }
    }

    pub fn path(&self) -> Option<&TransactionPath> {
        self.path.as_ref()
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn decision(&self) -> Option<CoordinatorOrder> {
        self.decision
    }

    pub fn votes(&self) -> &VoteLedger {
        &self.votes
    }

    pub fn began_at(&self) -> Option<DateTime<Utc>> {
        self.began_at
    }

    /// Next time [`on_deadline`](Self::on_deadline) has work to do.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true if `participant` was sent PREPARE.
    pub fn knows(&self, participant: &ParticipantPath) -> bool {
        self.participants.contains(participant)
    }

    /// Participants whose node is still expected to exist.
    pub fn active(&self) -> Vec<ParticipantPath> {
        self.participants.difference(&self.departed).cloned().collect()
    }

    /// Returns true while the coordinator needs notifications about members.
    pub fn is_watching(&self) -> bool {
        matches!(
            self.state,
            CoordinatorState::AwaitingVotes
                | CoordinatorState::DecidedCommit
                | CoordinatorState::DecidedAbort
        )
    }

    /// Records the created directory. `Init → DirCreated`.
    pub fn dir_created(&mut self, path: TransactionPath) -> Result<(), CoordinatorError> {
        self.expect_state(CoordinatorState::Init)?;
        self.path = Some(path);
        self.state = CoordinatorState::DirCreated;
        self.began_at = Some(Utc::now());
        Ok(())
    }

    /// Fixes the initial participant set. `DirCreated → AwaitingVotes`.
    pub fn begin_prepare(
        &mut self,
        members: Vec<ParticipantPath>,
    ) -> Result<FollowUp, CoordinatorError> {
        if !self.state.can_prepare() {
            return Err(self.invalid_state("DirCreated"));
        }
        if members.is_empty() {
            let path = self.path.clone().unwrap_or_else(|| TransactionPath::new(""));
            return Err(CoordinatorError::NoParticipants(path));
        }

        self.participants.extend(members.iter().cloned());
        self.state = CoordinatorState::AwaitingVotes;
        self.deadline = self.prepare_timeout.map(|t| Instant::now() + t);
        Ok(FollowUp::SendPrepare(members))
    }

    /// Reconciles the known set with a fresh child listing.
    ///
    /// Known participants missing from `current` have vanished. Before the
    /// decision, unknown ones are late joiners and get PREPARE; after it
    /// they are ignored.
    pub fn on_membership(&mut self, current: &[ParticipantPath]) -> FollowUp {
        let present: BTreeSet<&ParticipantPath> = current.iter().collect();
        let gone: Vec<ParticipantPath> = self
            .active()
            .into_iter()
            .filter(|p| !present.contains(p))
            .collect();

        if self.state == CoordinatorState::DecidedCommit {
            if gone.is_empty() {
                return FollowUp::Nothing;
            }
            self.departed.extend(gone.iter().cloned());
            return self.lost_after_commit(&gone);
        }

        let mut follow_up = FollowUp::Nothing;
        for participant in gone {
            let next = self.on_vanished(&participant);
            if next != FollowUp::Nothing {
                follow_up = next;
            }
        }
        if let FollowUp::Broadcast { targets, .. } = &mut follow_up {
            *targets = self.active();
        }
        if follow_up != FollowUp::Nothing || self.state != CoordinatorState::AwaitingVotes {
            return follow_up;
        }

        let newcomers: Vec<ParticipantPath> = current
            .iter()
            .filter(|p| !self.participants.contains(*p))
            .cloned()
            .collect();
        if newcomers.is_empty() {
            return FollowUp::Nothing;
        }
        self.participants.extend(newcomers.iter().cloned());
        FollowUp::SendPrepare(newcomers)
    }

    /// Handles a participant whose node no longer exists.
    pub fn on_vanished(&mut self, participant: &ParticipantPath) -> FollowUp {
        if !self.participants.contains(participant) || !self.departed.insert(participant.clone())
        {
            return FollowUp::Nothing;
        }

        match self.state {
            CoordinatorState::AwaitingVotes => {
                // A vanished member counts as ABORTED unless it already voted.
                if self.votes.get(participant) == Some(ParticipantReport::Prepared) {
                    self.decide_abort(format!("prepared participant {participant} vanished"))
                } else {
                    self.votes.record(participant, ParticipantReport::Aborted);
                    self.decide_abort(format!("participant {participant} vanished"))
                }
            }
            CoordinatorState::DecidedCommit => {
                self.lost_after_commit(std::slice::from_ref(participant))
            }
            CoordinatorState::DecidedAbort if self.active().is_empty() => FollowUp::Close,
            _ => FollowUp::Nothing,
        }
    }

    /// Handles a report read from a participant node.
    pub fn on_report(
        &mut self,
        participant: &ParticipantPath,
        report: ParticipantReport,
    ) -> FollowUp {
        if !self.participants.contains(participant) {
            return FollowUp::Nothing;
        }
        if self.votes.record(participant, report) != RecordOutcome::Recorded {
            return FollowUp::Nothing;
        }

        match (self.state, report) {
            (CoordinatorState::AwaitingVotes, ParticipantReport::Aborted) => {
                self.decide_abort(format!("participant {participant} voted ABORTED"))
            }
            (CoordinatorState::AwaitingVotes, ParticipantReport::Prepared) => {
                if !self.votes.any_aborted()
                    && self
                        .votes
                        .all_report(&self.participants, ParticipantReport::Prepared)
                {
                    self.decide_commit()
                } else {
                    FollowUp::Nothing
                }
            }
            (CoordinatorState::DecidedCommit, ParticipantReport::Committed) => {
                self.check_commit_confirmed()
            }
            _ => FollowUp::Nothing,
        }
    }

    /// Handles an expired phase deadline. Does nothing before `now` reaches it.
    pub fn on_deadline(&mut self, now: Instant) -> FollowUp {
        match self.deadline {
            Some(deadline) if deadline <= now => {}
            _ => return FollowUp::Nothing,
        }
        self.deadline = None;

        match self.state {
            CoordinatorState::AwaitingVotes => {
                self.decide_abort("prepare deadline expired".to_string())
            }
            CoordinatorState::DecidedCommit => {
                let unconfirmed: Vec<ParticipantPath> = self
                    .participants
                    .iter()
                    .filter(|p| self.votes.get(p) != Some(ParticipantReport::Committed))
                    .cloned()
                    .collect();
                self.state = CoordinatorState::NeedsIntervention;
                FollowUp::Escalate {
                    reason: AlertReason::CommitUnconfirmed,
                    detail: format!(
                        "{} of {} participants did not confirm commit in time",
                        unconfirmed.len(),
                        self.participants.len()
                    ),
                    participants: unconfirmed,
                }
            }
            CoordinatorState::DecidedAbort => FollowUp::Close,
            _ => FollowUp::Nothing,
        }
    }

    /// Aborts on request. Only valid before the decision.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<FollowUp, CoordinatorError> {
        if !self.state.can_abort() {
            return Err(self.invalid_state("DirCreated or AwaitingVotes"));
        }
        Ok(self.decide_abort(reason.into()))
    }

    /// Records that the subtree was removed. `Decided* → Closed`.
    pub fn closed(&mut self) {
        if matches!(
            self.state,
            CoordinatorState::DecidedCommit | CoordinatorState::DecidedAbort
        ) {
            self.state = CoordinatorState::Closed;
            self.closed_at = Some(Utc::now());
            self.deadline = None;
        }
    }

    /// Marks the transaction as needing an operator, whatever its state.
    pub fn freeze(&mut self) {
        if !self.state.is_terminal() {
            self.state = CoordinatorState::NeedsIntervention;
            self.deadline = None;
        }
    }

    /// Returns the outcome once the state is terminal.
    pub fn outcome(&self) -> Option<TransactionOutcome> {
        match (self.state, self.decision) {
            (CoordinatorState::Closed, Some(CoordinatorOrder::Commit)) => {
                Some(TransactionOutcome::Committed)
            }
            (CoordinatorState::Closed, _) => Some(TransactionOutcome::Aborted),
            (CoordinatorState::NeedsIntervention, _) => Some(TransactionOutcome::NeedsIntervention),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> TransactionSnapshot {
        TransactionSnapshot {
            path: self.path.clone(),
            state: self.state,
            participants: self.participants.iter().cloned().collect(),
            departed: self.departed.iter().cloned().collect(),
            votes: self.votes.clone(),
            decision: self.decision,
            abort_cause: self.abort_cause.clone(),
            began_at: self.began_at,
            decided_at: self.decided_at,
            closed_at: self.closed_at,
        }
    }

    fn decide_commit(&mut self) -> FollowUp {
        self.state = CoordinatorState::DecidedCommit;
        self.decision = Some(CoordinatorOrder::Commit);
        self.decided_at = Some(Utc::now());
        self.deadline = Some(Instant::now() + self.confirmation_timeout);
        metrics::counter!("twopc_decisions_total", "decision" => "commit").increment(1);
        FollowUp::Broadcast {
            order: CoordinatorOrder::Commit,
            targets: self.active(),
        }
    }

    fn decide_abort(&mut self, cause: String) -> FollowUp {
        self.state = CoordinatorState::DecidedAbort;
        self.decision = Some(CoordinatorOrder::Abort);
        self.abort_cause = Some(cause);
        self.decided_at = Some(Utc::now());
        metrics::counter!("twopc_decisions_total", "decision" => "abort").increment(1);

        let targets = self.active();
        if targets.is_empty() {
            return FollowUp::Close;
        }
        self.deadline = Some(Instant::now() + self.abort_grace);
        FollowUp::Broadcast {
            order: CoordinatorOrder::Abort,
            targets,
        }
    }

    /// Handles members that left after COMMIT was decided. Every one of them
    /// that had not reported COMMITTED goes into a single escalation.
    fn lost_after_commit(&mut self, gone: &[ParticipantPath]) -> FollowUp {
        let unconfirmed: Vec<ParticipantPath> = gone
            .iter()
            .filter(|p| self.votes.get(p) != Some(ParticipantReport::Committed))
            .cloned()
            .collect();
        if unconfirmed.is_empty() {
            return self.check_commit_confirmed();
        }

        self.state = CoordinatorState::NeedsIntervention;
        self.deadline = None;
        let detail = match unconfirmed.as_slice() {
            [one] => format!("participant {one} vanished before confirming commit"),
            many => format!(
                "{} participants vanished before confirming commit",
                many.len()
            ),
        };
        FollowUp::Escalate {
            reason: AlertReason::ParticipantLostAfterCommit,
            detail,
            participants: unconfirmed,
        }
    }

    fn check_commit_confirmed(&mut self) -> FollowUp {
        if self
            .votes
            .all_report(&self.participants, ParticipantReport::Committed)
        {
            FollowUp::Close
        } else {
            FollowUp::Nothing
        }
    }

    fn expect_state(&self, expected: CoordinatorState) -> Result<(), CoordinatorError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid_state(expected.as_str()))
        }
    }

    fn invalid_state(&self, expected: &str) -> CoordinatorError {
        CoordinatorError::InvalidState {
            expected: expected.to_string(),
            actual: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CoordinatorConfig {
        CoordinatorConfig::default()
            .with_prepare_timeout(Some(Duration::from_secs(10)))
            .with_commit_confirmation_timeout(Duration::from_secs(10))
            .with_abort_grace(Duration::from_secs(1))
    }

    fn p(n: u32) -> ParticipantPath {
        ParticipantPath::new(format!("/transactions/dx0000000000/participant-{n:010}"))
    }

    fn awaiting(members: &[ParticipantPath]) -> TransactionRecord {
        let mut record = TransactionRecord::new(&config());
        record
            .dir_created(TransactionPath::new("/transactions/dx0000000000"))
            .unwrap();
        let follow_up = record.begin_prepare(members.to_vec()).unwrap();
        assert_eq!(follow_up, FollowUp::SendPrepare(members.to_vec()));
        record
    }

    #[test]
    fn test_begin_requires_init() {
        let mut record = TransactionRecord::new(&config());
        record.dir_created(TransactionPath::new("/t/dx0")).unwrap();
        let err = record.dir_created(TransactionPath::new("/t/dx1")).unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidState { .. }));
    }

    #[test]
    fn test_prepare_without_participants() {
        let mut record = TransactionRecord::new(&config());
        record.dir_created(TransactionPath::new("/t/dx0")).unwrap();
        let err = record.begin_prepare(Vec::new()).unwrap_err();
        assert!(matches!(err, CoordinatorError::NoParticipants(_)));
        assert_eq!(record.state(), CoordinatorState::DirCreated);
    }

    #[test]
    fn test_unanimous_prepared_commits() {
        let members = [p(0), p(1), p(2)];
        let mut record = awaiting(&members);

        assert_eq!(record.on_report(&p(0), ParticipantReport::Prepared), FollowUp::Nothing);
        assert_eq!(record.on_report(&p(1), ParticipantReport::Prepared), FollowUp::Nothing);
        assert_eq!(
            record.on_report(&p(2), ParticipantReport::Prepared),
            FollowUp::Broadcast {
                order: CoordinatorOrder::Commit,
                targets: members.to_vec(),
            }
        );
        assert_eq!(record.state(), CoordinatorState::DecidedCommit);

        record.on_report(&p(0), ParticipantReport::Committed);
        record.on_report(&p(1), ParticipantReport::Committed);
        assert_eq!(
            record.on_report(&p(2), ParticipantReport::Committed),
            FollowUp::Close
        );
        record.closed();
        assert_eq!(record.outcome(), Some(TransactionOutcome::Committed));
    }

    #[test]
    fn test_abort_dominates_in_any_order() {
        let members = [p(0), p(1), p(2)];
        let sequences: [[usize; 3]; 3] = [[0, 1, 2], [2, 0, 1], [1, 2, 0]];

        for sequence in sequences {
            let mut record = awaiting(&members);
            let mut decided = None;
            for idx in sequence {
                let report = if idx == 1 {
                    ParticipantReport::Aborted
                } else {
                    ParticipantReport::Prepared
                };
                if let FollowUp::Broadcast { order, targets } =
                    record.on_report(&members[idx], report)
                {
                    assert!(decided.is_none(), "decided twice");
                    decided = Some((order, targets));
                }
            }
            let (order, targets) = decided.unwrap();
            assert_eq!(order, CoordinatorOrder::Abort);
            assert_eq!(targets.len(), 3);
            assert_eq!(record.decision(), Some(CoordinatorOrder::Abort));
        }
    }

    #[test]
    fn test_prepared_after_abort_never_commits() {
        let members = [p(0), p(1)];
        let mut record = awaiting(&members);
        record.on_report(&p(0), ParticipantReport::Aborted);
        assert_eq!(record.on_report(&p(1), ParticipantReport::Prepared), FollowUp::Nothing);
        assert_eq!(record.state(), CoordinatorState::DecidedAbort);
    }

    #[test]
    fn test_vanished_member_aborts_remaining() {
        let members = [p(0), p(1), p(2)];
        let mut record = awaiting(&members);
        record.on_report(&p(0), ParticipantReport::Prepared);

        let follow_up = record.on_membership(&[p(0), p(2)]);
        assert_eq!(
            follow_up,
            FollowUp::Broadcast {
                order: CoordinatorOrder::Abort,
                targets: vec![p(0), p(2)],
            }
        );
        assert_eq!(record.votes().get(&p(1)), Some(ParticipantReport::Aborted));
    }

    #[test]
    fn test_late_joiner_is_prepared_and_counted() {
        let mut record = awaiting(&[p(0)]);
        assert_eq!(
            record.on_membership(&[p(0), p(1)]),
            FollowUp::SendPrepare(vec![p(1)])
        );

        assert_eq!(record.on_report(&p(0), ParticipantReport::Prepared), FollowUp::Nothing);
        assert!(matches!(
            record.on_report(&p(1), ParticipantReport::Prepared),
            FollowUp::Broadcast {
                order: CoordinatorOrder::Commit,
                ..
            }
        ));
    }

    #[test]
    fn test_joiner_after_decision_is_ignored() {
        let mut record = awaiting(&[p(0)]);
        record.on_report(&p(0), ParticipantReport::Prepared);
        assert_eq!(record.on_membership(&[p(0), p(1)]), FollowUp::Nothing);
        assert!(!record.knows(&p(1)));
        assert_eq!(record.on_report(&p(1), ParticipantReport::Prepared), FollowUp::Nothing);
    }

    #[test]
    fn test_lost_after_commit_escalates() {
        let mut record = awaiting(&[p(0), p(1)]);
        record.on_report(&p(0), ParticipantReport::Prepared);
        record.on_report(&p(1), ParticipantReport::Prepared);
        record.on_report(&p(0), ParticipantReport::Committed);

        // A participant that confirmed may leave.
        assert_eq!(record.on_vanished(&p(0)), FollowUp::Nothing);
        match record.on_vanished(&p(1)) {
            FollowUp::Escalate {
                reason,
                participants,
                ..
            } => {
                assert_eq!(reason, AlertReason::ParticipantLostAfterCommit);
                assert_eq!(participants, vec![p(1)]);
            }
            other => panic!("unexpected follow-up: {other:?}"),
        }
        assert_eq!(record.outcome(), Some(TransactionOutcome::NeedsIntervention));
    }

    #[test]
    fn test_every_member_lost_after_commit_is_escalated_together() {
        let members = [p(0), p(1), p(2)];
        let mut record = awaiting(&members);
        for member in &members {
            record.on_report(member, ParticipantReport::Prepared);
        }
        record.on_report(&p(0), ParticipantReport::Committed);

        match record.on_membership(&[]) {
            FollowUp::Escalate {
                reason,
                participants,
                detail,
            } => {
                assert_eq!(reason, AlertReason::ParticipantLostAfterCommit);
                assert_eq!(participants, vec![p(1), p(2)]);
                assert!(detail.starts_with("2 participants"));
            }
            other => panic!("unexpected follow-up: {other:?}"),
        }
        assert_eq!(record.state(), CoordinatorState::NeedsIntervention);
        assert!(record.active().is_empty());
    }

    #[test]
    fn test_confirmed_members_may_leave_together() {
        let members = [p(0), p(1)];
        let mut record = awaiting(&members);
        for member in &members {
            record.on_report(member, ParticipantReport::Prepared);
        }
        record.on_report(&p(0), ParticipantReport::Committed);
        assert_eq!(record.on_membership(&[p(1)]), FollowUp::Nothing);
        assert_eq!(
            record.on_report(&p(1), ParticipantReport::Committed),
            FollowUp::Close
        );
    }

    #[test]
    fn test_deadlines() {
        let mut record = awaiting(&[p(0), p(1)]);
        let deadline = record.deadline().unwrap();
        assert_eq!(
            record.on_deadline(deadline - Duration::from_millis(1)),
            FollowUp::Nothing
        );
        assert!(matches!(
            record.on_deadline(deadline),
            FollowUp::Broadcast {
                order: CoordinatorOrder::Abort,
                ..
            }
        ));

        let grace = record.deadline().unwrap();
        assert_eq!(record.on_deadline(grace), FollowUp::Close);
        record.closed();
        assert_eq!(record.outcome(), Some(TransactionOutcome::Aborted));
    }

    #[test]
    fn test_unconfirmed_commit_escalates() {
        let mut record = awaiting(&[p(0), p(1)]);
        record.on_report(&p(0), ParticipantReport::Prepared);
        record.on_report(&p(1), ParticipantReport::Prepared);
        record.on_report(&p(1), ParticipantReport::Committed);

        let deadline = record.deadline().unwrap();
        match record.on_deadline(deadline) {
            FollowUp::Escalate {
                reason,
                participants,
                ..
            } => {
                assert_eq!(reason, AlertReason::CommitUnconfirmed);
                assert_eq!(participants, vec![p(0)]);
            }
            other => panic!("unexpected follow-up: {other:?}"),
        }
        assert_eq!(record.state(), CoordinatorState::NeedsIntervention);
    }

    #[test]
    fn test_cancel() {
        let mut record = TransactionRecord::new(&config());
        record.dir_created(TransactionPath::new("/t/dx0")).unwrap();
        assert_eq!(record.cancel("operator").unwrap(), FollowUp::Close);
        assert_eq!(record.state(), CoordinatorState::DecidedAbort);
        assert!(record.cancel("again").is_err());

        let snapshot = record.snapshot();
        assert_eq!(snapshot.abort_cause.as_deref(), Some("operator"));
    }

    #[test]
    fn test_abort_closes_when_members_leave() {
        let mut record = awaiting(&[p(0), p(1)]);
        record.on_report(&p(0), ParticipantReport::Aborted);
        assert_eq!(record.on_membership(&[p(1)]), FollowUp::Nothing);
        assert_eq!(record.on_membership(&[]), FollowUp::Close);
    }
}
