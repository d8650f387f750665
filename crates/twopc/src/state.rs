//! Coordinator and participant state machines.

use serde::{Deserialize, Serialize};

/// The state of a transaction as seen by its coordinator.
///
/// State transitions:
/// ```text
/// Init ──► DirCreated ──► AwaitingVotes ──┬──► DecidedCommit ──┬──► Closed
///              │                          │                    └──► NeedsIntervention
///              └──────────────────────────┴──► DecidedAbort ──────► Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CoordinatorState {
    /// No transaction directory yet.
    #[default]
    Init,

    /// Directory exists; participants may register.
    DirCreated,

    /// PREPARE was sent; votes are being collected.
    AwaitingVotes,

    /// Every participant voted PREPARED; COMMIT was sent.
    DecidedCommit,

    /// Some participant dissented or vanished; ABORT was sent.
    DecidedAbort,

    /// Outcome settled and the directory removed (terminal state).
    Closed,

    /// A commit could not be confirmed; the directory is frozen for an
    /// operator (terminal state).
    NeedsIntervention,
}

impl CoordinatorState {
    /// Returns true if PREPARE may be sent.
    pub fn can_prepare(&self) -> bool {
        matches!(self, CoordinatorState::DirCreated)
    }

    /// Returns true if the transaction may still be aborted.
    pub fn can_abort(&self) -> bool {
        matches!(
            self,
            CoordinatorState::DirCreated | CoordinatorState::AwaitingVotes
        )
    }

    /// Returns true once COMMIT or ABORT has been decided.
    pub fn is_decided(&self) -> bool {
        matches!(
            self,
            CoordinatorState::DecidedCommit
                | CoordinatorState::DecidedAbort
                | CoordinatorState::Closed
                | CoordinatorState::NeedsIntervention
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CoordinatorState::Closed | CoordinatorState::NeedsIntervention
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinatorState::Init => "Init",
            CoordinatorState::DirCreated => "DirCreated",
            CoordinatorState::AwaitingVotes => "AwaitingVotes",
            CoordinatorState::DecidedCommit => "DecidedCommit",
            CoordinatorState::DecidedAbort => "DecidedAbort",
            CoordinatorState::Closed => "Closed",
            CoordinatorState::NeedsIntervention => "NeedsIntervention",
        }
    }
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The state of a participant.
///
/// State transitions:
/// ```text
/// Unregistered ──► Registered ──► Preparing ──┬──► VotedPrepared ──► Committing ──┬──► VotedCommitted
///                                             │          │                         └──► CommitFailed
///                                             └──► VotedAborted
///       (ABORT from VotedPrepared or VotedAborted) ──► RollingBack ──► Aborted
///       (ABORT from Registered) ──► Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ParticipantState {
    #[default]
    Unregistered,
    Registered,
    Preparing,
    VotedPrepared,
    VotedAborted,
    Committing,
    VotedCommitted,
    /// The rollback hook is running.
    RollingBack,
    Aborted,
    CommitFailed,
}

impl ParticipantState {
    /// Returns true if a PREPARE order should run the prepare hook.
    pub fn can_prepare(&self) -> bool {
        matches!(self, ParticipantState::Registered)
    }

    /// Returns true if a COMMIT order should run the commit hook.
    pub fn can_commit(&self) -> bool {
        matches!(self, ParticipantState::VotedPrepared)
    }

    /// Returns true if the participant may still learn of an abort.
    pub fn can_abort(&self) -> bool {
        matches!(
            self,
            ParticipantState::Registered
                | ParticipantState::Preparing
                | ParticipantState::VotedPrepared
                | ParticipantState::VotedAborted
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ParticipantState::VotedCommitted
                | ParticipantState::Aborted
                | ParticipantState::CommitFailed
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantState::Unregistered => "Unregistered",
            ParticipantState::Registered => "Registered",
            ParticipantState::Preparing => "Preparing",
            ParticipantState::VotedPrepared => "VotedPrepared",
            ParticipantState::VotedAborted => "VotedAborted",
            ParticipantState::Committing => "Committing",
            ParticipantState::VotedCommitted => "VotedCommitted",
            ParticipantState::RollingBack => "RollingBack",
            ParticipantState::Aborted => "Aborted",
            ParticipantState::CommitFailed => "CommitFailed",
        }
    }
}

impl std::fmt::Display for ParticipantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_states() {
        assert_eq!(CoordinatorState::default(), CoordinatorState::Init);
        assert_eq!(ParticipantState::default(), ParticipantState::Unregistered);
    }

    #[test]
    fn test_coordinator_can_prepare() {
        assert!(!CoordinatorState::Init.can_prepare());
        assert!(CoordinatorState::DirCreated.can_prepare());
        assert!(!CoordinatorState::AwaitingVotes.can_prepare());
        assert!(!CoordinatorState::DecidedCommit.can_prepare());
    }

    #[test]
    fn test_coordinator_can_abort() {
        assert!(CoordinatorState::DirCreated.can_abort());
        assert!(CoordinatorState::AwaitingVotes.can_abort());
        assert!(!CoordinatorState::DecidedCommit.can_abort());
        assert!(!CoordinatorState::DecidedAbort.can_abort());
        assert!(!CoordinatorState::Closed.can_abort());
    }

    #[test]
    fn test_coordinator_terminal_states() {
        assert!(!CoordinatorState::AwaitingVotes.is_terminal());
        assert!(!CoordinatorState::DecidedCommit.is_terminal());
        assert!(CoordinatorState::Closed.is_terminal());
        assert!(CoordinatorState::NeedsIntervention.is_terminal());
        assert!(CoordinatorState::DecidedAbort.is_decided());
        assert!(!CoordinatorState::AwaitingVotes.is_decided());
    }

    #[test]
    fn test_participant_transitions() {
        assert!(ParticipantState::Registered.can_prepare());
        assert!(!ParticipantState::VotedPrepared.can_prepare());
        assert!(ParticipantState::VotedPrepared.can_commit());
        assert!(!ParticipantState::VotedAborted.can_commit());
        assert!(ParticipantState::VotedAborted.can_abort());
        assert!(!ParticipantState::Committing.can_abort());
        assert!(!ParticipantState::RollingBack.can_abort());
        assert!(!ParticipantState::RollingBack.is_terminal());
        assert!(ParticipantState::VotedCommitted.is_terminal());
        assert!(ParticipantState::CommitFailed.is_terminal());
        assert!(!ParticipantState::Committing.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(CoordinatorState::NeedsIntervention.to_string(), "NeedsIntervention");
        assert_eq!(ParticipantState::VotedCommitted.to_string(), "VotedCommitted");
    }

    #[test]
    fn test_serialization() {
        let state = CoordinatorState::AwaitingVotes;
        let json = serde_json::to_string(&state).unwrap();
        let deserialized: CoordinatorState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }
}
