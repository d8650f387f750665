//! Two-phase commit error types.

use coord_store::StoreError;
use thiserror::Error;

use crate::layout::TransactionPath;
use crate::state::{CoordinatorState, ParticipantState};

/// A node payload that is not part of the protocol vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Payload bytes are not valid UTF-8.
    #[error("Payload is not valid UTF-8")]
    InvalidUtf8,

    /// Payload text is not a known order or report.
    #[error("Unknown protocol token: {0}")]
    UnknownToken(String),
}

/// Failure reported by a business hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HookError {
    pub message: String,
}

impl HookError {
    /// Creates a hook error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors that can occur in the coordinator engine.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The coordinator is in an invalid state for the requested operation.
    #[error("Invalid coordinator state: expected {expected}, actual {actual}")]
    InvalidState {
        expected: String,
        actual: CoordinatorState,
    },

    /// The store stayed unreachable for the whole retry budget.
    #[error("Coordination store unavailable during {operation} after {attempts} attempts")]
    StoreUnavailable {
        operation: &'static str,
        attempts: u32,
    },

    /// No participant had registered when prepare was requested.
    #[error("No participants registered under {0}")]
    NoParticipants(TransactionPath),

    /// The coordinator's session expired; the transaction is orphaned.
    #[error("Coordinator session expired")]
    SessionExpired,

    /// The notification channel closed.
    #[error("Coordinator connection closed")]
    ConnectionClosed,

    /// Coordination store error.
    #[error("Coordination store error: {0}")]
    Store(#[from] StoreError),
}

impl CoordinatorError {
    /// Maps a store error that survived the retry loop.
    pub(crate) fn from_store(operation: &'static str, attempts: u32, err: StoreError) -> Self {
        match err {
            StoreError::ConnectionLoss => CoordinatorError::StoreUnavailable {
                operation,
                attempts,
            },
            StoreError::SessionExpired(_) => CoordinatorError::SessionExpired,
            StoreError::SessionClosed(_) => CoordinatorError::ConnectionClosed,
            other => CoordinatorError::Store(other),
        }
    }
}

/// Errors that can occur in the participant engine.
#[derive(Debug, Error)]
pub enum ParticipantError {
    /// The participant is in an invalid state for the requested operation.
    #[error("Invalid participant state: expected {expected}, actual {actual}")]
    InvalidState {
        expected: String,
        actual: ParticipantState,
    },

    /// The store stayed unreachable for the whole retry budget.
    #[error("Coordination store unavailable during {operation} after {attempts} attempts")]
    StoreUnavailable {
        operation: &'static str,
        attempts: u32,
    },

    /// The commit hook kept failing for the whole retry budget.
    #[error("Commit failed after {attempts} attempts: {reason}")]
    CommitRetriesExhausted { attempts: u32, reason: String },

    /// The participant node disappeared while the outcome was still in doubt.
    #[error("Transaction node {0} vanished while in doubt")]
    TransactionVanished(String),

    /// The participant's session expired.
    #[error("Participant session expired")]
    SessionExpired,

    /// The notification channel closed.
    #[error("Participant connection closed")]
    ConnectionClosed,

    /// A node payload could not be understood.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Coordination store error.
    #[error("Coordination store error: {0}")]
    Store(#[from] StoreError),
}

impl ParticipantError {
    /// Maps a store error that survived the retry loop.
    pub(crate) fn from_store(operation: &'static str, attempts: u32, err: StoreError) -> Self {
        match err {
            StoreError::ConnectionLoss => ParticipantError::StoreUnavailable {
                operation,
                attempts,
            },
            StoreError::SessionExpired(_) => ParticipantError::SessionExpired,
            StoreError::SessionClosed(_) => ParticipantError::ConnectionClosed,
            other => ParticipantError::Store(other),
        }
    }
}

/// Convenience type alias for coordinator results.
pub type Result<T> = std::result::Result<T, CoordinatorError>;
