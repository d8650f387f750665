use thiserror::Error;

use crate::{SessionId, Version};

/// Errors that can occur when interacting with the coordination store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The node (or the parent of a node being created) does not exist.
    #[error("No node at {0}")]
    NoNode(String),

    /// A node already exists at the requested path.
    #[error("Node already exists at {0}")]
    NodeExists(String),

    /// The expected version did not match the node's current version.
    #[error("Version mismatch at {path}: expected {expected}, found {actual}")]
    BadVersion {
        path: String,
        expected: Version,
        actual: Version,
    },

    /// The node still has children and cannot be deleted.
    #[error("Node {0} has children")]
    NotEmpty(String),

    /// Session-bound nodes cannot have children.
    #[error("Session-bound node {0} cannot have children")]
    NoChildrenForEphemerals(String),

    /// The path is not a well-formed absolute node path.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The connection to the store is temporarily unavailable.
    /// The operation had no effect and may be retried.
    #[error("Connection to the coordination store lost")]
    ConnectionLoss,

    /// The session has expired. Fatal for the connection.
    #[error("Session {0} expired")]
    SessionExpired(SessionId),

    /// The session was closed by its owner.
    #[error("Session {0} is closed")]
    SessionClosed(SessionId),
}

impl StoreError {
    /// Returns true if the operation may succeed when retried with the same intent.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::ConnectionLoss)
    }

    /// Returns true if the error ends the connection for good.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::SessionExpired(_) | StoreError::SessionClosed(_)
        )
    }
}

/// Result type for coordination store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
