use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::SessionId;

/// Data version of a node, used for optimistic concurrency control.
///
/// A freshly created node is at version 0; every successful `set_data`
/// increments it by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a freshly created node.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreateMode {
    /// Survives the creating session.
    Persistent,
    /// Survives the creating session; the store appends a unique suffix.
    PersistentSequential,
    /// Removed automatically when the creating session ends.
    Ephemeral,
    /// Session-bound with a store-assigned unique suffix.
    EphemeralSequential,
}

impl CreateMode {
    /// Returns true if the node is bound to the creating session.
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    /// Returns true if the store assigns a unique suffix.
    pub fn is_sequential(&self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

/// Metadata about a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    /// Data version.
    pub version: Version,
    /// Number of changes to the node's children.
    pub cversion: i64,
    /// Number of direct children.
    pub num_children: usize,
    /// Owning session for session-bound nodes.
    pub ephemeral_owner: Option<SessionId>,
    /// When the node was created.
    pub created_at: DateTime<Utc>,
    /// When the node's data was last written.
    pub modified_at: DateTime<Utc>,
}

/// Kind of change reported by a node watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
}

impl EventType {
    /// Returns the event type name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::NodeCreated => "NodeCreated",
            EventType::NodeDeleted => "NodeDeleted",
            EventType::NodeDataChanged => "NodeDataChanged",
            EventType::NodeChildrenChanged => "NodeChildrenChanged",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// The session is connected; pending watches remain registered.
    Connected,
    /// The connection dropped; the session may still recover.
    Disconnected,
    /// The session is gone and its session-bound nodes have been removed.
    Expired,
}

/// A notification delivered to a session.
///
/// Node notifications are edge-triggered: they say *that* something changed,
/// never *what* it changed to. Readers re-read the node to learn its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchedEvent {
    /// A watched node or its child set changed.
    Node {
        event_type: EventType,
        path: String,
    },
    /// The session's connection state changed.
    SessionStateChanged(SessionState),
}

impl WatchedEvent {
    /// Creates a node notification.
    pub fn node(event_type: EventType, path: impl Into<String>) -> Self {
        WatchedEvent::Node {
            event_type,
            path: path.into(),
        }
    }

    /// Returns the path this notification refers to, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            WatchedEvent::Node { path, .. } => Some(path),
            WatchedEvent::SessionStateChanged(_) => None,
        }
    }
}

/// A recorded `set_data` call, kept by the in-memory store for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub session: SessionId,
    pub path: String,
    pub data: Vec<u8>,
}
