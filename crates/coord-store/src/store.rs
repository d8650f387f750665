use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{CreateMode, Result, SessionId, Stat, StoreError, Version, WatchedEvent};

/// Receiving end of a session's notification channel.
///
/// All watch and session-state notifications for one connection arrive here,
/// one at a time, in the order the store emitted them.
pub type EventReceiver = mpsc::UnboundedReceiver<WatchedEvent>;

/// A connection to a watched hierarchical coordination store.
///
/// Each method that takes `watch: bool` registers a one-shot watch when
/// `watch` is true. A watch fires at most once and must be re-armed by calling
/// the method again. Notifications are delivered on the session's
/// [`EventReceiver`].
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Returns the id of this session.
    fn session_id(&self) -> SessionId;

    /// Creates a node and returns its assigned path.
    ///
    /// For sequential modes `path` is a prefix and the store appends a
    /// 10-digit suffix unique among the parent's children.
    async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> Result<String>;

    /// Deletes a node that has no children.
    ///
    /// If `expected` is set, fails with `BadVersion` unless the node is at
    /// that version.
    async fn delete(&self, path: &str, expected: Option<Version>) -> Result<()>;

    /// Replaces a node's data, returning its new metadata.
    async fn set_data(&self, path: &str, data: &[u8], expected: Option<Version>) -> Result<Stat>;

    /// Reads a node's data and metadata.
    async fn get_data(&self, path: &str, watch: bool) -> Result<(Vec<u8>, Stat)>;

    /// Lists the names of a node's children in sorted order.
    async fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>>;

    /// Returns the node's metadata if it exists.
    ///
    /// A watch is armed even when the node is absent, so its creation is observed.
    async fn exists(&self, path: &str, watch: bool) -> Result<Option<Stat>>;

    /// Closes the session. Session-bound nodes are removed.
    async fn close(&self) -> Result<()>;
}

/// Extension trait providing convenience methods for coordination stores.
#[async_trait]
pub trait CoordinationStoreExt: CoordinationStore {
    /// Creates every missing node along `path` as a persistent, empty node.
    async fn ensure_path(&self, path: &str) -> Result<()> {
        if !common::path::is_valid(path) {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            if self.exists(&current, false).await?.is_some() {
                continue;
            }
            match self.create(&current, &[], CreateMode::Persistent).await {
                Ok(_) | Err(StoreError::NodeExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Deletes a node and its entire subtree, children first.
    ///
    /// Nodes that disappear concurrently are skipped. Returns the number of
    /// nodes this call removed.
    async fn delete_recursive(&self, path: &str) -> Result<usize> {
        let children = match self.get_children(path, false).await {
            Ok(children) => children,
            Err(StoreError::NoNode(_)) => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        for child in children {
            let child_path = common::path::join(path, &child);
            removed += self.delete_recursive(&child_path).await?;
        }

        match self.delete(path, None).await {
            Ok(()) => Ok(removed + 1),
            Err(StoreError::NoNode(_)) => Ok(removed),
            Err(e) => Err(e),
        }
    }
}

// Blanket implementation for all CoordinationStore implementations
impl<T: CoordinationStore + ?Sized> CoordinationStoreExt for T {}
