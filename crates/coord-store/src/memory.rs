use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::path;
use tokio::sync::{Mutex, mpsc};

use crate::{
    CreateMode, EventType, Result, SessionId, SessionState, Stat, StoreError, Version,
    WatchedEvent, WriteRecord,
    store::{CoordinationStore, EventReceiver},
};

#[derive(Debug, Clone)]
struct Node {
    data: Vec<u8>,
    version: Version,
    cversion: i64,
    next_sequence: u64,
    ephemeral_owner: Option<SessionId>,
    children: BTreeSet<String>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl Node {
    fn new(data: Vec<u8>, ephemeral_owner: Option<SessionId>) -> Self {
        let now = Utc::now();
        Self {
            data,
            version: Version::initial(),
            cversion: 0,
            next_sequence: 0,
            ephemeral_owner,
            children: BTreeSet::new(),
            created_at: now,
            modified_at: now,
        }
    }

    fn stat(&self) -> Stat {
        Stat {
            version: self.version,
            cversion: self.cversion,
            num_children: self.children.len(),
            ephemeral_owner: self.ephemeral_owner,
            created_at: self.created_at,
            modified_at: self.modified_at,
        }
    }
}

/// Number of writes kept by [`InMemoryCoordinationStore::new`].
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

#[derive(Debug)]
struct SessionEntry {
    events: mpsc::UnboundedSender<WatchedEvent>,
    ephemerals: BTreeSet<String>,
    pending_faults: u32,
    connected: bool,
    /// Shared with every handle of the session.
    end: Arc<OnceLock<SessionEnd>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Expired,
    Closed,
}

impl SessionEnd {
    fn error(self, session: SessionId) -> StoreError {
        match self {
            SessionEnd::Expired => StoreError::SessionExpired(session),
            SessionEnd::Closed => StoreError::SessionClosed(session),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum WatchKind {
    Data,
    Exist,
    Child,
}

#[derive(Debug)]
struct Tree {
    nodes: BTreeMap<String, Node>,
    sessions: HashMap<SessionId, SessionEntry>,
    data_watches: HashMap<String, HashSet<SessionId>>,
    exist_watches: HashMap<String, HashSet<SessionId>>,
    child_watches: HashMap<String, HashSet<SessionId>>,
    history: VecDeque<WriteRecord>,
    history_limit: usize,
}

impl Tree {
    fn new(history_limit: usize) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(path::ROOT.to_string(), Node::new(Vec::new(), None));
        Self {
            nodes,
            sessions: HashMap::new(),
            data_watches: HashMap::new(),
            exist_watches: HashMap::new(),
            child_watches: HashMap::new(),
            history: VecDeque::new(),
            history_limit,
        }
    }

    /// Admits an operation for `session`, consuming one injected fault if any.
    fn admit(&mut self, session: SessionId) -> Result<()> {
        let entry = self
            .sessions
            .get_mut(&session)
            .ok_or(StoreError::SessionClosed(session))?;
        if !entry.connected {
            return Err(StoreError::ConnectionLoss);
        }
        if entry.pending_faults > 0 {
            entry.pending_faults -= 1;
            return Err(StoreError::ConnectionLoss);
        }
        Ok(())
    }

    fn watches_mut(&mut self, kind: WatchKind) -> &mut HashMap<String, HashSet<SessionId>> {
        match kind {
            WatchKind::Data => &mut self.data_watches,
            WatchKind::Exist => &mut self.exist_watches,
            WatchKind::Child => &mut self.child_watches,
        }
    }

    fn arm(&mut self, kind: WatchKind, node_path: &str, session: SessionId) {
        self.watches_mut(kind)
            .entry(node_path.to_string())
            .or_default()
            .insert(session);
    }

    /// Fires and clears every watch of the given kinds registered on `node_path`.
    fn fire(&mut self, node_path: &str, event_type: EventType, kinds: &[WatchKind]) {
        let mut targets: BTreeSet<SessionId> = BTreeSet::new();
        for kind in kinds {
            if let Some(sessions) = self.watches_mut(*kind).remove(node_path) {
                targets.extend(sessions);
            }
        }

        for session in targets {
            if let Some(entry) = self.sessions.get(&session) {
                let _ = entry
                    .events
                    .send(WatchedEvent::node(event_type, node_path.to_string()));
                metrics::counter!("coord_store_watch_events_total", "event" => event_type.as_str())
                    .increment(1);
            }
        }
    }

    fn create_node(
        &mut self,
        owner: SessionId,
        requested: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> Result<String> {
        let parent_path = match requested.rfind('/') {
            Some(0) => path::ROOT.to_string(),
            Some(idx) => requested[..idx].to_string(),
            None => return Err(StoreError::InvalidPath(requested.to_string())),
        };

        let parent = self
            .nodes
            .get_mut(&parent_path)
            .ok_or_else(|| StoreError::NoNode(parent_path.clone()))?;
        if parent.ephemeral_owner.is_some() {
            return Err(StoreError::NoChildrenForEphemerals(parent_path));
        }

        let node_path = if mode.is_sequential() {
            format!("{requested}{:010}", parent.next_sequence)
        } else {
            requested.to_string()
        };
        if !path::is_valid(&node_path) || node_path == path::ROOT {
            return Err(StoreError::InvalidPath(node_path));
        }
        if self.nodes.contains_key(&node_path) {
            return Err(StoreError::NodeExists(node_path));
        }

        let name = path::name(&node_path).to_string();
        if let Some(parent) = self.nodes.get_mut(&parent_path) {
            if mode.is_sequential() {
                parent.next_sequence += 1;
            }
            parent.children.insert(name);
            parent.cversion += 1;
        }

        let ephemeral_owner = mode.is_ephemeral().then_some(owner);
        self.nodes
            .insert(node_path.clone(), Node::new(data.to_vec(), ephemeral_owner));
        if let Some(entry) = ephemeral_owner.and_then(|o| self.sessions.get_mut(&o)) {
            entry.ephemerals.insert(node_path.clone());
        }

        self.fire(&node_path, EventType::NodeCreated, &[WatchKind::Exist]);
        self.fire(
            &parent_path,
            EventType::NodeChildrenChanged,
            &[WatchKind::Child],
        );

        Ok(node_path)
    }

    fn delete_node(&mut self, node_path: &str, expected: Option<Version>) -> Result<()> {
        if node_path == path::ROOT {
            return Err(StoreError::InvalidPath(node_path.to_string()));
        }
        let node = self
            .nodes
            .get(node_path)
            .ok_or_else(|| StoreError::NoNode(node_path.to_string()))?;

        if let Some(expected) = expected
            && node.version != expected
        {
            return Err(StoreError::BadVersion {
                path: node_path.to_string(),
                expected,
                actual: node.version,
            });
        }
        if !node.children.is_empty() {
            return Err(StoreError::NotEmpty(node_path.to_string()));
        }

        let owner = node.ephemeral_owner;
        self.nodes.remove(node_path);
        if let Some(entry) = owner.and_then(|o| self.sessions.get_mut(&o)) {
            entry.ephemerals.remove(node_path);
        }

        let parent_path = path::parent(node_path).unwrap_or(path::ROOT).to_string();
        if let Some(parent) = self.nodes.get_mut(&parent_path) {
            parent.children.remove(path::name(node_path));
            parent.cversion += 1;
        }

        self.fire(
            node_path,
            EventType::NodeDeleted,
            &[WatchKind::Data, WatchKind::Exist, WatchKind::Child],
        );
        self.fire(
            &parent_path,
            EventType::NodeChildrenChanged,
            &[WatchKind::Child],
        );
        Ok(())
    }

    fn set_node_data(
        &mut self,
        session: SessionId,
        node_path: &str,
        data: &[u8],
        expected: Option<Version>,
    ) -> Result<Stat> {
        let node = self
            .nodes
            .get_mut(node_path)
            .ok_or_else(|| StoreError::NoNode(node_path.to_string()))?;

        if let Some(expected) = expected
            && node.version != expected
        {
            return Err(StoreError::BadVersion {
                path: node_path.to_string(),
                expected,
                actual: node.version,
            });
        }

        node.data = data.to_vec();
        node.version = node.version.next();
        node.modified_at = Utc::now();
        let stat = node.stat();

        self.record_write(session, node_path, data);
        self.fire(
            node_path,
            EventType::NodeDataChanged,
            &[WatchKind::Data, WatchKind::Exist],
        );
        Ok(stat)
    }

    fn record_write(&mut self, session: SessionId, node_path: &str, data: &[u8]) {
        if self.history_limit == 0 {
            return;
        }
        if self.history.len() == self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(WriteRecord {
            session,
            path: node_path.to_string(),
            data: data.to_vec(),
        });
    }

    /// Ends a session: removes its session-bound nodes and forgets its watches.
    ///
    /// Nothing about the session is kept in the tree afterwards; its handles
    /// remember how it ended.
    fn end_session(&mut self, session: SessionId, end: SessionEnd) -> bool {
        let Some(entry) = self.sessions.get(&session) else {
            return false;
        };
        let ephemerals: Vec<String> = entry.ephemerals.iter().cloned().collect();

        // Session-bound nodes cannot have children, so any order works.
        for node_path in ephemerals {
            let _ = self.delete_node(&node_path, None);
        }

        for watches in [
            &mut self.data_watches,
            &mut self.exist_watches,
            &mut self.child_watches,
        ] {
            for sessions in watches.values_mut() {
                sessions.remove(&session);
            }
            watches.retain(|_, sessions| !sessions.is_empty());
        }

        if let Some(entry) = self.sessions.remove(&session) {
            let _ = entry.end.set(end);
            if end == SessionEnd::Expired {
                let _ = entry
                    .events
                    .send(WatchedEvent::SessionStateChanged(SessionState::Expired));
            }
        }
        true
    }
}

/// In-memory coordination store for testing and single-process deployments.
///
/// Implements the full watch contract of the store interface: one-shot
/// watches, session-bound nodes removed when their session ends, sequential
/// naming and per-node version checks. Cloning shares the same tree.
#[derive(Clone)]
pub struct InMemoryCoordinationStore {
    tree: Arc<Mutex<Tree>>,
}

impl Default for InMemoryCoordinationStore {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl InMemoryCoordinationStore {
    /// Creates a new store containing only the root node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that keeps at most `limit` recent writes for
    /// [`write_history`](Self::write_history). A limit of zero records nothing.
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            tree: Arc::new(Mutex::new(Tree::new(limit))),
        }
    }

    /// Opens a new session and returns its handle and notification channel.
    ///
    /// The first notification on the channel is `Connected`.
    pub async fn connect(&self) -> (InMemorySession, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SessionId::new();
        let end = Arc::new(OnceLock::new());
        let _ = tx.send(WatchedEvent::SessionStateChanged(SessionState::Connected));

        let mut tree = self.tree.lock().await;
        tree.sessions.insert(
            id,
            SessionEntry {
                events: tx,
                ephemerals: BTreeSet::new(),
                pending_faults: 0,
                connected: true,
                end: Arc::clone(&end),
            },
        );
        tracing::debug!(session = %id, "session opened");

        (
            InMemorySession {
                id,
                end,
                store: self.clone(),
            },
            rx,
        )
    }

    /// Expires a session as if its heartbeats had stopped.
    ///
    /// Its session-bound nodes are deleted (firing watches held by other
    /// sessions) and the session receives `Expired`. Returns false if the
    /// session was not live.
    pub async fn expire_session(&self, session: SessionId) -> bool {
        let expired = self
            .tree
            .lock()
            .await
            .end_session(session, SessionEnd::Expired);
        if expired {
            tracing::info!(%session, "session expired");
        }
        expired
    }

    /// Marks a live session as disconnected. Its operations fail with
    /// `ConnectionLoss` until [`reconnect_session`](Self::reconnect_session).
    pub async fn disconnect_session(&self, session: SessionId) {
        let mut tree = self.tree.lock().await;
        if let Some(entry) = tree.sessions.get_mut(&session) {
            entry.connected = false;
            let _ = entry
                .events
                .send(WatchedEvent::SessionStateChanged(SessionState::Disconnected));
        }
    }

    /// Restores a disconnected session. Watches registered before the
    /// disconnect remain armed.
    pub async fn reconnect_session(&self, session: SessionId) {
        let mut tree = self.tree.lock().await;
        if let Some(entry) = tree.sessions.get_mut(&session) {
            entry.connected = true;
            let _ = entry
                .events
                .send(WatchedEvent::SessionStateChanged(SessionState::Connected));
        }
    }

    /// Makes the next `count` operations of `session` fail with `ConnectionLoss`.
    pub async fn inject_transient_faults(&self, session: SessionId, count: u32) {
        let mut tree = self.tree.lock().await;
        if let Some(entry) = tree.sessions.get_mut(&session) {
            entry.pending_faults += count;
        }
    }

    /// Returns true if a node exists at `node_path`.
    pub async fn node_exists(&self, node_path: &str) -> bool {
        self.tree.lock().await.nodes.contains_key(node_path)
    }

    /// Returns the current data of a node.
    pub async fn node_data(&self, node_path: &str) -> Option<Vec<u8>> {
        self.tree
            .lock()
            .await
            .nodes
            .get(node_path)
            .map(|n| n.data.clone())
    }

    /// Returns the child names of a node in sorted order.
    pub async fn children_of(&self, node_path: &str) -> Vec<String> {
        self.tree
            .lock()
            .await
            .nodes
            .get(node_path)
            .map(|n| n.children.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the most recent `set_data` writes, oldest first, up to the
    /// store's history limit.
    pub async fn write_history(&self) -> Vec<WriteRecord> {
        self.tree.lock().await.history.iter().cloned().collect()
    }

    /// Returns the number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.tree.lock().await.sessions.len()
    }
}

/// A session on an [`InMemoryCoordinationStore`].
#[derive(Clone)]
pub struct InMemorySession {
    id: SessionId,
    end: Arc<OnceLock<SessionEnd>>,
    store: InMemoryCoordinationStore,
}

impl InMemorySession {
    /// Locks the tree for an operation of this session.
    async fn admitted(&self) -> Result<tokio::sync::MutexGuard<'_, Tree>> {
        let mut tree = self.store.tree.lock().await;
        if let Some(end) = self.end.get() {
            return Err(end.error(self.id));
        }
        tree.admit(self.id)?;
        Ok(tree)
    }

    /// Returns the store this session is connected to.
    pub fn store(&self) -> &InMemoryCoordinationStore {
        &self.store
    }
}

#[async_trait]
impl CoordinationStore for InMemorySession {
    fn session_id(&self) -> SessionId {
        self.id
    }

    async fn create(&self, node_path: &str, data: &[u8], mode: CreateMode) -> Result<String> {
        let mut tree = self.admitted().await?;
        tree.create_node(self.id, node_path, data, mode)
    }

    async fn delete(&self, node_path: &str, expected: Option<Version>) -> Result<()> {
        let mut tree = self.admitted().await?;
        tree.delete_node(node_path, expected)
    }

    async fn set_data(
        &self,
        node_path: &str,
        data: &[u8],
        expected: Option<Version>,
    ) -> Result<Stat> {
        let mut tree = self.admitted().await?;
        tree.set_node_data(self.id, node_path, data, expected)
    }

    async fn get_data(&self, node_path: &str, watch: bool) -> Result<(Vec<u8>, Stat)> {
        let mut tree = self.admitted().await?;
        let node = tree
            .nodes
            .get(node_path)
            .ok_or_else(|| StoreError::NoNode(node_path.to_string()))?;
        let result = (node.data.clone(), node.stat());
        if watch {
            tree.arm(WatchKind::Data, node_path, self.id);
        }
        Ok(result)
    }

    async fn get_children(&self, node_path: &str, watch: bool) -> Result<Vec<String>> {
        let mut tree = self.admitted().await?;
        let node = tree
            .nodes
            .get(node_path)
            .ok_or_else(|| StoreError::NoNode(node_path.to_string()))?;
        let children = node.children.iter().cloned().collect();
        if watch {
            tree.arm(WatchKind::Child, node_path, self.id);
        }
        Ok(children)
    }

    async fn exists(&self, node_path: &str, watch: bool) -> Result<Option<Stat>> {
        let mut tree = self.admitted().await?;
        let stat = tree.nodes.get(node_path).map(Node::stat);
        if watch {
            tree.arm(WatchKind::Exist, node_path, self.id);
        }
        Ok(stat)
    }

    async fn close(&self) -> Result<()> {
        let mut tree = self.store.tree.lock().await;
        if tree.end_session(self.id, SessionEnd::Closed) {
            tracing::debug!(session = %self.id, "session closed");
        }
        Ok(())
    }
}
