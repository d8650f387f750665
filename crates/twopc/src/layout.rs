//! Transaction directory layout.
//!
//! ```text
//! <root>/<transaction-prefix><suffix>                        transaction directory
//! <root>/<transaction-prefix><suffix>/<participant-prefix><suffix>   participant node
//! ```

use common::path;
use serde::{Deserialize, Serialize};

/// Store path of a transaction directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionPath(String);

impl TransactionPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the directory name, e.g. `dx0000000003`.
    pub fn name(&self) -> &str {
        path::name(&self.0)
    }
}

impl std::fmt::Display for TransactionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store path of a participant node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantPath(String);

impl ParticipantPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the node name, e.g. `participant-0000000001`.
    pub fn name(&self) -> &str {
        path::name(&self.0)
    }

    /// Returns the transaction directory this node belongs to.
    pub fn transaction(&self) -> Option<TransactionPath> {
        path::parent(&self.0).map(TransactionPath::new)
    }
}

impl std::fmt::Display for ParticipantPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Naming scheme shared by coordinators and participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLayout {
    root: String,
    transaction_prefix: String,
    participant_prefix: String,
}

impl Default for TransactionLayout {
    fn default() -> Self {
        Self {
            root: "/transactions".to_string(),
            transaction_prefix: "dx".to_string(),
            participant_prefix: "participant-".to_string(),
        }
    }
}

impl TransactionLayout {
    /// Creates a layout rooted at `root` with the default prefixes.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Overrides the transaction and participant name prefixes.
    pub fn with_prefixes(
        mut self,
        transaction_prefix: impl Into<String>,
        participant_prefix: impl Into<String>,
    ) -> Self {
        self.transaction_prefix = transaction_prefix.into();
        self.participant_prefix = participant_prefix.into();
        self
    }

    /// Parent node of all transaction directories.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Prefix path passed to a sequential create of a transaction directory.
    pub fn transaction_prefix_path(&self) -> String {
        path::join(&self.root, &self.transaction_prefix)
    }

    /// Prefix path passed to a sequential create of a participant node.
    pub fn participant_prefix_path(&self, transaction: &TransactionPath) -> String {
        path::join(transaction.as_str(), &self.participant_prefix)
    }

    /// Returns true if `name` is a participant node name.
    pub fn is_participant_name(&self, name: &str) -> bool {
        name.starts_with(&self.participant_prefix)
    }

    /// Builds the path of a participant from its node name.
    pub fn participant_path(&self, transaction: &TransactionPath, name: &str) -> ParticipantPath {
        ParticipantPath::new(path::join(transaction.as_str(), name))
    }

    /// Maps a child listing of a transaction directory to participant paths,
    /// skipping anything that is not a participant node.
    pub fn participants_of<'a>(
        &'a self,
        transaction: &'a TransactionPath,
        children: &'a [String],
    ) -> impl Iterator<Item = ParticipantPath> + 'a {
        children
            .iter()
            .filter(|name| self.is_participant_name(name))
            .map(move |name| self.participant_path(transaction, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_paths() {
        let layout = TransactionLayout::default();
        assert_eq!(layout.root(), "/transactions");
        assert_eq!(layout.transaction_prefix_path(), "/transactions/dx");

        let txn = TransactionPath::new("/transactions/dx0000000007");
        assert_eq!(txn.name(), "dx0000000007");
        assert_eq!(
            layout.participant_prefix_path(&txn),
            "/transactions/dx0000000007/participant-"
        );
    }

    #[test]
    fn test_participant_path_knows_its_transaction() {
        let layout = TransactionLayout::default();
        let txn = TransactionPath::new("/transactions/dx0000000001");
        let p = layout.participant_path(&txn, "participant-0000000002");
        assert_eq!(p.as_str(), "/transactions/dx0000000001/participant-0000000002");
        assert_eq!(p.name(), "participant-0000000002");
        assert_eq!(p.transaction(), Some(txn));
    }

    #[test]
    fn test_filters_foreign_children() {
        let layout = TransactionLayout::new("/tx").with_prefixes("t", "p-");
        let txn = TransactionPath::new("/tx/t0000000000");
        let children = vec![
            "p-0000000000".to_string(),
            "lock".to_string(),
            "p-0000000001".to_string(),
        ];
        let participants: Vec<_> = layout.participants_of(&txn, &children).collect();
        assert_eq!(participants.len(), 2);
        assert_eq!(participants[1].as_str(), "/tx/t0000000000/p-0000000001");
    }
}
