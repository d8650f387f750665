//! Protocol vocabulary carried in participant node payloads.
//!
//! Payloads are the UTF-8 names of the tokens below. A notification only
//! says that a node changed; readers always re-read the full current value.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Instruction written by the coordinator into a participant node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordinatorOrder {
    Prepare,
    Commit,
    Abort,
}

impl CoordinatorOrder {
    /// Returns the wire token.
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinatorOrder::Prepare => "PREPARE",
            CoordinatorOrder::Commit => "COMMIT",
            CoordinatorOrder::Abort => "ABORT",
        }
    }

    /// Returns the payload bytes written to the store.
    pub fn payload(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

impl std::fmt::Display for CoordinatorOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Vote or status written by a participant into its own node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantReport {
    Prepared,
    Committed,
    Aborted,
}

impl ParticipantReport {
    /// Returns the wire token.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantReport::Prepared => "PREPARED",
            ParticipantReport::Committed => "COMMITTED",
            ParticipantReport::Aborted => "ABORTED",
        }
    }

    /// Returns the payload bytes written to the store.
    pub fn payload(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }

    /// Returns true if no further report may follow this one.
    pub fn is_final(&self) -> bool {
        matches!(self, ParticipantReport::Committed | ParticipantReport::Aborted)
    }
}

impl std::fmt::Display for ParticipantReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Current content of a participant node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePayload {
    /// Freshly registered, nothing written yet.
    Empty,
    Order(CoordinatorOrder),
    Report(ParticipantReport),
}

impl NodePayload {
    /// Parses raw node data.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(data).map_err(|_| ProtocolError::InvalidUtf8)?;
        let payload = match text.trim() {
            "" => NodePayload::Empty,
            "PREPARE" => NodePayload::Order(CoordinatorOrder::Prepare),
            "COMMIT" => NodePayload::Order(CoordinatorOrder::Commit),
            "ABORT" => NodePayload::Order(CoordinatorOrder::Abort),
            "PREPARED" => NodePayload::Report(ParticipantReport::Prepared),
            "COMMITTED" => NodePayload::Report(ParticipantReport::Committed),
            "ABORTED" => NodePayload::Report(ParticipantReport::Aborted),
            other => return Err(ProtocolError::UnknownToken(other.to_string())),
        };
        Ok(payload)
    }
}
