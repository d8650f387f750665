//! Per-participant vote bookkeeping.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::layout::ParticipantPath;
use crate::message::ParticipantReport;

/// Result of recording a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The report advanced the participant's vote.
    Recorded,
    /// The same report was already recorded.
    Unchanged,
    /// The report would revise a settled vote and was dropped.
    Ignored,
}

/// Last observed report of every participant.
///
/// Votes only move forward: an absent vote may become anything and
/// `PREPARED` may become `COMMITTED`. Once `ABORTED` or `COMMITTED` is
/// recorded nothing replaces it, and a `PREPARED` participant cannot take its
/// vote back.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VoteLedger {
    votes: BTreeMap<ParticipantPath, ParticipantReport>,
}

impl VoteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `report` for `participant` if it moves the vote forward.
    pub fn record(
        &mut self,
        participant: &ParticipantPath,
        report: ParticipantReport,
    ) -> RecordOutcome {
        match self.votes.get(participant) {
            None => {
                self.votes.insert(participant.clone(), report);
                RecordOutcome::Recorded
            }
            Some(current) if *current == report => RecordOutcome::Unchanged,
            Some(current) if current.is_final() => RecordOutcome::Ignored,
            Some(ParticipantReport::Prepared) if report == ParticipantReport::Committed => {
                self.votes.insert(participant.clone(), report);
                RecordOutcome::Recorded
            }
            Some(_) => RecordOutcome::Ignored,
        }
    }

    /// Returns the recorded vote of a participant.
    pub fn get(&self, participant: &ParticipantPath) -> Option<ParticipantReport> {
        self.votes.get(participant).copied()
    }

    /// Returns true if every participant in `participants` has `report`.
    ///
    /// An empty set never satisfies this.
    pub fn all_report<'a>(
        &self,
        participants: impl IntoIterator<Item = &'a ParticipantPath>,
        report: ParticipantReport,
    ) -> bool {
        let mut any = false;
        for participant in participants {
            any = true;
            if self.get(participant) != Some(report) {
                return false;
            }
        }
        any
    }

    /// Returns true if any recorded vote is `ABORTED`.
    pub fn any_aborted(&self) -> bool {
        self.votes.values().any(|v| *v == ParticipantReport::Aborted)
    }

    /// Iterates over recorded votes in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&ParticipantPath, &ParticipantReport)> {
        self.votes.iter()
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }
}
