//! Review decisions and the per-record state they imply.
//!
//! State is never stored: it is the target state of the latest active
//! decision for a record, or `pending` when there is none.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::change::{ChangeId, ReviewRequirement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Pending,
    Accepted,
    Rejected,
    Flagged,
}

impl ReviewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Flagged => "flagged",
        }
    }

    /// Whether `decision` is a legal transition out of this state.
    ///
    /// ```text
    /// pending  -> accepted | rejected | flagged
    /// flagged  -> accepted | rejected | pending (reopened)
    /// accepted -> rejected | flagged
    /// rejected -> flagged
    /// ```
    pub fn allows(&self, decision: Decision) -> bool {
        use Decision as D;
        match self {
            Self::Pending => matches!(decision, D::Accepted | D::Rejected | D::Flagged),
            Self::Flagged => matches!(decision, D::Accepted | D::Rejected | D::Reopened),
            Self::Accepted => matches!(decision, D::Rejected | D::Flagged),
            Self::Rejected => matches!(decision, D::Flagged),
        }
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accepted,
    Rejected,
    Flagged,
    /// Return a flagged record to `pending`.
    Reopened,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Flagged => "flagged",
            Self::Reopened => "reopened",
        }
    }

    /// State a record is in once this decision is active.
    pub fn target_state(&self) -> ReviewState {
        match self {
            Self::Accepted => ReviewState::Accepted,
            Self::Rejected => ReviewState::Rejected,
            Self::Flagged => ReviewState::Flagged,
            Self::Reopened => ReviewState::Pending,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded decision. Superseded decisions are kept, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub decision_id: u64,
    pub change_id: ChangeId,
    pub decision: Decision,
    pub reviewer_id: String,
    #[serde(default)]
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Shared by every decision written in one bulk operation.
    #[serde(default)]
    pub batch_id: Option<String>,
    /// Requirement in force for the record when the decision was made.
    pub requirement: ReviewRequirement,
    /// The decision this one replaced as active.
    #[serde(default)]
    pub supersedes: Option<u64>,
}

/// Current state from a record's decision history (oldest first).
pub fn state_of<'a>(history: impl IntoIterator<Item = &'a ReviewDecision>) -> ReviewState {
    history
        .into_iter()
        .last()
        .map_or(ReviewState::Pending, |d| d.decision.target_state())
}
