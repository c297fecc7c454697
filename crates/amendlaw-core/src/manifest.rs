//! Applied-changes manifest: the export record of one apply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::change::{ChangeId, ChangeKind};
use crate::document::{LineId, LineRange};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedChange {
    pub change_id: ChangeId,
    pub kind: ChangeKind,
    /// Range in the base version.
    pub resolved_range: LineRange,
    pub section_path: String,
    pub citation: String,
    pub reviewer_id: String,
    /// Time of the accepting decision.
    pub timestamp: DateTime<Utc>,
    /// Ids issued by this change in the new version (insertions and
    /// line-count-changing substitutions).
    #[serde(default)]
    pub new_line_ids: Vec<LineId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub act_id: String,
    pub base_version: u32,
    pub new_version: u32,
    pub changeset_id: String,
    /// Entries in application order.
    pub entries: Vec<AppliedChange>,
}

impl Manifest {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
