//! Linear version history per Act.
//!
//! Every version is an immutable [`Act`] snapshot. New versions are appended
//! with a compare-and-swap on the head version, so at most one writer can
//! extend a given head.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use amendlaw_core::Act;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::StoreError;

/// How a version came to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Provenance {
    Imported,
    Applied {
        changeset_id: String,
        /// Accepting decisions behind the applied changes.
        decision_ids: Vec<u64>,
    },
    Reverted {
        reverted_version: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: u32,
    pub parent: Option<u32>,
    pub committed_at: DateTime<Utc>,
    pub provenance: Provenance,
}

struct Entry {
    act: Arc<Act>,
    record: VersionRecord,
}

/// In-memory version store for any number of Acts.
#[derive(Default)]
pub struct ActHistory {
    acts: Mutex<HashMap<String, Vec<Entry>>>,
}

impl ActHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<Entry>>>, StoreError> {
        self.acts
            .lock()
            .map_err(|e| StoreError::Poisoned(format!("act history: {e}")))
    }

    /// Register version 1 of a new Act.
    pub fn import(&self, act: Act) -> Result<Arc<Act>, StoreError> {
        let mut acts = self.lock()?;
        if acts.contains_key(act.act_id()) {
            return Err(StoreError::ActExists(act.act_id().to_string()));
        }
        let act = Arc::new(act);
        let record = VersionRecord {
            version: act.version(),
            parent: act.parent(),
            committed_at: Utc::now(),
            provenance: Provenance::Imported,
        };
        info!(act_id = act.act_id(), version = act.version(), lines = act.len(), "act imported");
        acts.insert(
            act.act_id().to_string(),
            vec![Entry {
                act: Arc::clone(&act),
                record,
            }],
        );
        Ok(act)
    }

    /// Latest version of an Act.
    pub fn head(&self, act_id: &str) -> Result<Arc<Act>, StoreError> {
        let acts = self.lock()?;
        acts.get(act_id)
            .and_then(|chain| chain.last())
            .map(|e| Arc::clone(&e.act))
            .ok_or_else(|| StoreError::UnknownAct(act_id.to_string()))
    }

    pub fn get(&self, act_id: &str, version: u32) -> Result<Arc<Act>, StoreError> {
        let acts = self.lock()?;
        let chain = acts
            .get(act_id)
            .ok_or_else(|| StoreError::UnknownAct(act_id.to_string()))?;
        chain
            .iter()
            .find(|e| e.record.version == version)
            .map(|e| Arc::clone(&e.act))
            .ok_or_else(|| StoreError::UnknownVersion {
                act_id: act_id.to_string(),
                version,
            })
    }

    /// Version records, oldest first.
    pub fn versions(&self, act_id: &str) -> Result<Vec<VersionRecord>, StoreError> {
        let acts = self.lock()?;
        let chain = acts
            .get(act_id)
            .ok_or_else(|| StoreError::UnknownAct(act_id.to_string()))?;
        Ok(chain.iter().map(|e| e.record.clone()).collect())
    }

    /// Append `act` as the successor of `expected_head`.
    ///
    /// Fails with `version_conflict` if the head has moved on, or if `act` is
    /// not a direct successor of `expected_head`.
    pub fn commit(
        &self,
        expected_head: u32,
        act: Act,
        provenance: Provenance,
    ) -> Result<Arc<Act>, StoreError> {
        let mut acts = self.lock()?;
        let chain = acts
            .get_mut(act.act_id())
            .ok_or_else(|| StoreError::UnknownAct(act.act_id().to_string()))?;
        let head = chain.last().map_or(0, |e| e.record.version);
        if head != expected_head
            || act.parent() != Some(expected_head)
            || act.version() != expected_head + 1
        {
            warn!(
                act_id = act.act_id(),
                expected = expected_head,
                actual = head,
                "version conflict on commit"
            );
            return Err(StoreError::VersionConflict {
                act_id: act.act_id().to_string(),
                expected: expected_head,
                actual: head,
            });
        }
        let act = Arc::new(act);
        let record = VersionRecord {
            version: act.version(),
            parent: act.parent(),
            committed_at: Utc::now(),
            provenance,
        };
        info!(act_id = act.act_id(), version = act.version(), lines = act.len(), "version committed");
        chain.push(Entry {
            act: Arc::clone(&act),
            record,
        });
        Ok(act)
    }
}
