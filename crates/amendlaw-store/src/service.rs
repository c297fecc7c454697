//! `AmendmentService`: the entry point tying Act history, review ledgers and
//! apply together.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use amendlaw_core::{
    Act, ChangeId, ChangeRecord, ChangeSet, ConfidenceLevel, Decision, EngineConfig, Manifest,
    ReviewDecision, ReviewState,
};
use tracing::{info, warn};

use crate::apply::{ReversePatch, apply_changes, apply_reverse};
use crate::history::{ActHistory, Provenance, VersionRecord};
use crate::review::ReviewLedger;
use crate::{ReviewError, StoreError};

/// Result of a successful apply.
#[derive(Debug, Clone)]
pub struct Applied {
    pub act: Arc<Act>,
    pub reverse_patch: ReversePatch,
    pub manifest: Manifest,
}

#[derive(Default)]
pub struct AmendmentService {
    config: EngineConfig,
    history: ActHistory,
    ledgers: Mutex<HashMap<String, Arc<ReviewLedger>>>,
    patches: Mutex<HashMap<(String, u32), ReversePatch>>,
}

fn poisoned(what: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Poisoned(format!("{what}: {e}"))
}

impl AmendmentService {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn history(&self) -> &ActHistory {
        &self.history
    }

    fn ledgers(&self) -> Result<MutexGuard<'_, HashMap<String, Arc<ReviewLedger>>>, StoreError> {
        self.ledgers.lock().map_err(|e| poisoned("ledgers", e))
    }

    fn patches(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<(String, u32), ReversePatch>>, StoreError> {
        self.patches.lock().map_err(|e| poisoned("reverse patches", e))
    }

    // ── Acts ──

    pub fn import_act(&self, act: Act) -> Result<Arc<Act>, StoreError> {
        self.history.import(act)
    }

    pub fn head(&self, act_id: &str) -> Result<Arc<Act>, StoreError> {
        self.history.head(act_id)
    }

    pub fn versions(&self, act_id: &str) -> Result<Vec<VersionRecord>, StoreError> {
        self.history.versions(act_id)
    }

    // ── ChangeSets ──

    /// Open a review ledger for a ChangeSet. The Act version it was resolved
    /// against must be in the history.
    pub fn register_changeset(&self, changeset: ChangeSet) -> Result<Arc<ReviewLedger>, StoreError> {
        let base = self.history.get(&changeset.act_id, changeset.act_version)?;
        let mut ledgers = self.ledgers()?;
        if ledgers.contains_key(&changeset.changeset_id) {
            return Err(StoreError::ChangeSetExists(changeset.changeset_id));
        }
        if changeset.coverage.incomplete {
            warn!(
                changeset_id = %changeset.changeset_id,
                fraction = changeset.coverage.fraction,
                "registering incomplete changeset"
            );
        }
        info!(
            changeset_id = %changeset.changeset_id,
            records = changeset.records.len(),
            "changeset registered"
        );
        let id = changeset.changeset_id.clone();
        let ledger = Arc::new(ReviewLedger::new(Arc::new(changeset), base));
        ledgers.insert(id, Arc::clone(&ledger));
        Ok(ledger)
    }

    pub fn ledger(&self, changeset_id: &str) -> Result<Arc<ReviewLedger>, StoreError> {
        self.ledgers()?
            .get(changeset_id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownChangeSet(changeset_id.to_string()))
    }

    /// Ledger holding `change_id`. Change ids conventionally carry their
    /// ChangeSet id before the `#`; other ids fall back to a scan.
    fn ledger_for(&self, change_id: &ChangeId) -> Result<Arc<ReviewLedger>, StoreError> {
        let ledgers = self.ledgers()?;
        if let Some((prefix, _)) = change_id.0.rsplit_once('#')
            && let Some(ledger) = ledgers.get(prefix)
            && ledger.changeset().record(change_id).is_some()
        {
            return Ok(Arc::clone(ledger));
        }
        ledgers
            .values()
            .find(|l| l.changeset().record(change_id).is_some())
            .cloned()
            .ok_or_else(|| ReviewError::UnknownChange(change_id.clone()).into())
    }

    // ── Review ──

    pub fn submit_decision(
        &self,
        change_id: &ChangeId,
        decision: Decision,
        reviewer_id: &str,
        expected_state: ReviewState,
        comment: Option<String>,
    ) -> Result<ReviewDecision, StoreError> {
        let ledger = self.ledger_for(change_id)?;
        Ok(ledger.submit(change_id, decision, reviewer_id, expected_state, comment)?)
    }

    /// All-or-nothing decision over records of one ChangeSet.
    pub fn bulk_decision(
        &self,
        change_ids: &[ChangeId],
        decision: Decision,
        reviewer_id: &str,
        comment: Option<String>,
    ) -> Result<Vec<ReviewDecision>, StoreError> {
        let first = change_ids.first().ok_or(ReviewError::EmptyBatch)?;
        let ledger = self.ledger_for(first)?;
        Ok(ledger.bulk(change_ids, decision, reviewer_id, comment)?)
    }

    pub fn list_pending(
        &self,
        changeset_id: &str,
        level: Option<ConfidenceLevel>,
    ) -> Result<Vec<ChangeRecord>, StoreError> {
        Ok(self.ledger(changeset_id)?.list_pending(level)?)
    }

    pub fn auto_accept_high(&self, changeset_id: &str) -> Result<Vec<ReviewDecision>, StoreError> {
        Ok(self.ledger(changeset_id)?.auto_accept_high()?)
    }

    // ── Apply / revert ──

    /// Apply every accepted record of a ChangeSet, committing a new version.
    ///
    /// Fails with `version_conflict` if the Act has moved past the version the
    /// ChangeSet was resolved against; the ChangeSet must then be
    /// re-extracted against the new head.
    pub fn apply(&self, changeset_id: &str) -> Result<Applied, StoreError> {
        let ledger = self.ledger(changeset_id)?;
        let changeset = ledger.changeset();
        let head = self.history.head(&changeset.act_id)?;
        if head.version() != changeset.act_version {
            warn!(
                changeset_id,
                resolved_against = changeset.act_version,
                head = head.version(),
                "changeset is stale"
            );
            return Err(StoreError::VersionConflict {
                act_id: changeset.act_id.clone(),
                expected: changeset.act_version,
                actual: head.version(),
            });
        }

        let approved = ledger.accepted()?;
        let outcome = apply_changes(ledger.base(), changeset, &approved)?;
        let provenance = Provenance::Applied {
            changeset_id: changeset_id.to_string(),
            decision_ids: approved.iter().map(|a| a.decision.decision_id).collect(),
        };
        let act = self
            .history
            .commit(changeset.act_version, outcome.act, provenance)?;
        self.patches()?.insert(
            (act.act_id().to_string(), act.version()),
            outcome.reverse_patch.clone(),
        );
        info!(
            changeset_id,
            act_id = act.act_id(),
            version = act.version(),
            count = outcome.manifest.len(),
            "changeset applied"
        );
        Ok(Applied {
            act,
            reverse_patch: outcome.reverse_patch,
            manifest: outcome.manifest,
        })
    }

    /// Undo the apply that produced `version`, which must be the head. The
    /// undo is committed as a new version with the pre-apply lines.
    pub fn revert(&self, act_id: &str, version: u32) -> Result<Arc<Act>, StoreError> {
        let head = self.history.head(act_id)?;
        if head.version() != version {
            return Err(StoreError::VersionConflict {
                act_id: act_id.to_string(),
                expected: version,
                actual: head.version(),
            });
        }
        let patch = self
            .patches()?
            .get(&(act_id.to_string(), version))
            .cloned()
            .ok_or_else(|| StoreError::NoReversePatch {
                act_id: act_id.to_string(),
                version,
            })?;
        let reverted = apply_reverse(&head, &patch)?;
        self.history.commit(
            version,
            reverted,
            Provenance::Reverted {
                reverted_version: version,
            },
        )
    }
}
