//! Review ledger: the decision log for one ChangeSet.
//!
//! Decisions are append-only. A record's state is derived from its latest
//! decision, and every submission carries the state the reviewer saw, so a
//! decision made against an out-of-date view fails with `stale_review`
//! instead of silently overwriting someone else's.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use amendlaw_core::review::state_of;
use amendlaw_core::{
    Act, ChangeId, ChangeRecord, ChangeSet, ConfidenceLevel, Decision, ReviewDecision,
    ReviewRequirement, ReviewState,
};
use chrono::Utc;
use tracing::{info, warn};

use crate::ReviewError;
use crate::apply::{Approved, Footprint};

/// Reviewer id recorded on decisions made by [`ReviewLedger::auto_accept_high`].
pub const AUTO_REVIEWER: &str = "system:auto-accept";

#[derive(Default)]
struct Log {
    decisions: Vec<ReviewDecision>,
    next_decision: u64,
    next_batch: u64,
}

impl Log {
    fn history<'a>(&'a self, change_id: &'a ChangeId) -> impl Iterator<Item = &'a ReviewDecision> {
        self.decisions.iter().filter(move |d| &d.change_id == change_id)
    }

    fn state(&self, change_id: &ChangeId) -> ReviewState {
        state_of(self.history(change_id))
    }

    fn push(
        &mut self,
        record: &ChangeRecord,
        decision: Decision,
        reviewer_id: &str,
        comment: Option<String>,
        batch_id: Option<String>,
    ) -> ReviewDecision {
        self.next_decision += 1;
        let supersedes = self.history(record.change_id()).last().map(|d| d.decision_id);
        let d = ReviewDecision {
            decision_id: self.next_decision,
            change_id: record.change_id().clone(),
            decision,
            reviewer_id: reviewer_id.to_string(),
            comment,
            timestamp: Utc::now(),
            batch_id,
            requirement: record.requirement(),
            supersedes,
        };
        self.decisions.push(d.clone());
        d
    }
}

pub struct ReviewLedger {
    changeset: Arc<ChangeSet>,
    base: Arc<Act>,
    footprints: HashMap<ChangeId, Footprint>,
    log: Mutex<Log>,
}

impl ReviewLedger {
    /// Open a ledger for `changeset`, whose records were resolved against `base`.
    pub fn new(changeset: Arc<ChangeSet>, base: Arc<Act>) -> Self {
        let footprints = changeset
            .records
            .iter()
            .filter_map(|r| Footprint::of(r, &base).map(|f| (r.change_id().clone(), f)))
            .collect();
        Self {
            changeset,
            base,
            footprints,
            log: Mutex::new(Log::default()),
        }
    }

    pub fn changeset(&self) -> &Arc<ChangeSet> {
        &self.changeset
    }

    pub fn base(&self) -> &Arc<Act> {
        &self.base
    }

    fn lock(&self) -> Result<MutexGuard<'_, Log>, ReviewError> {
        self.log
            .lock()
            .map_err(|e| ReviewError::Poisoned(format!("review ledger: {e}")))
    }

    fn record(&self, change_id: &ChangeId) -> Result<&ChangeRecord, ReviewError> {
        self.changeset
            .record(change_id)
            .ok_or_else(|| ReviewError::UnknownChange(change_id.clone()))
    }

    /// Transition, resolution and conflict checks for one decision.
    ///
    /// `batch_accepts` are records accepted earlier in the same batch.
    fn check(
        &self,
        log: &Log,
        record: &ChangeRecord,
        decision: Decision,
        current: ReviewState,
        batch_accepts: &[&ChangeId],
    ) -> Result<(), ReviewError> {
        let change_id = record.change_id();
        if !current.allows(decision) {
            return Err(ReviewError::InvalidTransition {
                change_id: change_id.clone(),
                from: current,
                decision,
            });
        }
        if decision != Decision::Accepted {
            return Ok(());
        }
        if !record.resolution().is_resolved() {
            return Err(ReviewError::Unresolved(change_id.clone()));
        }
        let Some(mine) = self.footprints.get(change_id) else {
            return Ok(());
        };
        for other in &self.changeset.records {
            let other_id = other.change_id();
            if other_id == change_id {
                continue;
            }
            let accepted =
                log.state(other_id) == ReviewState::Accepted || batch_accepts.contains(&other_id);
            if accepted
                && let Some(theirs) = self.footprints.get(other_id)
                && mine.conflicts(theirs)
            {
                return Err(ReviewError::Conflict {
                    change_id: change_id.clone(),
                    with: other_id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Record one decision.
    ///
    /// `expected_state` is the state the reviewer saw; it must still be the
    /// record's state. Accepting an unresolved record, or one that overlaps
    /// an already-accepted record, fails.
    pub fn submit(
        &self,
        change_id: &ChangeId,
        decision: Decision,
        reviewer_id: &str,
        expected_state: ReviewState,
        comment: Option<String>,
    ) -> Result<ReviewDecision, ReviewError> {
        let record = self.record(change_id)?;
        let mut log = self.lock()?;
        let current = log.state(change_id);
        if current != expected_state {
            return Err(ReviewError::StaleReview {
                change_id: change_id.clone(),
                expected: expected_state,
                actual: current,
            });
        }
        self.check(&log, record, decision, current, &[])?;
        let d = log.push(record, decision, reviewer_id, comment, None);
        info!(
            change_id = %change_id,
            decision = decision.as_str(),
            reviewer = reviewer_id,
            decision_id = d.decision_id,
            "review decision recorded"
        );
        Ok(d)
    }

    /// Apply one decision to several records, all or nothing. The decisions
    /// share a batch id.
    pub fn bulk(
        &self,
        change_ids: &[ChangeId],
        decision: Decision,
        reviewer_id: &str,
        comment: Option<String>,
    ) -> Result<Vec<ReviewDecision>, ReviewError> {
        if change_ids.is_empty() {
            return Err(ReviewError::EmptyBatch);
        }
        let mut seen = HashSet::with_capacity(change_ids.len());
        for id in change_ids {
            if !seen.insert(id) {
                return Err(ReviewError::DuplicateInBatch(id.clone()));
            }
        }
        let records = change_ids
            .iter()
            .map(|id| self.record(id))
            .collect::<Result<Vec<_>, _>>()?;

        let mut log = self.lock()?;
        let mut batch_accepts: Vec<&ChangeId> = Vec::new();
        for record in &records {
            let current = log.state(record.change_id());
            self.check(&log, record, decision, current, &batch_accepts)?;
            if decision == Decision::Accepted {
                batch_accepts.push(record.change_id());
            }
        }

        log.next_batch += 1;
        let batch_id = format!("{}/batch-{}", self.changeset.changeset_id, log.next_batch);
        let decisions: Vec<ReviewDecision> = records
            .iter()
            .map(|r| log.push(r, decision, reviewer_id, comment.clone(), Some(batch_id.clone())))
            .collect();
        info!(
            batch_id = %batch_id,
            decision = decision.as_str(),
            reviewer = reviewer_id,
            count = decisions.len(),
            "bulk decision recorded"
        );
        Ok(decisions)
    }

    pub fn state(&self, change_id: &ChangeId) -> Result<ReviewState, ReviewError> {
        self.record(change_id)?;
        Ok(self.lock()?.state(change_id))
    }

    /// Records awaiting a decision (pending or flagged), optionally only
    /// those at one confidence level. ChangeSet order.
    pub fn list_pending(
        &self,
        level: Option<ConfidenceLevel>,
    ) -> Result<Vec<ChangeRecord>, ReviewError> {
        let log = self.lock()?;
        Ok(self
            .changeset
            .records
            .iter()
            .filter(|r| {
                matches!(
                    log.state(r.change_id()),
                    ReviewState::Pending | ReviewState::Flagged
                )
            })
            .filter(|r| level.is_none_or(|l| r.confidence().level == l))
            .cloned()
            .collect())
    }

    /// Every decision ever recorded for a record, oldest first.
    pub fn history(&self, change_id: &ChangeId) -> Result<Vec<ReviewDecision>, ReviewError> {
        self.record(change_id)?;
        Ok(self.lock()?.history(change_id).cloned().collect())
    }

    /// The full decision log, oldest first.
    pub fn decisions(&self) -> Result<Vec<ReviewDecision>, ReviewError> {
        Ok(self.lock()?.decisions.clone())
    }

    /// Currently accepted records with their accepting decision.
    pub fn accepted(&self) -> Result<Vec<Approved>, ReviewError> {
        let log = self.lock()?;
        Ok(self
            .changeset
            .records
            .iter()
            .filter_map(|r| {
                let last = log.history(r.change_id()).last()?;
                (last.decision == Decision::Accepted).then(|| Approved {
                    record: r.clone(),
                    decision: last.clone(),
                })
            })
            .collect())
    }

    /// Accept every pending record that needs no human sign-off.
    ///
    /// Each acceptance is conflict-checked like a manual one; records that
    /// conflict are left pending.
    pub fn auto_accept_high(&self) -> Result<Vec<ReviewDecision>, ReviewError> {
        let mut accepted = Vec::new();
        for record in &self.changeset.records {
            if record.requirement() != ReviewRequirement::Auto {
                continue;
            }
            match self.submit(
                record.change_id(),
                Decision::Accepted,
                AUTO_REVIEWER,
                ReviewState::Pending,
                Some(format!("auto-accepted at {}", record.confidence().score)),
            ) {
                Ok(d) => accepted.push(d),
                Err(e @ (ReviewError::Conflict { .. } | ReviewError::StaleReview { .. })) => {
                    warn!(change_id = %record.change_id(), error = %e, "auto-accept skipped");
                }
                Err(e) => return Err(e),
            }
        }
        info!(
            changeset_id = %self.changeset.changeset_id,
            count = accepted.len(),
            "auto-accept complete"
        );
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amendlaw_core::{
        ChangeIntent, ChangeOp, Citation, Confidence, Coverage, LineContext, LineId, LineRange,
        Resolution, ResolutionFailure, SectionPath, SourceLine, Validation,
    };

    fn act() -> Act {
        let rows = [
            ("1. Title.", "1"),
            ("2. Definitions.", "2"),
            ("(a) first definition;", "2(a)"),
            ("(b) second definition.", "2(b)"),
            ("3. Penalty.", "3"),
        ];
        Act::from_source_lines(
            "act-r",
            rows.iter()
                .map(|(t, h)| SourceLine {
                    text: t.to_string(),
                    page: None,
                    section_path_hint: Some(h.to_string()),
                })
                .collect(),
        )
        .unwrap()
    }

    fn record(n: usize, op: ChangeOp, range: Option<(u64, u64)>, score: u32) -> ChangeRecord {
        let resolution = match range {
            Some((s, e)) => Resolution::Resolved {
                range: LineRange::new(LineId(s), LineId(e)),
                path: SectionPath::section("2"),
                fuzzy: false,
            },
            None => Resolution::Unresolved {
                failure: ResolutionFailure::ReferenceNotFound {
                    reference: "Section 9".into(),
                },
            },
        };
        ChangeRecord::new(
            ChangeId(format!("cs#{n:03}")),
            ChangeIntent {
                op,
                target_reference: None,
                source_citation: Citation::new("instruction").unwrap(),
                span_index: n,
            },
            resolution,
            Confidence::new(score),
            Validation::default(),
            LineContext::default(),
        )
    }

    fn subst(text: &str) -> ChangeOp {
        ChangeOp::Substitution {
            original_text: Some(text.into()),
            new_text: "x".into(),
        }
    }

    fn ledger(records: Vec<ChangeRecord>) -> ReviewLedger {
        let cs = ChangeSet {
            changeset_id: "cs".into(),
            amendment_id: "amd".into(),
            act_id: "act-r".into(),
            act_version: 1,
            coverage: Coverage::compute(records.len(), &records, 0.8),
            records,
        };
        ReviewLedger::new(Arc::new(cs), Arc::new(act()))
    }

    fn id(n: usize) -> ChangeId {
        ChangeId(format!("cs#{n:03}"))
    }

    #[test]
    fn accept_then_reject() {
        let l = ledger(vec![record(0, subst("first"), Some((3, 3)), 95)]);
        let d1 = l
            .submit(&id(0), Decision::Accepted, "alice", ReviewState::Pending, None)
            .unwrap();
        assert_eq!(l.state(&id(0)).unwrap(), ReviewState::Accepted);
        let d2 = l
            .submit(&id(0), Decision::Rejected, "bob", ReviewState::Accepted, None)
            .unwrap();
        assert_eq!(d2.supersedes, Some(d1.decision_id));
        assert_eq!(l.history(&id(0)).unwrap().len(), 2);
        assert!(l.accepted().unwrap().is_empty());
    }

    #[test]
    fn stale_expected_state_is_rejected() {
        let l = ledger(vec![record(0, subst("first"), Some((3, 3)), 95)]);
        l.submit(&id(0), Decision::Flagged, "alice", ReviewState::Pending, None)
            .unwrap();
        let err = l
            .submit(&id(0), Decision::Accepted, "bob", ReviewState::Pending, None)
            .unwrap_err();
        assert!(matches!(
            err,
            ReviewError::StaleReview {
                actual: ReviewState::Flagged,
                ..
            }
        ));
    }

    #[test]
    fn unresolved_cannot_be_accepted() {
        let l = ledger(vec![record(0, subst("first"), None, 30)]);
        let err = l
            .submit(&id(0), Decision::Accepted, "alice", ReviewState::Pending, None)
            .unwrap_err();
        assert!(matches!(err, ReviewError::Unresolved(_)));
        // Rejecting it is fine.
        l.submit(&id(0), Decision::Rejected, "alice", ReviewState::Pending, None)
            .unwrap();
    }

    #[test]
    fn overlapping_accept_names_the_other_change() {
        let l = ledger(vec![
            record(0, ChangeOp::Deletion { original_text: None }, Some((2, 4)), 95),
            record(1, subst("second"), Some((4, 4)), 95),
        ]);
        l.submit(&id(0), Decision::Accepted, "alice", ReviewState::Pending, None)
            .unwrap();
        let err = l
            .submit(&id(1), Decision::Accepted, "alice", ReviewState::Pending, None)
            .unwrap_err();
        match err {
            ReviewError::Conflict { with, .. } => assert_eq!(with, id(0)),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn bulk_is_all_or_nothing() {
        let l = ledger(vec![
            record(0, subst("first"), Some((3, 3)), 95),
            record(1, subst("second"), None, 95),
        ]);
        let err = l
            .bulk(&[id(0), id(1)], Decision::Accepted, "alice", None)
            .unwrap_err();
        assert!(matches!(err, ReviewError::Unresolved(_)));
        assert_eq!(l.state(&id(0)).unwrap(), ReviewState::Pending);
        assert!(l.decisions().unwrap().is_empty());

        let decisions = l.bulk(&[id(0), id(1)], Decision::Flagged, "alice", None).unwrap();
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].batch_id, decisions[1].batch_id);
        assert_eq!(decisions[0].batch_id.as_deref(), Some("cs/batch-1"));
    }

    #[test]
    fn bulk_checks_conflicts_within_the_batch() {
        let l = ledger(vec![
            record(0, ChangeOp::Deletion { original_text: None }, Some((2, 4)), 95),
            record(1, subst("second"), Some((4, 4)), 95),
        ]);
        let err = l.bulk(&[id(0), id(1)], Decision::Accepted, "alice", None).unwrap_err();
        assert!(matches!(err, ReviewError::Conflict { .. }));
        assert!(matches!(
            l.bulk(&[id(0), id(0)], Decision::Flagged, "alice", None),
            Err(ReviewError::DuplicateInBatch(_))
        ));
        assert!(matches!(
            l.bulk(&[], Decision::Flagged, "alice", None),
            Err(ReviewError::EmptyBatch)
        ));
    }

    #[test]
    fn list_pending_filters_by_level() {
        let l = ledger(vec![
            record(0, subst("first"), Some((3, 3)), 95),
            record(1, subst("second"), Some((4, 4)), 75),
            record(2, subst("third"), Some((5, 5)), 40),
        ]);
        assert_eq!(l.list_pending(None).unwrap().len(), 3);
        let medium = l.list_pending(Some(ConfidenceLevel::Medium)).unwrap();
        assert_eq!(medium.len(), 1);
        assert_eq!(medium[0].change_id(), &id(1));
        l.submit(&id(0), Decision::Accepted, "alice", ReviewState::Pending, None)
            .unwrap();
        assert_eq!(l.list_pending(None).unwrap().len(), 2);
    }

    #[test]
    fn auto_accept_takes_only_high_and_skips_conflicts() {
        let l = ledger(vec![
            record(0, subst("first"), Some((3, 3)), 95),
            record(1, subst("second"), Some((3, 3)), 96),
            record(2, subst("third"), Some((5, 5)), 75),
        ]);
        let accepted = l.auto_accept_high().unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].reviewer_id, AUTO_REVIEWER);
        assert_eq!(l.state(&id(1)).unwrap(), ReviewState::Pending);
        assert_eq!(l.state(&id(2)).unwrap(), ReviewState::Pending);
    }

    #[test]
    fn unknown_change_is_reported() {
        let l = ledger(vec![]);
        assert!(matches!(
            l.state(&id(7)),
            Err(ReviewError::UnknownChange(_))
        ));
    }
}
