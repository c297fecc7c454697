//! End-to-end scenarios: extract, review and apply against a versioned Act.

use std::sync::Arc;

use amendlaw_core::{
    Act, Amendment, ChangeId, ChangeIntent, ChangeKind, ChangeOp, ChangeRecord, ChangeSet,
    Citation, Confidence, ConfidenceLevel, Coverage, Decision, EngineConfig, LineContext, LineId,
    LineRange, Resolution, ResolutionFailure, ReviewDecision, ReviewRequirement, ReviewState,
    SectionPath, SourceLine, Validation, infer_source_lines,
};
use amendlaw_extract::{PatternPass, run_dual_pass};
use amendlaw_store::{
    AmendmentService, ApplyError, Approved, StoreError, apply_changes, apply_reverse,
};
use chrono::Utc;
use proptest::prelude::*;

const ACT_TEXT: &str = "\
THE SAMPLE ACT, 2020
15. Appeals.
(1) Any person aggrieved by an order of the District Magistrate may appeal.
(2) An appeal shall be filed within thirty days of the order.
16. Powers of the District Magistrate.
(1) The District Magistrate may call for records.
17. Penalty.
(1) Whoever contravenes this Act shall be liable to a fine.";

fn sample_act() -> Act {
    Act::from_source_lines("sample-act", infer_source_lines(ACT_TEXT)).unwrap()
}

async fn extract(amendment_id: &str, text: &str, act: &Act) -> ChangeSet {
    let amendment = Amendment::from_text(amendment_id, text);
    run_dual_pass(
        &PatternPass::new("primary"),
        &PatternPass::new("secondary"),
        &amendment,
        act,
        &EngineConfig::default(),
    )
    .await
    .unwrap()
}

fn service_with_act() -> (AmendmentService, Arc<Act>) {
    let service = AmendmentService::new(EngineConfig::default());
    let act = service.import_act(sample_act()).unwrap();
    (service, act)
}

// ── Scenarios ──

#[tokio::test]
async fn single_substitution_is_high_and_applies() {
    let (service, act) = service_with_act();
    let cs = extract(
        "amd-1",
        "In Section 15(2), for the words 'thirty days', substitute 'forty-five days'.",
        &act,
    )
    .await;

    assert_eq!(cs.records.len(), 1);
    let record = &cs.records[0];
    assert_eq!(record.kind(), ChangeKind::Substitution);
    assert_eq!(record.confidence().level, ConfidenceLevel::High);
    assert_eq!(record.range(), Some(LineRange::single(LineId(4))));

    let ledger = service.register_changeset(cs.clone()).unwrap();
    let auto = ledger.auto_accept_high().unwrap();
    assert_eq!(auto.len(), 1);

    let applied = service.apply(&cs.changeset_id).unwrap();
    assert_eq!(applied.act.version(), 2);
    assert_eq!(
        applied.act.line(LineId(4)).unwrap().text,
        "(2) An appeal shall be filed within forty-five days of the order."
    );
    assert_eq!(applied.manifest.len(), 1);
    assert_eq!(service.head("sample-act").unwrap().version(), 2);
}

#[tokio::test]
async fn global_replace_applies_only_accepted_occurrences() {
    let (service, act) = service_with_act();
    let cs = extract(
        "amd-2",
        "Wherever 'District Magistrate' occurs, substitute 'District Commissioner'.",
        &act,
    )
    .await;

    assert_eq!(cs.records.len(), 3);
    let citation = cs.records[0].citation().clone();
    assert!(cs.records.iter().all(|r| r.citation() == &citation));
    assert!(cs.records.iter().all(|r| r.kind() == ChangeKind::GlobalReplace));

    let ids: Vec<ChangeId> = cs.records.iter().map(|r| r.change_id().clone()).collect();
    service.register_changeset(cs.clone()).unwrap();
    service
        .submit_decision(&ids[1], Decision::Rejected, "alice", ReviewState::Pending, None)
        .unwrap();
    service
        .bulk_decision(&[ids[0].clone(), ids[2].clone()], Decision::Accepted, "alice", None)
        .unwrap();

    let applied = service.apply(&cs.changeset_id).unwrap();
    assert_eq!(applied.manifest.len(), 2);
    let text = applied.act.text();
    assert_eq!(text.matches("District Commissioner").count(), 2);
    assert_eq!(text.matches("District Magistrate").count(), 1);
}

#[tokio::test]
async fn superseded_version_is_a_version_conflict() {
    let (service, act) = service_with_act();
    let first = extract(
        "amd-a",
        "In Section 15(2), for the words 'thirty days', substitute 'sixty days'.",
        &act,
    )
    .await;
    let second = extract(
        "amd-b",
        "In Section 17(1), for the words 'a fine', substitute 'a penalty'.",
        &act,
    )
    .await;
    service.register_changeset(first.clone()).unwrap();
    service.register_changeset(second.clone()).unwrap();
    service.auto_accept_high(&first.changeset_id).unwrap();
    service.auto_accept_high(&second.changeset_id).unwrap();

    let v2 = service.apply(&first.changeset_id).unwrap().act;
    let err = service.apply(&second.changeset_id).unwrap_err();
    assert!(matches!(
        err,
        StoreError::VersionConflict {
            expected: 1,
            actual: 2,
            ..
        }
    ));
    let head = service.head("sample-act").unwrap();
    assert_eq!(head.version(), 2);
    assert_eq!(head.lines(), v2.lines());
}

#[tokio::test]
async fn missing_section_is_unresolved_low_supervisor() {
    let (service, act) = service_with_act();
    let cs = extract("amd-3", "Delete Section 99.", &act).await;

    assert_eq!(cs.records.len(), 1);
    let record = &cs.records[0];
    assert_eq!(record.kind(), ChangeKind::Deletion);
    assert!(matches!(
        record.resolution(),
        Resolution::Unresolved {
            failure: ResolutionFailure::ReferenceNotFound { .. }
        }
    ));
    assert_eq!(record.confidence().level, ConfidenceLevel::Low);
    assert_eq!(record.requirement(), ReviewRequirement::Supervisor);
    assert!(cs.coverage.incomplete);

    service.register_changeset(cs.clone()).unwrap();
    let err = service
        .submit_decision(record.change_id(), Decision::Accepted, "sup", ReviewState::Pending, None)
        .unwrap_err();
    assert!(matches!(err, StoreError::Review(_)));
}

#[tokio::test]
async fn revert_restores_previous_lines() {
    let (service, act) = service_with_act();
    let cs = extract(
        "amd-4",
        "After section 16, insert the following section:\n'16A. Appeals to lie to the Tribunal.'\n\nSection 17 shall be omitted.",
        &act,
    )
    .await;
    service.register_changeset(cs.clone()).unwrap();
    for record in service.list_pending(&cs.changeset_id, None).unwrap() {
        if record.resolution().is_resolved() {
            service
                .submit_decision(record.change_id(), Decision::Accepted, "alice", ReviewState::Pending, None)
                .unwrap();
        }
    }
    let applied = service.apply(&cs.changeset_id).unwrap();
    assert_ne!(applied.act.lines(), act.lines());

    let reverted = service.revert("sample-act", applied.act.version()).unwrap();
    assert_eq!(reverted.version(), 3);
    assert_eq!(reverted.lines(), act.lines());
    assert_eq!(service.versions("sample-act").unwrap().len(), 3);
}

#[test]
fn concurrent_applies_admit_one_winner() {
    let service = AmendmentService::new(EngineConfig::default());
    let base = service.import_act(sample_act()).unwrap();
    for (amd, line, old, new) in [
        ("amd-x", 4, "thirty days", "sixty days"),
        ("amd-y", 8, "a fine", "a penalty"),
    ] {
        let record = record(
            &ChangeSet::make_id(amd, "sample-act", 1),
            0,
            ChangeOp::Substitution {
                original_text: Some(old.into()),
                new_text: new.into(),
            },
            LineRange::single(LineId(line)),
        );
        service.register_changeset(changeset(amd, &base, vec![record.clone()])).unwrap();
        service
            .submit_decision(record.change_id(), Decision::Accepted, "alice", ReviewState::Pending, None)
            .unwrap();
    }

    let results: Vec<Result<_, StoreError>> = std::thread::scope(|s| {
        let handles: Vec<_> = ["amd-x", "amd-y"]
            .iter()
            .map(|amd| {
                let service = &service;
                s.spawn(move || service.apply(&ChangeSet::make_id(amd, "sample-act", 1)))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(StoreError::VersionConflict { .. }))));
    assert_eq!(service.head("sample-act").unwrap().version(), 2);
}

// ── Round-trip law ──

fn record(changeset_id: &str, n: usize, op: ChangeOp, range: LineRange) -> ChangeRecord {
    ChangeRecord::new(
        ChangeId(format!("{changeset_id}#{n:03}")),
        ChangeIntent {
            op,
            target_reference: None,
            source_citation: Citation::new(format!("instruction {n}")).unwrap(),
            span_index: n,
        },
        Resolution::Resolved {
            range,
            path: SectionPath::root(),
            fuzzy: false,
        },
        Confidence::new(95),
        Validation::default(),
        LineContext::default(),
    )
}

fn with_path(record: ChangeRecord, path: SectionPath) -> ChangeRecord {
    let range = record.range().unwrap();
    ChangeRecord::new(
        record.change_id().clone(),
        record.intent().clone(),
        Resolution::Resolved {
            range,
            path,
            fuzzy: false,
        },
        record.confidence(),
        record.validation().clone(),
        record.context().clone(),
    )
}

fn changeset(amendment_id: &str, act: &Act, records: Vec<ChangeRecord>) -> ChangeSet {
    ChangeSet {
        changeset_id: ChangeSet::make_id(amendment_id, act.act_id(), act.version()),
        amendment_id: amendment_id.to_string(),
        act_id: act.act_id().to_string(),
        act_version: act.version(),
        coverage: Coverage::compute(records.len(), &records, 0.8),
        records,
    }
}

fn accepted(record: ChangeRecord) -> Approved {
    Approved {
        decision: ReviewDecision {
            decision_id: 1,
            change_id: record.change_id().clone(),
            decision: Decision::Accepted,
            reviewer_id: "prop".into(),
            comment: None,
            timestamp: Utc::now(),
            batch_id: None,
            requirement: ReviewRequirement::Auto,
            supersedes: None,
        },
        record,
    }
}

/// Sections `1..=n`, each a heading line plus one sub-section.
fn act_of(sections: usize) -> Act {
    let mut lines = Vec::new();
    for s in 1..=sections {
        lines.push(SourceLine {
            text: format!("{s}. Heading {s}."),
            page: Some(s as u32),
            section_path_hint: Some(s.to_string()),
        });
        lines.push(SourceLine {
            text: "(1) The officer shall act within thirty days.".into(),
            page: Some(s as u32),
            section_path_hint: Some(format!("{s}(1)")),
        });
    }
    Act::from_source_lines("prop-act", lines).unwrap()
}

fn arb_edits() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..5, 1..8)
}

proptest! {
    /// Applying accepted changes and then the reverse patch gives back the
    /// base version's lines exactly.
    #[test]
    fn apply_then_reverse_is_identity(edits in arb_edits()) {
        let base = act_of(edits.len());
        let cs_id = ChangeSet::make_id("amd-prop", "prop-act", 1);
        let mut records = Vec::new();
        for (i, edit) in edits.iter().enumerate() {
            let s = i + 1;
            let heading = LineId(2 * s as u64 - 1);
            let body = LineId(2 * s as u64);
            let section = SectionPath::section(&s.to_string());
            let sub = SectionPath::parse(&format!("{s}(1)")).unwrap();
            let r = match *edit {
                1 => with_path(record(&cs_id, i, ChangeOp::Substitution {
                    original_text: Some("thirty days".into()),
                    new_text: "sixty days".into(),
                }, LineRange::single(body)), sub),
                2 => with_path(record(&cs_id, i, ChangeOp::Deletion { original_text: None },
                    LineRange::new(heading, body)), section),
                3 => with_path(record(&cs_id, i, ChangeOp::Insertion {
                    new_text: "(2) The officer shall record reasons.".into(),
                }, LineRange::new(heading, body)), section),
                4 => with_path(record(&cs_id, i, ChangeOp::Substitution {
                    original_text: None,
                    new_text: "(1) Replaced text.\n(1A) Added text.".into(),
                }, LineRange::single(body)), sub),
                _ => continue,
            };
            records.push(r);
        }
        let approved: Vec<Approved> = records.iter().cloned().map(accepted).collect();
        let cs = changeset("amd-prop", &base, records);
        let outcome = apply_changes(&base, &cs, &approved).unwrap();
        prop_assert_eq!(outcome.manifest.len(), approved.len());
        let reverted = apply_reverse(&outcome.act, &outcome.reverse_patch).unwrap();
        prop_assert_eq!(reverted.lines(), base.lines());
    }
}

#[test]
fn reverse_patch_rejects_wrong_version() {
    let base = act_of(2);
    let cs = changeset("amd", &base, Vec::new());
    let outcome = apply_changes(&base, &cs, &[]).unwrap();
    assert!(matches!(
        apply_reverse(&base, &outcome.reverse_patch),
        Err(ApplyError::PatchMismatch { .. })
    ));
}
