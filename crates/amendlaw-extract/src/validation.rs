//! Validation and confidence scoring.
//!
//! [`reconcile`] merges the ChangeSets of two independent extraction passes
//! into one. Records are paired by `(kind, resolved_range)`. Agreeing pairs
//! start from the agreement base; disagreeing pairs carry a discrepancy and
//! stay below HIGH; unpaired records stay below HIGH. Each consistent
//! structural signal adds the signal bonus:
//!
//! - exact (non-fuzzy) resolution
//! - the citation is found in the amendment span
//! - `original_text` occurs in the resolved lines
//! - the target reference is found in the citation

use std::collections::HashSet;

use amendlaw_core::{
    Act, Amendment, ChangeId, ChangeIntent, ChangeRecord, ChangeSet, ConfidencePolicy,
    Confidence, ConfidenceLevel, Coverage, EngineConfig, LineContext, Resolution, Validation,
};
use tracing::{info, warn};

use crate::error::ExtractError;

// ── Scoring ──

/// Scores records against the amendment and the Act they resolve into.
pub struct Scorer<'a> {
    amendment: &'a Amendment,
    act: &'a Act,
    policy: &'a ConfidencePolicy,
    amendment_tokens: HashSet<String>,
}

impl<'a> Scorer<'a> {
    pub fn new(amendment: &'a Amendment, act: &'a Act, policy: &'a ConfidencePolicy) -> Self {
        let amendment_tokens = amendment
            .spans()
            .iter()
            .flat_map(|s| tokens(&s.text))
            .collect();
        Self {
            amendment,
            act,
            policy,
            amendment_tokens,
        }
    }

    /// Number of consistent structural signals.
    pub fn signals(&self, intent: &ChangeIntent, resolution: &Resolution) -> u32 {
        let citation = normalize(intent.source_citation.as_str());
        let mut count = 0;

        if resolution.is_resolved() && !resolution.is_fuzzy() {
            count += 1;
        }
        if self
            .amendment
            .span(intent.span_index)
            .is_some_and(|s| normalize(&s.text).contains(&citation))
        {
            count += 1;
        }
        if let (Some(phrase), Some(range)) = (intent.op.original_text(), resolution.range())
            && self
                .act
                .lines_in(&range)
                .is_some_and(|lines| lines.iter().any(|l| l.text.contains(phrase)))
        {
            count += 1;
        }
        if let Some(target) = intent.target_reference.as_deref() {
            let head = target.split(" of ").next().unwrap_or(target);
            if citation.contains(&normalize(head)) {
                count += 1;
            }
        }
        count
    }

    /// Whether at least half of the citation's words occur in the amendment.
    pub fn citation_overlaps(&self, intent: &ChangeIntent) -> bool {
        let words = tokens(intent.source_citation.as_str());
        if words.is_empty() {
            return false;
        }
        let found = words
            .iter()
            .filter(|w| self.amendment_tokens.contains(*w))
            .count();
        found * 2 >= words.len()
    }

    /// Score from `base`, bounded by `ceiling` and by the caps that apply to
    /// fuzzy, unresolved and back-filled records.
    pub fn score(
        &self,
        base: u32,
        ceiling: u32,
        intent: &ChangeIntent,
        resolution: &Resolution,
        citation_backfilled: bool,
    ) -> Confidence {
        let p = self.policy;
        let mut score = base.saturating_add(p.signal_bonus.saturating_mul(self.signals(intent, resolution)));
        score = score.min(ceiling);
        if resolution.is_fuzzy() {
            score = score.min(p.fuzzy_cap);
        }
        if !resolution.is_resolved() {
            score = score.min(p.unresolved_cap);
        }
        if citation_backfilled {
            score = score.min(p.unverified_cap);
        }
        Confidence::new(score)
    }

    /// Score for a record only one pass produced.
    pub fn single_pass(
        &self,
        intent: &ChangeIntent,
        resolution: &Resolution,
        citation_backfilled: bool,
    ) -> Confidence {
        let ceiling = if self.citation_overlaps(intent) {
            89
        } else {
            self.policy.unverified_cap
        };
        self.score(
            self.policy.single_pass_base,
            ceiling,
            intent,
            resolution,
            citation_backfilled,
        )
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '‘' | '’' => '\'',
            '“' | '”' => '"',
            c => c.to_ascii_lowercase(),
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn same_text(a: Option<&str>, b: Option<&str>) -> bool {
    a.map(normalize) == b.map(normalize)
}

fn texts_agree(a: &ChangeIntent, b: &ChangeIntent) -> bool {
    same_text(a.op.original_text(), b.op.original_text())
        && same_text(a.op.new_text(), b.op.new_text())
}

fn describe_disagreement(a: &ChangeIntent, b: &ChangeIntent) -> String {
    let show = |s: Option<&str>| s.map_or_else(|| "-".to_string(), |s| format!("'{s}'"));
    format!(
        "passes disagree on text: primary {} -> {}, secondary {} -> {}",
        show(a.op.original_text()),
        show(a.op.new_text()),
        show(b.op.original_text()),
        show(b.op.new_text()),
    )
}

// ── Assembly ──

/// A record before its final id is assigned.
#[derive(Debug, Clone)]
pub(crate) struct Draft {
    pub intent: ChangeIntent,
    pub resolution: Resolution,
    pub context: LineContext,
    pub confidence: Confidence,
    pub validation: Validation,
}

impl Draft {
    fn from_record(record: &ChangeRecord) -> Self {
        Self {
            intent: record.intent().clone(),
            resolution: record.resolution().clone(),
            context: record.context().clone(),
            confidence: record.confidence(),
            validation: record.validation().clone(),
        }
    }
}

/// Number the drafts, compute coverage and seal the ChangeSet.
pub(crate) fn assemble(
    changeset_id: String,
    id_prefix: &str,
    amendment: &Amendment,
    act: &Act,
    drafts: Vec<Draft>,
    config: &EngineConfig,
) -> ChangeSet {
    let records: Vec<ChangeRecord> = drafts
        .into_iter()
        .enumerate()
        .map(|(i, d)| {
            ChangeRecord::new(
                ChangeId(format!("{id_prefix}#{i:03}")),
                d.intent,
                d.resolution,
                d.confidence,
                d.validation,
                d.context,
            )
        })
        .collect();
    let coverage = Coverage::compute(amendment.len(), &records, config.coverage_threshold);
    if coverage.incomplete {
        warn!(
            changeset_id = %changeset_id,
            covered = coverage.covered_spans,
            total = coverage.total_spans,
            threshold = coverage.threshold,
            "changeset incomplete: coverage below threshold"
        );
    }
    ChangeSet {
        changeset_id,
        amendment_id: amendment.amendment_id.clone(),
        act_id: act.act_id().to_string(),
        act_version: act.version(),
        records,
        coverage,
    }
}

// ── Reconciliation ──

fn check_pair(cs: &ChangeSet, amendment: &Amendment, act: &Act) -> Result<(), ExtractError> {
    if cs.amendment_id != amendment.amendment_id
        || cs.act_id != act.act_id()
        || cs.act_version != act.version()
    {
        return Err(ExtractError::Mismatch(format!(
            "{} targets {}@{}v{}, expected {}@{}v{}",
            cs.changeset_id,
            cs.amendment_id,
            cs.act_id,
            cs.act_version,
            amendment.amendment_id,
            act.act_id(),
            act.version()
        )));
    }
    Ok(())
}

/// Reconcile two passes over the same (Amendment, Act version) into one
/// confidence-scored ChangeSet.
pub fn reconcile(
    primary: &ChangeSet,
    secondary: &ChangeSet,
    amendment: &Amendment,
    act: &Act,
    config: &EngineConfig,
) -> Result<ChangeSet, ExtractError> {
    check_pair(primary, amendment, act)?;
    check_pair(secondary, amendment, act)?;

    let policy = &config.confidence;
    let scorer = Scorer::new(amendment, act, policy);
    let mut used = vec![false; secondary.records.len()];
    let mut drafts = Vec::with_capacity(primary.records.len());
    let (mut agreed, mut disagreed) = (0usize, 0usize);

    for p in &primary.records {
        let mut draft = Draft::from_record(p);
        let backfilled = p.validation().citation_backfilled;
        draft.validation.primary_extracted = true;
        draft.validation.secondary_confirmed = false;

        let partner = if p.resolution().is_resolved() {
            secondary.records.iter().enumerate().position(|(j, s)| {
                !used[j] && s.kind() == p.kind() && s.range() == p.range()
            })
        } else {
            secondary.records.iter().enumerate().position(|(j, s)| {
                !used[j]
                    && !s.resolution().is_resolved()
                    && s.kind() == p.kind()
                    && s.intent().span_index == p.intent().span_index
            })
        };

        match partner {
            Some(j) => {
                used[j] = true;
                let s = &secondary.records[j];
                // Prefer a citation the producing pass actually supplied.
                if backfilled && !s.validation().citation_backfilled {
                    draft.intent.source_citation = s.citation().clone();
                    draft.validation.citation_backfilled = false;
                }
                let backfilled = draft.validation.citation_backfilled;
                if texts_agree(p.intent(), s.intent()) {
                    agreed += 1;
                    draft.validation.secondary_confirmed = true;
                    draft.confidence = scorer.score(
                        policy.agreement_base,
                        100,
                        &draft.intent,
                        &draft.resolution,
                        backfilled,
                    );
                } else {
                    disagreed += 1;
                    draft.validation.discrepancy =
                        Some(describe_disagreement(p.intent(), s.intent()));
                    draft.confidence = scorer.score(
                        policy.disagreement_base,
                        89,
                        &draft.intent,
                        &draft.resolution,
                        backfilled,
                    );
                }
            }
            None => {
                let elsewhere = secondary.records.iter().find(|s| {
                    s.kind() == p.kind()
                        && s.intent().span_index == p.intent().span_index
                        && s.resolution().is_resolved()
                        && s.range() != p.range()
                });
                if let Some(s) = elsewhere
                    && let Some(range) = s.range()
                {
                    draft.validation.discrepancy = Some(format!(
                        "secondary pass resolved this instruction to {range} ({})",
                        s.change_id()
                    ));
                }
                draft.confidence = scorer.single_pass(&draft.intent, &draft.resolution, backfilled);
            }
        }
        drafts.push(draft);
    }

    let mut secondary_only = 0usize;
    for (j, s) in secondary.records.iter().enumerate() {
        if used[j] {
            continue;
        }
        secondary_only += 1;
        let mut draft = Draft::from_record(s);
        draft.validation.primary_extracted = false;
        draft.validation.secondary_confirmed = false;
        draft.validation.discrepancy = Some("found only by secondary pass".to_string());
        draft.confidence = scorer.single_pass(
            &draft.intent,
            &draft.resolution,
            draft.validation.citation_backfilled,
        );
        drafts.push(draft);
    }

    drafts.sort_by_key(|d| d.intent.span_index);

    let changeset_id = ChangeSet::make_id(&amendment.amendment_id, act.act_id(), act.version());
    let changeset = assemble(
        changeset_id.clone(),
        &changeset_id,
        amendment,
        act,
        drafts,
        config,
    );
    let high = changeset
        .records
        .iter()
        .filter(|r| r.confidence().level == ConfidenceLevel::High)
        .count();
    info!(
        changeset_id = %changeset.changeset_id,
        records = changeset.records.len(),
        agreed,
        disagreed,
        secondary_only,
        high,
        coverage = changeset.coverage.fraction,
        "passes reconciled"
    );
    Ok(changeset)
}
