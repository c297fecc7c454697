//! Applying accepted ChangeRecords to an Act version.
//!
//! All edits are addressed by [`LineId`], so applying one change never shifts
//! another's target. Changes are applied in descending order of their start
//! position in the base version (ties broken by change id), with renumbering
//! last so that relabelling also covers lines inserted by the same apply.
//! Every edit records its inverse in a [`ReversePatch`].

use amendlaw_core::{
    Act, ActDraft, AppliedChange, ChangeId, ChangeOp, ChangeRecord, ChangeSet, Line,
    LineId, LineRange, Manifest, Resolution, ReviewDecision, SectionPath, label_path,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ApplyError;

/// An accepted record together with the decision that accepted it.
#[derive(Debug, Clone, PartialEq)]
pub struct Approved {
    pub record: ChangeRecord,
    pub decision: ReviewDecision,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    pub act: Act,
    pub reverse_patch: ReversePatch,
    pub manifest: Manifest,
}

/// One undo step. Ops run in order to turn the applied version back into the
/// base version's lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReverseOp {
    SetText { line: LineId, text: String },
    SetPath { line: LineId, path: SectionPath },
    RemoveLines { lines: Vec<LineId> },
    RestoreLines { after: Option<LineId>, lines: Vec<Line> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversePatch {
    pub act_id: String,
    pub changeset_id: String,
    pub base_version: u32,
    pub applied_version: u32,
    pub ops: Vec<ReverseOp>,
}

impl ReversePatch {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

// ── Footprints ──

/// The part of the base version a change touches, in line positions.
///
/// Insertions touch only the gap after their anchor, so they coexist with
/// text edits inside the anchor provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Footprint {
    /// Positions `start..=end`. `replaces` when the lines themselves are
    /// retired or swapped rather than edited in place.
    Lines {
        start: usize,
        end: usize,
        replaces: bool,
    },
    /// The gap after position `pos`.
    After { pos: usize },
}

impl Footprint {
    /// `None` for unresolved records and ranges not live in `act`.
    pub fn of(record: &ChangeRecord, act: &Act) -> Option<Self> {
        let range = record.range()?;
        let (start, end) = act.range_positions(&range)?;
        Some(match record.op() {
            ChangeOp::Insertion { .. } => Self::After { pos: end },
            ChangeOp::Substitution {
                original_text: None,
                ..
            }
            | ChangeOp::Deletion {
                original_text: None,
            } => Self::Lines {
                start,
                end,
                replaces: true,
            },
            _ => Self::Lines {
                start,
                end,
                replaces: false,
            },
        })
    }

    pub fn conflicts(&self, other: &Self) -> bool {
        match (*self, *other) {
            (
                Self::Lines { start: a0, end: a1, .. },
                Self::Lines { start: b0, end: b1, .. },
            ) => a0 <= b1 && b0 <= a1,
            (Self::After { pos: a }, Self::After { pos: b }) => a == b,
            (Self::After { pos }, Self::Lines { start, end, replaces })
            | (Self::Lines { start, end, replaces }, Self::After { pos }) => {
                replaces && start <= pos && pos <= end
            }
        }
    }
}

// ── Apply ──

struct Planned<'a> {
    approved: &'a Approved,
    range: LineRange,
    path: SectionPath,
    start: usize,
    footprint: Footprint,
}

impl Planned<'_> {
    fn change_id(&self) -> &ChangeId {
        self.approved.record.change_id()
    }

    fn is_renumbering(&self) -> bool {
        matches!(self.approved.record.op(), ChangeOp::Renumbering { .. })
    }
}

struct Edit {
    undo: Vec<ReverseOp>,
    new_ids: Vec<LineId>,
}

fn stale(change_id: &ChangeId, reason: impl Into<String>) -> ApplyError {
    ApplyError::StaleResolution {
        change_id: change_id.clone(),
        reason: reason.into(),
    }
}

fn phrase_of(op: &ChangeOp) -> Option<&str> {
    match op {
        ChangeOp::Substitution {
            original_text: Some(text),
            ..
        }
        | ChangeOp::Deletion {
            original_text: Some(text),
        }
        | ChangeOp::GlobalReplace {
            original_text: text,
            ..
        } => Some(text),
        _ => None,
    }
}

/// Apply accepted changes to `base`, producing the successor version, the
/// patch that undoes it, and the applied-changes manifest.
///
/// Fails without side effects if `base` is not the version the ChangeSet was
/// resolved against, if a resolution no longer matches the base text, if two
/// footprints overlap, or if the result would break section order.
pub fn apply_changes(
    base: &Act,
    changeset: &ChangeSet,
    approved: &[Approved],
) -> Result<ApplyOutcome, ApplyError> {
    if base.act_id() != changeset.act_id || base.version() != changeset.act_version {
        return Err(ApplyError::WrongBase {
            expected: format!("{}v{}", changeset.act_id, changeset.act_version),
            actual: format!("{}v{}", base.act_id(), base.version()),
        });
    }

    let mut planned = Vec::with_capacity(approved.len());
    for a in approved {
        let id = a.record.change_id();
        let Resolution::Resolved { range, path, .. } = a.record.resolution() else {
            return Err(stale(id, "record is unresolved"));
        };
        if matches!(a.record.op(), ChangeOp::Unclassified) {
            return Err(stale(id, "unclassified change cannot be applied"));
        }
        let lines = base
            .lines_in(range)
            .ok_or_else(|| stale(id, format!("range {range} is not live in v{}", base.version())))?;
        if let Some(phrase) = phrase_of(a.record.op())
            && !lines.iter().any(|l| l.text.contains(phrase))
        {
            return Err(stale(id, format!("'{phrase}' does not appear in {range}")));
        }
        let footprint =
            Footprint::of(&a.record, base).ok_or_else(|| stale(id, "range has no footprint"))?;
        let (start, _) = base
            .range_positions(range)
            .ok_or_else(|| stale(id, format!("range {range} is not live")))?;
        planned.push(Planned {
            approved: a,
            range: *range,
            path: path.clone(),
            start,
            footprint,
        });
    }

    for (i, a) in planned.iter().enumerate() {
        for b in &planned[i + 1..] {
            if a.footprint.conflicts(&b.footprint) {
                return Err(ApplyError::Overlap {
                    first: a.change_id().clone(),
                    second: b.change_id().clone(),
                });
            }
        }
    }

    planned.sort_by(|a, b| {
        a.is_renumbering()
            .cmp(&b.is_renumbering())
            .then(b.start.cmp(&a.start))
            .then_with(|| a.change_id().cmp(b.change_id()))
    });

    let mut draft = base.successor();
    let mut undo: Vec<Vec<ReverseOp>> = Vec::with_capacity(planned.len());
    let mut entries = Vec::with_capacity(planned.len());
    for p in &planned {
        let edit = apply_one(&mut draft, p)?;
        debug!(change_id = %p.change_id(), ops = edit.undo.len(), "change applied to draft");
        let record = &p.approved.record;
        entries.push(AppliedChange {
            change_id: record.change_id().clone(),
            kind: record.kind(),
            resolved_range: p.range,
            section_path: p.path.to_string(),
            citation: record.citation().as_str().to_string(),
            reviewer_id: p.approved.decision.reviewer_id.clone(),
            timestamp: p.approved.decision.timestamp,
            new_line_ids: edit.new_ids,
        });
        undo.push(edit.undo);
    }

    let act = draft
        .finish()
        .map_err(|e| ApplyError::OrderViolation(e.to_string()))?;

    info!(
        act_id = act.act_id(),
        base_version = base.version(),
        new_version = act.version(),
        count = entries.len(),
        "changes applied"
    );

    Ok(ApplyOutcome {
        reverse_patch: ReversePatch {
            act_id: act.act_id().to_string(),
            changeset_id: changeset.changeset_id.clone(),
            base_version: base.version(),
            applied_version: act.version(),
            ops: undo.into_iter().rev().flatten().collect(),
        },
        manifest: Manifest {
            act_id: act.act_id().to_string(),
            base_version: base.version(),
            new_version: act.version(),
            changeset_id: changeset.changeset_id.clone(),
            entries,
        },
        act,
    })
}

fn apply_one(draft: &mut ActDraft, p: &Planned<'_>) -> Result<Edit, ApplyError> {
    let id = p.change_id();
    match p.approved.record.op() {
        ChangeOp::Substitution {
            original_text: Some(old),
            new_text,
        } => edit_phrase(draft, id, p.range, old, |t| t.replacen(old.as_str(), new_text, 1)),
        ChangeOp::Deletion {
            original_text: Some(old),
        } => edit_phrase(draft, id, p.range, old, |t| remove_phrase(t, old)),
        ChangeOp::GlobalReplace {
            original_text,
            new_text,
        } => edit_phrase(draft, id, p.range, original_text, |t| {
            t.replace(original_text.as_str(), new_text)
        }),
        ChangeOp::Substitution {
            original_text: None,
            new_text,
        } => replace_range(draft, id, p, new_text),
        ChangeOp::Deletion {
            original_text: None,
        } => {
            let (after, lines) = draft
                .retire(&p.range)
                .map_err(|e| stale(id, e.to_string()))?;
            Ok(Edit {
                undo: vec![ReverseOp::RestoreLines { after, lines }],
                new_ids: Vec::new(),
            })
        }
        ChangeOp::Insertion { new_text } => insert(draft, id, p, new_text),
        ChangeOp::Renumbering { new_label } => renumber(draft, id, &p.path, new_label),
        ChangeOp::Unclassified => Err(stale(id, "unclassified change cannot be applied")),
    }
}

/// Rewrite the first line in `range` containing `phrase`.
fn edit_phrase(
    draft: &mut ActDraft,
    id: &ChangeId,
    range: LineRange,
    phrase: &str,
    rewrite: impl FnOnce(&str) -> String,
) -> Result<Edit, ApplyError> {
    let (start, end) = draft
        .range_positions(&range)
        .ok_or_else(|| stale(id, format!("range {range} is not live")))?;
    let line = draft.lines()[start..=end]
        .iter()
        .find(|l| l.text.contains(phrase))
        .ok_or_else(|| stale(id, format!("'{phrase}' does not appear in {range}")))?;
    let line_id = line.id;
    let text = rewrite(&line.text);
    let old = draft
        .replace_text(line_id, text)
        .map_err(|e| stale(id, e.to_string()))?;
    Ok(Edit {
        undo: vec![ReverseOp::SetText {
            line: line_id,
            text: old,
        }],
        new_ids: Vec::new(),
    })
}

/// Replace the whole range. Line ids survive when the line count is unchanged.
fn replace_range(
    draft: &mut ActDraft,
    id: &ChangeId,
    p: &Planned<'_>,
    new_text: &str,
) -> Result<Edit, ApplyError> {
    let texts = split_lines(new_text);
    if texts.is_empty() {
        return Err(stale(id, "replacement text is empty"));
    }
    let (start, end) = draft
        .range_positions(&p.range)
        .ok_or_else(|| stale(id, format!("range {} is not live", p.range)))?;
    let current: Vec<(LineId, SectionPath, Option<u32>)> = draft.lines()[start..=end]
        .iter()
        .map(|l| (l.id, l.section_path.clone(), l.page))
        .collect();

    if texts.len() == current.len() {
        let mut undo = Vec::with_capacity(texts.len());
        for ((line, _, _), text) in current.iter().zip(texts) {
            let old = draft
                .replace_text(*line, text.to_string())
                .map_err(|e| stale(id, e.to_string()))?;
            undo.push(ReverseOp::SetText {
                line: *line,
                text: old,
            });
        }
        return Ok(Edit {
            undo,
            new_ids: Vec::new(),
        });
    }

    let upper = draft.lines().get(end + 1).map(|l| l.section_path.clone());
    let lower = start
        .checked_sub(1)
        .map_or_else(SectionPath::root, |i| draft.lines()[i].section_path.clone());
    let (first_path, page) = (current[0].1.clone(), current[0].2);
    let paths = plan_paths(&texts, &p.path, &lower, upper.as_ref(), &first_path);

    let (after, removed) = draft
        .retire(&p.range)
        .map_err(|e| stale(id, e.to_string()))?;
    let new_ids = draft
        .insert_after(
            after,
            texts
                .iter()
                .zip(paths)
                .map(|(t, path)| (t.to_string(), path, page))
                .collect(),
        )
        .map_err(|e| stale(id, e.to_string()))?;
    Ok(Edit {
        undo: vec![
            ReverseOp::RemoveLines {
                lines: new_ids.clone(),
            },
            ReverseOp::RestoreLines {
                after,
                lines: removed,
            },
        ],
        new_ids,
    })
}

/// Insert fresh lines immediately after the range.
fn insert(
    draft: &mut ActDraft,
    id: &ChangeId,
    p: &Planned<'_>,
    new_text: &str,
) -> Result<Edit, ApplyError> {
    let texts = split_lines(new_text);
    if texts.is_empty() {
        return Err(stale(id, "inserted text is empty"));
    }
    let (pos, _) = draft
        .range_positions(&LineRange::single(p.range.end))
        .ok_or_else(|| stale(id, format!("anchor {} is not live", p.range.end)))?;
    let anchor = &draft.lines()[pos];
    let (anchor_path, page) = (anchor.section_path.clone(), anchor.page);
    let upper = draft.lines().get(pos + 1).map(|l| l.section_path.clone());
    let paths = plan_paths(&texts, &p.path, &anchor_path, upper.as_ref(), &anchor_path);

    let new_ids = draft
        .insert_after(
            Some(p.range.end),
            texts
                .iter()
                .zip(paths)
                .map(|(t, path)| (t.to_string(), path, page))
                .collect(),
        )
        .map_err(|e| stale(id, e.to_string()))?;
    Ok(Edit {
        undo: vec![ReverseOp::RemoveLines {
            lines: new_ids.clone(),
        }],
        new_ids,
    })
}

/// Relabel `path` and every line beneath it. Text is left alone.
fn renumber(
    draft: &mut ActDraft,
    id: &ChangeId,
    path: &SectionPath,
    new_label: &str,
) -> Result<Edit, ApplyError> {
    let level = path
        .deepest()
        .ok_or_else(|| stale(id, "cannot renumber the preamble"))?;
    let label = bare_label(new_label);
    if label.is_empty() {
        return Err(stale(id, format!("'{new_label}' is not a provision label")));
    }
    let targets: Vec<(LineId, SectionPath)> = draft
        .lines()
        .iter()
        .filter(|l| l.section_path.starts_with(path))
        .map(|l| (l.id, l.section_path.clone()))
        .collect();
    if targets.is_empty() {
        return Err(stale(id, format!("no lines under {path}")));
    }
    let mut undo = Vec::with_capacity(targets.len());
    for (line, old) in targets {
        let mut relabelled = old.clone();
        relabelled.set(level, label);
        draft
            .set_path(line, relabelled)
            .map_err(|e| stale(id, e.to_string()))?;
        undo.push(ReverseOp::SetPath { line, path: old });
    }
    Ok(Edit {
        undo,
        new_ids: Vec::new(),
    })
}

// ── Helpers ──

fn split_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect()
}

/// `(c)`, `Section 17` and `17.` all reduce to the bare label.
fn bare_label(label: &str) -> &str {
    let label = label.trim();
    let label = label
        .strip_prefix("Section")
        .or_else(|| label.strip_prefix("section"))
        .unwrap_or(label);
    label
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(['.', ')'])
        .trim()
}

/// Remove the first occurrence of `phrase`, closing up the gap it leaves.
fn remove_phrase(text: &str, phrase: &str) -> String {
    let Some(at) = text.find(phrase) else {
        return text.to_string();
    };
    let head = &text[..at];
    let tail = &text[at + phrase.len()..];
    if head.trim().is_empty() {
        return format!("{head}{}", tail.trim_start());
    }
    if tail.is_empty() || tail.starts_with([' ', ',', ';', '.', ':']) {
        format!("{}{tail}", head.trim_end())
    } else {
        format!("{head}{tail}")
    }
}

/// Section paths for new lines.
///
/// Each line's leading label is read in the context of the provision being
/// edited (then of the previous new line). A derived path is kept only if it
/// falls between its predecessor and `upper`; otherwise the line inherits
/// the previous path (`fallback` for the first line).
fn plan_paths(
    texts: &[&str],
    context: &SectionPath,
    lower: &SectionPath,
    upper: Option<&SectionPath>,
    fallback: &SectionPath,
) -> Vec<SectionPath> {
    let mut out: Vec<SectionPath> = Vec::with_capacity(texts.len());
    let mut ctx = context.clone();
    for text in texts {
        let floor = out.last().unwrap_or(lower);
        let inherited = out.last().unwrap_or(fallback).clone();
        let path = label_path(text, &ctx)
            .filter(|p| p >= floor && upper.is_none_or(|u| p <= u))
            .unwrap_or(inherited);
        ctx = path.clone();
        out.push(path);
    }
    out
}

// ── Reverse ──

/// Undo an apply: run `patch` against the version it produced.
///
/// The result is committed as a new version whose lines equal the base
/// version's lines exactly (ids, text, paths, pages).
pub fn apply_reverse(act: &Act, patch: &ReversePatch) -> Result<Act, ApplyError> {
    if act.act_id() != patch.act_id || act.version() != patch.applied_version {
        return Err(ApplyError::PatchMismatch {
            expected: patch.applied_version,
            actual: act.version(),
        });
    }
    let mut draft = act.successor();
    for op in &patch.ops {
        match op.clone() {
            ReverseOp::SetText { line, text } => {
                draft.replace_text(line, text).map_err(ApplyError::Reverse)?;
            }
            ReverseOp::SetPath { line, path } => {
                draft.set_path(line, path).map_err(ApplyError::Reverse)?;
            }
            ReverseOp::RemoveLines { lines } => {
                draft.remove(&lines).map_err(ApplyError::Reverse)?;
            }
            ReverseOp::RestoreLines { after, lines } => {
                draft.restore_after(after, lines).map_err(ApplyError::Reverse)?;
            }
        }
    }
    let reverted = draft.finish().map_err(ApplyError::Reverse)?;
    info!(
        act_id = reverted.act_id(),
        undone = patch.applied_version,
        new_version = reverted.version(),
        ops = patch.ops.len(),
        "apply reverted"
    );
    Ok(reverted)
}
