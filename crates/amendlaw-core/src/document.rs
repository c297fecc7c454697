//! Line-addressed Act model.
//!
//! An [`Act`] is an immutable snapshot: an ordered sequence of [`Line`]s, each
//! with a stable [`LineId`] and a [`SectionPath`]. New versions are produced
//! only through an [`ActDraft`], which re-checks the document-order invariant
//! when finished.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ModelError;
use crate::section_path::{Level, SectionPath, roman_value};

/// Stable line identity. Monotonic within an Act's history, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(pub u64);

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Inclusive interval of lines, addressed by id rather than by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub start: LineId,
    pub end: LineId,
}

impl LineRange {
    pub fn new(start: LineId, end: LineId) -> Self {
        Self { start, end }
    }

    pub fn single(id: LineId) -> Self {
        Self { start: id, end: id }
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..{}", self.start, self.end)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub id: LineId,
    pub text: String,
    pub section_path: SectionPath,
    /// Source page, kept for citation only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

/// One line as delivered by the ingestion collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLine {
    pub text: String,
    #[serde(default)]
    pub page: Option<u32>,
    /// Compact section path (`15(2)(a)`). Lines without a hint inherit the
    /// previous line's path.
    #[serde(default)]
    pub section_path_hint: Option<String>,
}

/// An immutable Act version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Act {
    act_id: String,
    version: u32,
    #[serde(default)]
    parent: Option<u32>,
    lines: Vec<Line>,
    /// Greater than every id ever issued in this Act's history.
    next_line_id: u64,
    /// Tombstoned ids.
    #[serde(default)]
    retired: BTreeSet<LineId>,
}

impl Act {
    /// Build version 1 of an Act from ingested lines.
    ///
    /// Ids are assigned `1..=n` in document order. Fails if a hint does not
    /// parse or if section paths go backwards.
    pub fn from_source_lines(
        act_id: impl Into<String>,
        source: Vec<SourceLine>,
    ) -> Result<Self, ModelError> {
        let mut lines = Vec::with_capacity(source.len());
        let mut current = SectionPath::root();
        for (i, src) in source.into_iter().enumerate() {
            if let Some(hint) = src.section_path_hint.as_deref() {
                current = SectionPath::parse(hint)?;
            }
            lines.push(Line {
                id: LineId(i as u64 + 1),
                text: src.text,
                section_path: current.clone(),
                page: src.page,
            });
        }
        let act = Self {
            act_id: act_id.into(),
            version: 1,
            parent: None,
            next_line_id: lines.len() as u64 + 1,
            lines,
            retired: BTreeSet::new(),
        };
        act.validate()?;
        debug!(act_id = %act.act_id, lines = act.lines.len(), "act ingested");
        Ok(act)
    }

    /// Check the line invariants: unique ids below `next_line_id`, no live
    /// retired ids, section paths non-decreasing in document order.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut seen = HashSet::with_capacity(self.lines.len());
        for line in &self.lines {
            if !seen.insert(line.id) || line.id.0 >= self.next_line_id {
                return Err(ModelError::DuplicateLine(line.id));
            }
            if self.retired.contains(&line.id) {
                return Err(ModelError::DuplicateLine(line.id));
            }
        }
        for pair in self.lines.windows(2) {
            if pair[1].section_path < pair[0].section_path {
                return Err(ModelError::OutOfOrder {
                    line: pair[1].id,
                    previous: pair[0].section_path.to_string(),
                    current: pair[1].section_path.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn act_id(&self) -> &str {
        &self.act_id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn parent(&self) -> Option<u32> {
        self.parent
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn next_line_id(&self) -> LineId {
        LineId(self.next_line_id)
    }

    pub fn is_retired(&self, id: LineId) -> bool {
        self.retired.contains(&id)
    }

    pub fn position(&self, id: LineId) -> Option<usize> {
        self.lines.iter().position(|l| l.id == id)
    }

    pub fn line(&self, id: LineId) -> Option<&Line> {
        self.lines.iter().find(|l| l.id == id)
    }

    /// Positions of a range's first and last line, if both are live and in order.
    pub fn range_positions(&self, range: &LineRange) -> Option<(usize, usize)> {
        let start = self.position(range.start)?;
        let end = self.position(range.end)?;
        (start <= end).then_some((start, end))
    }

    pub fn lines_in(&self, range: &LineRange) -> Option<&[Line]> {
        let (start, end) = self.range_positions(range)?;
        Some(&self.lines[start..=end])
    }

    /// Range covering `path` and all of its descendants.
    pub fn provision_range(&self, path: &SectionPath) -> Option<LineRange> {
        let first = self.lines.iter().find(|l| l.section_path.starts_with(path))?;
        let last = self
            .lines
            .iter()
            .rev()
            .find(|l| l.section_path.starts_with(path))?;
        Some(LineRange::new(first.id, last.id))
    }

    /// Distinct section paths in document order.
    pub fn section_paths(&self) -> Vec<&SectionPath> {
        let mut out: Vec<&SectionPath> = Vec::new();
        for line in &self.lines {
            if out.last() != Some(&&line.section_path) {
                out.push(&line.section_path);
            }
        }
        out
    }

    /// Full text, one line per row.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Start a successor version. The draft is the only way to edit lines.
    pub fn successor(&self) -> ActDraft {
        let mut act = self.clone();
        act.parent = Some(self.version);
        act.version = self.version + 1;
        ActDraft { act }
    }
}

/// Mutable working copy of an Act, finished into a new immutable version.
///
/// Every edit is addressed by [`LineId`]. Dropping a draft discards it.
#[derive(Debug, Clone)]
pub struct ActDraft {
    act: Act,
}

impl ActDraft {
    pub fn lines(&self) -> &[Line] {
        &self.act.lines
    }

    pub fn line(&self, id: LineId) -> Option<&Line> {
        self.act.line(id)
    }

    pub fn range_positions(&self, range: &LineRange) -> Option<(usize, usize)> {
        self.act.range_positions(range)
    }

    fn position_of(&self, id: LineId) -> Result<usize, ModelError> {
        self.act.position(id).ok_or(ModelError::UnknownLine(id))
    }

    /// Replace a line's text, returning the previous text.
    pub fn replace_text(&mut self, id: LineId, text: String) -> Result<String, ModelError> {
        let pos = self.position_of(id)?;
        Ok(std::mem::replace(&mut self.act.lines[pos].text, text))
    }

    /// Replace a line's section path, returning the previous path.
    pub fn set_path(&mut self, id: LineId, path: SectionPath) -> Result<SectionPath, ModelError> {
        let pos = self.position_of(id)?;
        Ok(std::mem::replace(&mut self.act.lines[pos].section_path, path))
    }

    /// Tombstone a range. Returns the id of the line preceding it (if any)
    /// and the removed lines.
    pub fn retire(&mut self, range: &LineRange) -> Result<(Option<LineId>, Vec<Line>), ModelError> {
        let (start, end) = self
            .act
            .range_positions(range)
            .ok_or(ModelError::InvalidRange(*range))?;
        let predecessor = start.checked_sub(1).map(|p| self.act.lines[p].id);
        let removed: Vec<Line> = self.act.lines.drain(start..=end).collect();
        self.act.retired.extend(removed.iter().map(|l| l.id));
        Ok((predecessor, removed))
    }

    /// Insert new lines with fresh ids after `anchor` (or at the top when
    /// `anchor` is `None`). Returns the ids issued.
    pub fn insert_after(
        &mut self,
        anchor: Option<LineId>,
        new_lines: Vec<(String, SectionPath, Option<u32>)>,
    ) -> Result<Vec<LineId>, ModelError> {
        let mut at = match anchor {
            Some(id) => self.position_of(id)? + 1,
            None => 0,
        };
        let mut ids = Vec::with_capacity(new_lines.len());
        for (text, section_path, page) in new_lines {
            let id = LineId(self.act.next_line_id);
            self.act.next_line_id += 1;
            self.act.lines.insert(
                at,
                Line {
                    id,
                    text,
                    section_path,
                    page,
                },
            );
            ids.push(id);
            at += 1;
        }
        Ok(ids)
    }

    /// Remove lines by id (used when undoing an insertion). The ids stay
    /// tombstoned.
    pub fn remove(&mut self, ids: &[LineId]) -> Result<(), ModelError> {
        for id in ids {
            let pos = self.position_of(*id)?;
            self.act.lines.remove(pos);
            self.act.retired.insert(*id);
        }
        Ok(())
    }

    /// Put previously retired lines back, with their original ids, after
    /// `anchor` (or at the top).
    pub fn restore_after(&mut self, anchor: Option<LineId>, lines: Vec<Line>) -> Result<(), ModelError> {
        let mut at = match anchor {
            Some(id) => self.position_of(id)? + 1,
            None => 0,
        };
        for line in lines {
            if self.act.position(line.id).is_some() {
                return Err(ModelError::DuplicateLine(line.id));
            }
            self.act.retired.remove(&line.id);
            self.act.next_line_id = self.act.next_line_id.max(line.id.0 + 1);
            self.act.lines.insert(at, line);
            at += 1;
        }
        Ok(())
    }

    /// Validate and seal the new version.
    pub fn finish(self) -> Result<Act, ModelError> {
        self.act.validate()?;
        Ok(self.act)
    }
}

// ── Ingestion helper ──

/// `--- PAGE n ---` lines in extracted text, shared with amendment parsing.
pub(crate) static PAGE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*-{2,}\s*PAGE\s+(\d+)\s*-{2,}\s*$").expect("page marker pattern is valid")
});

static SECTION_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:Section\s+)?(\d+[A-Z]*)\.(?:\s|$)").expect("section head pattern is valid")
});

static PAREN_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\(([0-9A-Za-z]{1,5})\)").expect("paren head pattern is valid")
});

/// Build ingestion tuples from plain extracted text.
///
/// Understands `--- PAGE n ---` markers and infers section hints from leading
/// labels: `15.` opens a section, `(2)` a sub-section, `(a)` a clause and
/// `(i)` a sub-clause (unless it is the letter following the current clause).
/// Blank lines are skipped.
pub fn infer_source_lines(text: &str) -> Vec<SourceLine> {
    let mut out = Vec::new();
    let mut page = None;
    let mut current = SectionPath::root();

    for raw in text.lines() {
        if let Some(caps) = PAGE_MARKER.captures(raw) {
            page = caps[1].parse().ok();
            continue;
        }
        if raw.trim().is_empty() {
            continue;
        }

        let mut hint = None;
        if let Some(caps) = SECTION_HEAD.captures(raw) {
            current = SectionPath::section(&caps[1]);
            hint = Some(current.to_string());
        } else if let Some(caps) = PAREN_HEAD.captures(raw)
            && current.is_anchored()
        {
            let label = &caps[1];
            let level = infer_paren_level(&current, label);
            current = current.with_label(level, label);
            hint = Some(current.to_string());
        }

        out.push(SourceLine {
            text: raw.trim_end().to_string(),
            page,
            section_path_hint: hint,
        });
    }
    out
}

/// Path implied by a line's leading label, read in the context of the
/// preceding line's path. `None` when the line carries no label.
pub fn label_path(text: &str, context: &SectionPath) -> Option<SectionPath> {
    if let Some(caps) = SECTION_HEAD.captures(text) {
        return Some(SectionPath::section(&caps[1]));
    }
    let caps = PAREN_HEAD.captures(text)?;
    if !context.is_anchored() {
        return None;
    }
    let label = &caps[1];
    Some(context.with_label(infer_paren_level(context, label), label))
}

fn infer_paren_level(current: &SectionPath, label: &str) -> Level {
    if label.starts_with(|c: char| c.is_ascii_digit()) {
        return Level::Subsection;
    }
    let lower = label.to_ascii_lowercase();
    if current.get(Level::SubClause).is_some() && roman_value(&lower).is_some() {
        return Level::SubClause;
    }
    if let Some(clause) = current.get(Level::Clause)
        && roman_value(&lower).is_some()
        && next_letter(clause).as_deref() != Some(lower.as_str())
    {
        return Level::SubClause;
    }
    Level::Clause
}

fn next_letter(label: &str) -> Option<String> {
    let mut chars: Vec<char> = label.chars().collect();
    let last = chars.pop()?;
    if !last.is_ascii_lowercase() || last == 'z' {
        return None;
    }
    chars.push((last as u8 + 1) as char);
    Some(chars.into_iter().collect())
}
