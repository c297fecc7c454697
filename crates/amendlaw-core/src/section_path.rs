//! Hierarchical provision addresses and their document-order sort keys.
//!
//! A [`SectionPath`] addresses a provision as Section → Sub-section → Clause →
//! Sub-clause, e.g. `15(2)(a)(i)`. Paths order the way provisions appear in an
//! Act, including inserted provisions (`3A` between `3` and `4`, `(aa)`
//! between `(a)` and `(b)`).
//!
//! # Numbering conventions
//!
//! - Sections and sub-sections are numeric with optional letter suffixes
//!   (`3`, `3A`, `41ZA`) and sort by the numeric segments of
//!   [`provision_key`].
//! - Clauses are lowercase letters (`a`, `aa`, `b`) and sort lexicographically.
//! - Sub-clauses are lowercase roman numerals (`i`, `iv`, `ix`) and sort by value.

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Depth of a provision label within a [`SectionPath`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Section,
    Subsection,
    Clause,
    SubClause,
}

impl Level {
    pub const ALL: [Level; 4] = [
        Level::Section,
        Level::Subsection,
        Level::Clause,
        Level::SubClause,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn from_index(i: usize) -> Option<Level> {
        Self::ALL.get(i).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Section => "section",
            Self::Subsection => "sub-section",
            Self::Clause => "clause",
            Self::SubClause => "sub-clause",
        }
    }
}

/// Address of a provision within an Act.
///
/// Levels may be absent: `15` has only a section, `15(a)` has a section and a
/// clause but no sub-section. A path with no section is *relative* (e.g. a
/// bare "clause (c)" in an amendment) and only meaningful when combined with
/// context via [`with_context`](Self::with_context).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectionPath {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subsection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    clause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub_clause: Option<String>,
}

impl SectionPath {
    /// The empty path: preamble and title lines before the first section.
    pub fn root() -> Self {
        Self::default()
    }

    /// A path addressing a whole section.
    pub fn section(label: &str) -> Self {
        let mut path = Self::root();
        path.set(Level::Section, label);
        path
    }

    /// Parse a compact path such as `15`, `15(2)`, `15(2)(a)(i)` or `3A(1)`.
    ///
    /// Also accepts written references (`Section 15(2)`, `clause (a) of
    /// section 4`). The empty string parses to [`root`](Self::root).
    pub fn parse(s: &str) -> Result<Self, ModelError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        if let Some(caps) = COMPACT_PATH.captures(trimmed) {
            let mut path = Self::section(&caps[1]);
            let groups = paren_groups(caps.get(2).map_or("", |m| m.as_str()));
            path.assign_trailing(Level::Subsection, &groups);
            return Ok(path);
        }
        match Reference::parse(trimmed) {
            Some(Reference::Provision(path)) => Ok(path),
            _ => Err(ModelError::InvalidSectionPath(trimmed.to_string())),
        }
    }

    pub fn get(&self, level: Level) -> Option<&str> {
        match level {
            Level::Section => self.section.as_deref(),
            Level::Subsection => self.subsection.as_deref(),
            Level::Clause => self.clause.as_deref(),
            Level::SubClause => self.sub_clause.as_deref(),
        }
    }

    fn slot(&mut self, level: Level) -> &mut Option<String> {
        match level {
            Level::Section => &mut self.section,
            Level::Subsection => &mut self.subsection,
            Level::Clause => &mut self.clause,
            Level::SubClause => &mut self.sub_clause,
        }
    }

    /// Set the label at `level`, normalising its case.
    pub fn set(&mut self, level: Level, label: &str) {
        *self.slot(level) = Some(normalize_label(level, label));
    }

    /// Copy of this path with the label at `level` replaced and everything
    /// deeper cleared.
    pub fn with_label(&self, level: Level, label: &str) -> Self {
        let mut path = self.truncated(level);
        path.set(level, label);
        path
    }

    /// Copy of this path keeping only levels strictly above `level`.
    pub fn truncated(&self, level: Level) -> Self {
        let mut path = self.clone();
        for l in Level::ALL.iter().filter(|l| **l >= level) {
            *path.slot(*l) = None;
        }
        path
    }

    /// Deepest level carrying a label, or `None` for the root path.
    pub fn deepest(&self) -> Option<Level> {
        Level::ALL.iter().rev().copied().find(|l| self.get(*l).is_some())
    }

    /// Shallowest level carrying a label.
    pub fn shallowest(&self) -> Option<Level> {
        Level::ALL.iter().copied().find(|l| self.get(*l).is_some())
    }

    pub fn is_root(&self) -> bool {
        self.deepest().is_none()
    }

    /// Whether the path is anchored at a section (as opposed to relative).
    pub fn is_anchored(&self) -> bool {
        self.section.is_some()
    }

    /// Whether `self` is `prefix` or a descendant of it.
    ///
    /// Levels that `prefix` skips above its deepest label must also be absent
    /// here, so `15(a)` does not contain `15(2)(a)`.
    pub fn starts_with(&self, prefix: &SectionPath) -> bool {
        let Some(deepest) = prefix.deepest() else {
            return true;
        };
        Level::ALL
            .iter()
            .filter(|l| **l <= deepest)
            .all(|l| self.get(*l) == prefix.get(*l))
    }

    /// Fill the levels above this path's shallowest label from `context`.
    ///
    /// `clause (c)` in the context of `4(1)` becomes `4(1)(c)`.
    pub fn with_context(&self, context: &SectionPath) -> Self {
        let Some(shallowest) = self.shallowest() else {
            return context.clone();
        };
        let mut path = self.clone();
        for l in Level::ALL.iter().filter(|l| **l < shallowest) {
            if let Some(label) = context.get(*l) {
                path.set(*l, label);
            }
        }
        path
    }

    /// Document-order key, one component per level.
    pub fn sort_key(&self) -> [LabelKey; 4] {
        Level::ALL.map(|l| match self.get(l) {
            None => LabelKey::Absent,
            Some(label) => LabelKey::of(l, label),
        })
    }

    /// Assign parenthesised groups to successive levels starting at `start`.
    ///
    /// A letter group where a sub-section is expected is taken as a clause,
    /// so `15(a)` is section 15 clause (a).
    fn assign_trailing(&mut self, start: Level, groups: &[String]) {
        let mut cursor = start.index();
        for group in groups {
            if cursor == Level::Subsection.index()
                && !group.starts_with(|c: char| c.is_ascii_digit())
            {
                cursor = Level::Clause.index();
            }
            let Some(level) = Level::from_index(cursor) else {
                break;
            };
            if self.get(level).is_none() {
                self.set(level, group);
            }
            cursor += 1;
        }
    }
}

/// Sort key of one label. An absent level sorts before any label, so a
/// parent precedes its children.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LabelKey {
    Absent,
    /// Sections and sub-sections: see [`provision_key`].
    Number([u32; 3]),
    /// Sub-clauses written as roman numerals.
    Roman(u32),
    /// Clauses, and sub-clauses that are not roman numerals.
    Text(String),
}

impl LabelKey {
    pub fn of(level: Level, label: &str) -> Self {
        match level {
            Level::Section | Level::Subsection => Self::Number(provision_key(label)),
            Level::Clause => Self::Text(label.to_ascii_lowercase()),
            Level::SubClause => match roman_value(label) {
                Some(v) => Self::Roman(v),
                None => Self::Text(label.to_ascii_lowercase()),
            },
        }
    }
}

impl Ord for SectionPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| {
                Level::ALL
                    .map(|l| self.get(l))
                    .cmp(&Level::ALL.map(|l| other.get(l)))
            })
    }
}

impl PartialOrd for SectionPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = &self.section {
            write!(f, "{s}")?;
        }
        for level in [Level::Subsection, Level::Clause, Level::SubClause] {
            if let Some(label) = self.get(level) {
                write!(f, "({label})")?;
            }
        }
        Ok(())
    }
}

/// A parsed amendment target reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// A provision addressed through the section index (possibly relative).
    Provision(SectionPath),
    /// A Schedule, Form or Appendix: not addressable through the section index.
    OutsideScope(String),
}

impl Reference {
    /// Parse a written reference as found in amending instructions.
    ///
    /// Understands `Section 15(2)(a)`, `s.15(2)`, `sub-section (2) of section
    /// 15`, `clause (a) of sub-section (2) of section 15` and bare relative
    /// references like `clause (c)`. Returns `None` if nothing addressable is
    /// found.
    pub fn parse(text: &str) -> Option<Reference> {
        let text = text.trim();
        if let Some(m) = OUT_OF_SCOPE.find(text) {
            return Some(Reference::OutsideScope(m.as_str().trim().to_string()));
        }

        let mut path = SectionPath::root();
        for caps in REFERENCE_PART.captures_iter(text) {
            let keyword = caps[1].to_ascii_lowercase().replace('-', "");
            let level = match keyword.as_str() {
                "subclause" => Level::SubClause,
                "subsection" => Level::Subsection,
                "clause" => Level::Clause,
                _ => Level::Section,
            };
            let label = strip_parens(&caps[2]);
            if path.get(level).is_none() {
                path.set(level, &label);
            }
            let groups = paren_groups(caps.get(3).map_or("", |m| m.as_str()));
            if let Some(next) = Level::from_index(level.index() + 1) {
                path.assign_trailing(next, &groups);
            }
        }

        if path.is_root() {
            let caps = COMPACT_PATH.captures(text)?;
            path = SectionPath::section(&caps[1]);
            let groups = paren_groups(caps.get(2).map_or("", |m| m.as_str()));
            path.assign_trailing(Level::Subsection, &groups);
        }
        Some(Reference::Provision(path))
    }
}

static COMPACT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+[A-Za-z]*)((?:\s*\(\s*[0-9A-Za-z]+\s*\))*)\s*$")
        .expect("compact path pattern is valid")
});

static REFERENCE_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(sub-?clause|sub-?section|clause|sections?|s\.)\s*(\d+[A-Za-z]*|\(\s*[0-9A-Za-z]+\s*\))((?:\s*\(\s*[0-9A-Za-z]+\s*\))*)",
    )
    .expect("reference pattern is valid")
});

static OUT_OF_SCOPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:[A-Za-z]+\s+)?(?:schedule|form|appendix)\b(?:\s+[IVXLC\d]+\b)?")
        .expect("out-of-scope pattern is valid")
});

static PAREN_GROUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*([0-9A-Za-z]+)\s*\)").expect("paren group pattern is valid")
});

fn paren_groups(s: &str) -> Vec<String> {
    PAREN_GROUP
        .captures_iter(s)
        .map(|c| c[1].to_string())
        .collect()
}

fn strip_parens(s: &str) -> String {
    s.trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .trim()
        .to_string()
}

fn normalize_label(level: Level, label: &str) -> String {
    let label = strip_parens(label);
    match level {
        Level::Section | Level::Subsection => label.to_ascii_uppercase(),
        Level::Clause | Level::SubClause => label.to_ascii_lowercase(),
    }
}

/// Position of a label among its siblings, used to find the nearest clause.
///
/// Clause `a` is 1, `b` is 2, `aa` sorts as 1 plus a fraction (scaled by 100).
/// Sub-clauses use roman numeral value; sections and sub-sections use their
/// leading number.
pub fn label_ordinal(level: Level, label: &str) -> Option<u32> {
    match level {
        Level::Section | Level::Subsection => {
            let digits: String = label.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u32>().ok().map(|n| n * 100)
        }
        Level::Clause => {
            let bytes = label.to_ascii_lowercase().into_bytes();
            let first = *bytes.first()?;
            if !first.is_ascii_lowercase() {
                return None;
            }
            let base = (first - b'a') as u32 + 1;
            let frac = bytes
                .get(1)
                .filter(|b| b.is_ascii_lowercase())
                .map_or(0, |b| (*b - b'a') as u32 + 1);
            Some(base * 100 + frac)
        }
        Level::SubClause => roman_value(label).map(|v| v * 100),
    }
}

/// Value of a lowercase or uppercase roman numeral, `None` if not one.
pub fn roman_value(s: &str) -> Option<u32> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let mut total = 0u32;
    let mut prev = 0u32;
    for c in s.chars().rev() {
        let v = match c.to_ascii_lowercase() {
            'i' => 1,
            'v' => 5,
            'x' => 10,
            'l' => 50,
            'c' => 100,
            _ => return None,
        };
        if v < prev {
            total = total.checked_sub(v)?;
        } else {
            total += v;
            prev = v;
        }
    }
    Some(total)
}

/// Numeric segments of a provision number, compared as a tuple.
///
/// "3" → `[3, 0, 0]`, "3ZA" → `[3, 1, 0]`, "3A" → `[3, 10, 0]`,
/// "19DZA" → `[19, 40, 1]`.
///
/// The leading digits are the base. Up to two suffix groups follow: a
/// Z-prefix group (ZA=1 .. ZZ=26) sorts before a plain letter (A=10 ..
/// Z=260), leaving gaps for later insertions. Missing segments are 0.
pub fn provision_key(s: &str) -> [u32; 3] {
    let upper = s.trim().to_ascii_uppercase();
    let bytes = upper.as_bytes();

    let digit_end = bytes
        .iter()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(bytes.len());
    let base = upper[..digit_end].parse::<u32>().unwrap_or(0);

    let suffix = &bytes[digit_end..];
    let mut key = [base, 0, 0];
    let mut slot = 1;
    let mut i = 0;
    while i < suffix.len() && slot < key.len() {
        if suffix[i] == b'Z' && suffix.get(i + 1).is_some_and(u8::is_ascii_uppercase) {
            key[slot] = (suffix[i + 1] - b'A') as u32 + 1;
            i += 2;
        } else if suffix[i].is_ascii_uppercase() {
            key[slot] = ((suffix[i] - b'A') as u32 + 1) * 10;
            i += 1;
        } else {
            break;
        }
        slot += 1;
    }
    key
}
