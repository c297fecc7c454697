//! Pattern-driven instruction classifier.
//!
//! Maps one instruction span to typed [`ChangeIntent`]s using an ordered table
//! of [`Pattern`]s. Specific constructs come before generic ones: renumbering,
//! global replace, insertion, phrase substitution, whole-provision
//! substitution, then deletion. Within a span each pattern may match several
//! times; a match is kept only if it does not overlap a match already kept
//! for a higher-priority pattern. Kept matches are emitted in text order. A
//! span nothing matches becomes a single `unclassified` intent, and text left
//! between kept matches that still reads as an instruction becomes an
//! `unclassified` intent of its own.
//!
//! A leading `In section 4(1), in clause (c),` scopes every instruction in
//! the span: relative targets are completed with it and targetless ones
//! inherit it.

use std::sync::LazyLock;

use amendlaw_core::section_path::{Reference, roman_value};
use amendlaw_core::{Amendment, ChangeIntent, ChangeKind, ChangeOp, Citation, InstructionSpan, ModelError};
use regex::{Captures, Regex};
use tracing::{debug, info};

// ── Pattern fragments ──

/// One provision reference item: `section 15(2)`, `clause (a)`, `s.4`.
const REF_ITEM: &str = r"\b(?:sub-?clause|sub-?section|clause|sections?|s\.)\s*(?:\d+[A-Za-z]*|\(\s*[0-9A-Za-z]+\s*\))(?:\s*\(\s*[0-9A-Za-z]+\s*\))*";

/// ASCII or typographic quote.
const QUOTE: &str = r#"['"‘’“”]"#;

/// Quoted content: no quote characters except apostrophes inside words.
const TEXT: &str = r#"(?:[^'"‘’“”]|\w['’]\w)+?"#;

/// Optional "the words", "the words and figures", "the letter" lead-in.
const WORDS: &str = r"(?:the\s+(?:words?|figures?|letters?|brackets?|expression)(?:\s*,?\s*(?:and\s+)?(?:words?|figures?|letters?|brackets?))*\s+)?";

/// Trailing "the following clause shall be inserted, namely:" style lead-in
/// before quoted provision text.
const NAMELY: &str = r"\s*[,:\-–—]*\s*(?:namely\s*[:\-–—,]*\s*)?";

/// Renumbering target label: `(e)`, `17`, optionally after a level keyword.
const LABEL: &str = r"(?:(?:sub-?clause|sub-?section|clause|section)\s*)?(?P<label>\d+[A-Za-z]*|\(\s*[0-9A-Za-z]+\s*\))";

/// Expand `{REF}`, `{Q}`, `{T}`, `{WORDS}`, `{NAMELY}` and `{LABEL}` and
/// make the pattern case-insensitive.
fn expand(template: &str) -> String {
    let reference = format!(r"{REF_ITEM}(?:,?\s+of\s+(?:the\s+said\s+)?{REF_ITEM})*");
    let expanded = template
        .replace("{REF}", &reference)
        .replace("{Q}", QUOTE)
        .replace("{T}", TEXT)
        .replace("{WORDS}", WORDS)
        .replace("{NAMELY}", NAMELY)
        .replace("{LABEL}", LABEL);
    format!("(?i){expanded}")
}

static REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&expand("{REF}")).expect("reference pattern is valid"));

static CONTEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&expand(
        r"^\s*(?:(?:\d+[A-Za-z]?|\([0-9A-Za-z]{1,4}\))[.)]?\s+)?(?:in\s+the\s+principal\s+act\s*,\s*)?(?P<chain>(?:in\s+{REF}\s*[,:\-–—]\s*)+)",
    ))
    .expect("context pattern is valid")
});

// ── Patterns ──

/// Turns a pattern match into an op.
pub type BuildOp = fn(ChangeKind, &Captures<'_>) -> Result<ChangeOp, ModelError>;

/// One row of the classification table.
#[derive(Clone)]
pub struct Pattern {
    name: &'static str,
    kind: ChangeKind,
    regex: Regex,
    build: BuildOp,
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pattern")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Pattern {
    /// Compile a pattern from a template.
    ///
    /// Templates may use the placeholders `{REF}` (a provision reference),
    /// `{Q}` (a quote), `{T}` (quoted text), `{WORDS}`, `{NAMELY}` and
    /// `{LABEL}`. Named groups `target`, `orig`, `new` and `label` feed the
    /// op's fields.
    pub fn new(name: &'static str, kind: ChangeKind, template: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            kind,
            regex: Regex::new(&expand(template))?,
            build: from_groups,
        })
    }

    pub fn with_builder(mut self, build: BuildOp) -> Self {
        self.build = build;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }
}

fn group(caps: &Captures<'_>, name: &str) -> Option<String> {
    caps.name(name).map(|m| m.as_str().trim().to_string())
}

fn from_groups(kind: ChangeKind, caps: &Captures<'_>) -> Result<ChangeOp, ModelError> {
    let label = group(caps, "label").map(|l| {
        l.trim_start_matches('(')
            .trim_end_matches(')')
            .trim()
            .to_string()
    });
    ChangeOp::from_parts(kind, group(caps, "orig"), group(caps, "new"), label)
}

/// "after the words 'X', insert 'Y'" edits a line in place: `X` becomes `X Y`.
fn insert_words(kind: ChangeKind, caps: &Captures<'_>) -> Result<ChangeOp, ModelError> {
    let orig = group(caps, "orig");
    let new = match (&orig, group(caps, "new")) {
        (Some(o), Some(n)) => Some(format!("{o} {n}")),
        (_, n) => n,
    };
    ChangeOp::from_parts(kind, orig, new, None)
}

static STANDARD_PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    use ChangeKind::*;
    let table: [(&'static str, ChangeKind, &str); 18] = [
        // Renumbering
        (
            "renumbered_as",
            Renumbering,
            r"(?P<target>{REF})\s+shall\s+be\s+re-?numbered\s+as\s+{LABEL}",
        ),
        ("renumber_as", Renumbering, r"\bre-?number\s+(?P<target>{REF})\s+as\s+{LABEL}"),
        // Global replace
        (
            "wherever_substitute",
            GlobalReplace,
            r"\bwherever\s+{WORDS}{Q}(?P<orig>{T}){Q}\s+(?:occurs?|appears?)(?:\s+in\s+(?P<target>{REF}))?[^,;'‘“]*?,?\s*substitute\s+{WORDS}{Q}(?P<new>{T}){Q}",
        ),
        (
            "for_wherever_substitute",
            GlobalReplace,
            r"\bfor\s+{WORDS}{Q}(?P<orig>{T}){Q},?\s+wherever\s+(?:they|it)\s+(?:occurs?|appears?)(?:\s+in\s+(?P<target>{REF}))?[^,;'‘“]*?,?\s*substitute\s+{WORDS}{Q}(?P<new>{T}){Q}",
        ),
        (
            "for_wherever_substituted",
            GlobalReplace,
            r"\bfor\s+{WORDS}{Q}(?P<orig>{T}){Q},?\s+wherever\s+(?:they|it)\s+(?:occurs?|appears?)(?:\s+in\s+(?P<target>{REF}))?[^,;'‘“]*?,?\s*{WORDS}{Q}(?P<new>{T}){Q}\s+shall\s+be\s+substituted",
        ),
        // Insertion of new provisions
        (
            "after_insert",
            Insertion,
            r"\bafter\s+(?P<target>{REF}),?\s*insert(?:\s+the\s+following(?:\s+[\w-]+)*?)?{NAMELY}{Q}(?P<new>{T}){Q}(?:\s*[.;]|\s*$)",
        ),
        (
            "after_inserted",
            Insertion,
            r"\bafter\s+(?P<target>{REF}),?\s*the\s+following\s+[\w\s-]*?shall\s+be\s+inserted{NAMELY}{Q}(?P<new>{T}){Q}(?:\s*[.;]|\s*$)",
        ),
        (
            "insert_after",
            Insertion,
            r"\binsert\s+(?:the\s+following\s+[\w\s-]*?)?[,:\-–—]*\s*{Q}(?P<new>{T}){Q}\s*,?\s*after\s+(?P<target>{REF})",
        ),
        // Phrase substitution
        (
            "after_words_insert",
            Substitution,
            r"\bafter\s+{WORDS}{Q}(?P<orig>{T}){Q},?\s*insert\s+{WORDS}{Q}(?P<new>{T}){Q}",
        ),
        (
            "for_words_substituted",
            Substitution,
            r"\bfor\s+{WORDS}{Q}(?P<orig>{T}){Q},?\s*{WORDS}{Q}(?P<new>{T}){Q}\s+shall\s+be\s+substituted",
        ),
        (
            "for_words_substitute",
            Substitution,
            r"\bfor\s+{WORDS}{Q}(?P<orig>{T}){Q},?\s*substitute\s+{WORDS}{Q}(?P<new>{T}){Q}",
        ),
        (
            "substitute_for",
            Substitution,
            r"\bsubstitute\s+{WORDS}{Q}(?P<new>{T}){Q}\s+for\s+{WORDS}{Q}(?P<orig>{T}){Q}",
        ),
        (
            "substitute_with",
            Substitution,
            r"\bsubstitute\s+{WORDS}{Q}(?P<orig>{T}){Q}\s+(?:with|by)\s+{WORDS}{Q}(?P<new>{T}){Q}",
        ),
        // Whole-provision substitution
        (
            "for_provision_substitute",
            Substitution,
            r"\bfor\s+(?P<target>{REF}),?\s*(?:the\s+following\s+[\w\s-]*?shall\s+be\s+substituted|substitute(?:\s+the\s+following(?:\s+[\w-]+)*?)?){NAMELY}{Q}(?P<new>{T}){Q}(?:\s*[.;]|\s*$)",
        ),
        // Deletion
        (
            "words_omitted",
            Deletion,
            r"{WORDS}{Q}(?P<orig>{T}){Q}\s+shall\s+be\s+(?:omitted|deleted)",
        ),
        ("omit_words", Deletion, r"\b(?:omit|delete)\s+{WORDS}{Q}(?P<orig>{T}){Q}"),
        (
            "provision_omitted",
            Deletion,
            r"(?P<target>{REF})\s+shall\s+be\s+(?:omitted|deleted|repealed)",
        ),
        ("omit_provision", Deletion, r"\b(?:omit|delete|repeal)\s+(?P<target>{REF})"),
    ];
    table
        .into_iter()
        .map(|(name, kind, template)| {
            let pattern = Pattern::new(name, kind, template).expect("classifier pattern is valid");
            if name == "after_words_insert" {
                pattern.with_builder(insert_words)
            } else {
                pattern
            }
        })
        .collect()
});

// ── Classifier ──

/// Ordered pattern table. Earlier patterns win overlaps.
#[derive(Debug, Clone)]
pub struct Classifier {
    patterns: Vec<Pattern>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::standard()
    }
}

/// A match kept for emission.
struct Accepted {
    start: usize,
    end: usize,
    op: ChangeOp,
    target: Option<String>,
}

/// Words that join instructions without carrying one.
const CONNECTORS: &[&str] = &[
    "and", "or", "also", "further", "then", "thereafter", "namely", "the", "following",
    "respectively",
];

impl Classifier {
    /// The built-in table for Indian and UK amending instructions.
    pub fn standard() -> Self {
        Self {
            patterns: STANDARD_PATTERNS.clone(),
        }
    }

    pub fn new(patterns: Vec<Pattern>) -> Self {
        Self { patterns }
    }

    /// Add a pattern at the lowest priority.
    pub fn push(&mut self, pattern: Pattern) {
        self.patterns.push(pattern);
    }

    /// Add a pattern at `priority` (0 is tried first).
    pub fn insert(&mut self, priority: usize, pattern: Pattern) {
        let at = priority.min(self.patterns.len());
        self.patterns.insert(at, pattern);
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Classify one span. Never returns an empty vector for a non-blank span.
    pub fn classify(&self, span: &InstructionSpan) -> Vec<ChangeIntent> {
        let text = span.text.as_str();
        let Ok(full_citation) = Citation::new(text.trim()) else {
            return Vec::new();
        };
        let context = span_context(text);

        let mut accepted: Vec<Accepted> = Vec::new();
        for pattern in &self.patterns {
            for caps in pattern.regex.captures_iter(text) {
                let Some(m) = caps.get(0) else { continue };
                if accepted.iter().any(|a| m.start() < a.end && a.start < m.end()) {
                    continue;
                }
                let op = match (pattern.build)(pattern.kind, &caps) {
                    Ok(op) => op,
                    Err(e) => {
                        debug!(pattern = pattern.name, error = %e, "pattern match rejected");
                        continue;
                    }
                };
                accepted.push(Accepted {
                    start: m.start(),
                    end: m.end(),
                    op,
                    target: group(&caps, "target"),
                });
            }
        }

        if accepted.is_empty() {
            return vec![ChangeIntent {
                op: ChangeOp::Unclassified,
                target_reference: context,
                source_citation: full_citation,
                span_index: span.index,
            }];
        }

        accepted.sort_by_key(|a| a.start);
        let mut covered: Vec<(usize, usize)> = accepted.iter().map(|a| (a.start, a.end)).collect();
        if let Some(m) = CONTEXT.find(text) {
            covered.push((m.start(), m.end()));
        }
        let leftovers = uncovered(text, &mut covered);
        if !leftovers.is_empty() {
            debug!(
                span = span.index,
                leftovers = leftovers.len(),
                "unmatched text kept as unclassified"
            );
        }

        let whole = accepted.len() == 1 && leftovers.is_empty();
        let mut intents: Vec<(usize, ChangeIntent)> = accepted
            .into_iter()
            .map(|a| {
                let source_citation = if whole {
                    full_citation.clone()
                } else {
                    Citation::new(text[a.start..a.end].trim()).unwrap_or_else(|_| full_citation.clone())
                };
                let intent = ChangeIntent {
                    op: a.op,
                    target_reference: contextual_target(a.target.as_deref(), context.as_deref()),
                    source_citation,
                    span_index: span.index,
                };
                (a.start, intent)
            })
            .collect();
        intents.extend(leftovers.into_iter().map(|(start, citation)| {
            let intent = ChangeIntent {
                op: ChangeOp::Unclassified,
                target_reference: context.clone(),
                source_citation: citation,
                span_index: span.index,
            };
            (start, intent)
        }));
        intents.sort_by_key(|(start, _)| *start);
        intents.into_iter().map(|(_, intent)| intent).collect()
    }

    /// Classify every span of an amendment, in span order.
    pub fn classify_amendment(&self, amendment: &Amendment) -> Vec<ChangeIntent> {
        let intents: Vec<ChangeIntent> = amendment
            .spans()
            .iter()
            .flat_map(|span| self.classify(span))
            .collect();
        let unclassified = intents
            .iter()
            .filter(|i| i.kind() == ChangeKind::Unclassified)
            .count();
        info!(
            amendment_id = %amendment.amendment_id,
            spans = amendment.len(),
            intents = intents.len(),
            unclassified,
            "amendment classified"
        );
        intents
    }
}

/// Scope set by leading `In section 4, in clause (c),` phrases, written
/// innermost-first: `clause (c) of section 4`.
fn span_context(text: &str) -> Option<String> {
    let caps = CONTEXT.captures(text)?;
    let chain = caps.name("chain")?.as_str();
    let refs: Vec<&str> = REFERENCE.find_iter(chain).map(|m| m.as_str().trim()).collect();
    if refs.is_empty() {
        return None;
    }
    Some(refs.into_iter().rev().collect::<Vec<_>>().join(" of "))
}

/// Stretches of `text` outside every `covered` range that still carry an
/// instruction, with their trimmed text as a citation.
fn uncovered(text: &str, covered: &mut [(usize, usize)]) -> Vec<(usize, Citation)> {
    covered.sort_unstable();
    let mut gaps = Vec::new();
    let mut cursor = 0;
    for &(start, end) in covered.iter() {
        if start > cursor {
            gaps.push((cursor, start));
        }
        cursor = cursor.max(end);
    }
    if cursor < text.len() {
        gaps.push((cursor, text.len()));
    }

    gaps.into_iter()
        .filter_map(|(start, end)| {
            let gap = &text[start..end];
            let trimmed = gap.trim_matches(|c: char| c.is_whitespace() || ".,;:-–—".contains(c));
            if !carries_instruction(trimmed) {
                return None;
            }
            let offset = start + (gap.len() - gap.trim_start().len());
            Citation::new(trimmed).ok().map(|c| (offset, c))
        })
        .collect()
}

/// Whether `text` has any word beyond connectors, list labels and numbers.
fn carries_instruction(text: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .any(|w| {
            let lower = w.to_lowercase();
            let label = w.chars().count() <= 2
                || w.chars().all(|c| c.is_ascii_digit())
                || (w.len() <= 4 && roman_value(w).is_some());
            !label && !CONNECTORS.contains(&lower.as_str())
        })
}

/// Complete a relative target with the span's context, or fall back to the
/// context when the pattern named no target.
fn contextual_target(target: Option<&str>, context: Option<&str>) -> Option<String> {
    match (target, context) {
        (Some(t), Some(ctx)) => match Reference::parse(t) {
            Some(Reference::Provision(path)) if !path.is_anchored() => Some(format!("{t} of {ctx}")),
            _ => Some(t.to_string()),
        },
        (Some(t), None) => Some(t.to_string()),
        (None, ctx) => ctx.map(str::to_string),
    }
}
