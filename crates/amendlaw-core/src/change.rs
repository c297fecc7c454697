//! Change intents, records and change sets.
//!
//! A [`ChangeIntent`] is a classified edit that has not been located yet. A
//! [`ChangeRecord`] is an intent after resolution and validation: located,
//! scored, citation-backed and immutable. A [`ChangeSet`] holds every record
//! derived from one Amendment against one Act version.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ModelError;
use crate::document::LineRange;
use crate::section_path::SectionPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Substitution,
    Insertion,
    Deletion,
    Renumbering,
    GlobalReplace,
    Unclassified,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Substitution => "substitution",
            Self::Insertion => "insertion",
            Self::Deletion => "deletion",
            Self::Renumbering => "renumbering",
            Self::GlobalReplace => "global_replace",
            Self::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The edit itself, with the fields each kind requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeOp {
    /// Replace `original_text` within the range, or the whole range when
    /// `original_text` is `None`.
    Substitution {
        original_text: Option<String>,
        new_text: String,
    },
    /// Add lines immediately after the range.
    Insertion { new_text: String },
    /// Remove `original_text` within the range, or retire the whole range.
    Deletion { original_text: Option<String> },
    /// Relabel the provision at the range; section paths only.
    Renumbering { new_label: String },
    /// Replace one occurrence line of a phrase found across the Act.
    GlobalReplace {
        original_text: String,
        new_text: String,
    },
    Unclassified,
}

impl ChangeOp {
    /// Build an op from loose parts, enforcing the per-kind required fields.
    ///
    /// Empty strings count as absent.
    pub fn from_parts(
        kind: ChangeKind,
        original_text: Option<String>,
        new_text: Option<String>,
        new_label: Option<String>,
    ) -> Result<Self, ModelError> {
        let present = |s: Option<String>| s.filter(|s| !s.trim().is_empty());
        let original_text = present(original_text);
        let new_text = present(new_text);
        let new_label = present(new_label);
        let missing = |field: &'static str| ModelError::MissingField { kind, field };

        Ok(match kind {
            ChangeKind::Substitution => Self::Substitution {
                original_text,
                new_text: new_text.ok_or_else(|| missing("new_text"))?,
            },
            ChangeKind::Insertion => Self::Insertion {
                new_text: new_text.ok_or_else(|| missing("new_text"))?,
            },
            ChangeKind::Deletion => Self::Deletion { original_text },
            ChangeKind::Renumbering => Self::Renumbering {
                new_label: new_label
                    .or(new_text)
                    .ok_or_else(|| missing("new_label"))?,
            },
            ChangeKind::GlobalReplace => Self::GlobalReplace {
                original_text: original_text.ok_or_else(|| missing("original_text"))?,
                new_text: new_text.ok_or_else(|| missing("new_text"))?,
            },
            ChangeKind::Unclassified => Self::Unclassified,
        })
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Substitution { .. } => ChangeKind::Substitution,
            Self::Insertion { .. } => ChangeKind::Insertion,
            Self::Deletion { .. } => ChangeKind::Deletion,
            Self::Renumbering { .. } => ChangeKind::Renumbering,
            Self::GlobalReplace { .. } => ChangeKind::GlobalReplace,
            Self::Unclassified => ChangeKind::Unclassified,
        }
    }

    pub fn original_text(&self) -> Option<&str> {
        match self {
            Self::Substitution { original_text, .. } | Self::Deletion { original_text } => {
                original_text.as_deref()
            }
            Self::GlobalReplace { original_text, .. } => Some(original_text),
            _ => None,
        }
    }

    pub fn new_text(&self) -> Option<&str> {
        match self {
            Self::Substitution { new_text, .. }
            | Self::Insertion { new_text }
            | Self::GlobalReplace { new_text, .. } => Some(new_text),
            Self::Renumbering { new_label } => Some(new_label),
            _ => None,
        }
    }
}

/// Verbatim instruction text an edit was extracted from. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Citation(String);

impl Citation {
    pub fn new(text: impl Into<String>) -> Result<Self, ModelError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ModelError::EmptyCitation);
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Citation {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Citation> for String {
    fn from(c: Citation) -> Self {
        c.0
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Classifier output for one instruction span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeIntent {
    pub op: ChangeOp,
    /// Section/clause reference as written, e.g. "Section 15(2)".
    pub target_reference: Option<String>,
    pub source_citation: Citation,
    /// Index of the amendment span this intent came from.
    pub span_index: usize,
}

impl ChangeIntent {
    pub fn kind(&self) -> ChangeKind {
        self.op.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ResolutionFailure {
    ReferenceNotFound { reference: String },
    AmbiguousReference {
        reference: String,
        candidates: Vec<String>,
    },
    ReferenceOutsideScope { reference: String },
    /// The intent names no target (including unclassified intents).
    NoTarget,
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReferenceNotFound { reference } => write!(f, "reference_not_found: {reference}"),
            Self::AmbiguousReference {
                reference,
                candidates,
            } => write!(
                f,
                "ambiguous_reference: {reference} (candidates: {})",
                candidates.join(", ")
            ),
            Self::ReferenceOutsideScope { reference } => {
                write!(f, "reference_outside_scope: {reference}")
            }
            Self::NoTarget => f.write_str("no_target"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    Resolved {
        range: LineRange,
        /// The provision the range was resolved through.
        path: SectionPath,
        /// Matched by nearest-clause fallback rather than exact path.
        fuzzy: bool,
    },
    Unresolved { failure: ResolutionFailure },
}

impl Resolution {
    pub fn range(&self) -> Option<LineRange> {
        match self {
            Self::Resolved { range, .. } => Some(*range),
            Self::Unresolved { .. } => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }

    pub fn is_fuzzy(&self) -> bool {
        matches!(self, Self::Resolved { fuzzy: true, .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    /// HIGH ≥ 90, MEDIUM 70–89, LOW < 70.
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => Self::High,
            70..=89 => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

/// Deserialising re-derives `level` from the clamped score; a stored level
/// is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredConfidence")]
pub struct Confidence {
    pub score: u8,
    pub level: ConfidenceLevel,
}

#[derive(Deserialize)]
struct StoredConfidence {
    score: u32,
}

impl From<StoredConfidence> for Confidence {
    fn from(stored: StoredConfidence) -> Self {
        Self::new(stored.score)
    }
}

impl Confidence {
    /// Scores above 100 are clamped.
    pub fn new(score: u32) -> Self {
        let score = score.min(100) as u8;
        Self {
            score,
            level: ConfidenceLevel::from_score(score),
        }
    }
}

/// Who must sign a record off before it can be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewRequirement {
    /// May be pre-selected automatically (still conflict-checked and logged).
    Auto,
    /// At least one explicit reviewer decision.
    Reviewer,
    /// An explicit decision from a supervisor-level reviewer.
    Supervisor,
}

impl ReviewRequirement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Reviewer => "reviewer",
            Self::Supervisor => "supervisor",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub primary_extracted: bool,
    pub secondary_confirmed: bool,
    #[serde(default)]
    pub discrepancy: Option<String>,
    /// The producing pass omitted the citation; it was taken from the span.
    #[serde(default)]
    pub citation_backfilled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(pub String);

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChangeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Text either side of a resolved range in the base version, for reviewers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineContext {
    pub before: Option<String>,
    pub after: Option<String>,
}

/// A located, scored, citation-backed edit. Immutable once built.
///
/// A record read back from JSON has its confidence capped the way scoring
/// caps it: MEDIUM at most with a discrepancy, LOW when unresolved or when
/// the citation was back-filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredRecord")]
pub struct ChangeRecord {
    change_id: ChangeId,
    intent: ChangeIntent,
    resolution: Resolution,
    confidence: Confidence,
    validation: Validation,
    context: LineContext,
}

#[derive(Deserialize)]
struct StoredRecord {
    change_id: ChangeId,
    intent: ChangeIntent,
    resolution: Resolution,
    confidence: Confidence,
    validation: Validation,
    #[serde(default)]
    context: LineContext,
}

impl From<StoredRecord> for ChangeRecord {
    fn from(stored: StoredRecord) -> Self {
        let v = &stored.validation;
        let mut ceiling = 100u32;
        if v.discrepancy.is_some() {
            ceiling = 89;
        }
        if !stored.resolution.is_resolved() || v.citation_backfilled {
            ceiling = 69;
        }
        let score = u32::from(stored.confidence.score).min(ceiling);
        Self::new(
            stored.change_id,
            stored.intent,
            stored.resolution,
            Confidence::new(score),
            stored.validation,
            stored.context,
        )
    }
}

impl ChangeRecord {
    pub fn new(
        change_id: ChangeId,
        intent: ChangeIntent,
        resolution: Resolution,
        confidence: Confidence,
        validation: Validation,
        context: LineContext,
    ) -> Self {
        Self {
            change_id,
            intent,
            resolution,
            confidence,
            validation,
            context,
        }
    }

    pub fn change_id(&self) -> &ChangeId {
        &self.change_id
    }

    pub fn intent(&self) -> &ChangeIntent {
        &self.intent
    }

    pub fn op(&self) -> &ChangeOp {
        &self.intent.op
    }

    pub fn kind(&self) -> ChangeKind {
        self.intent.kind()
    }

    pub fn citation(&self) -> &Citation {
        &self.intent.source_citation
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn range(&self) -> Option<LineRange> {
        self.resolution.range()
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    pub fn validation(&self) -> &Validation {
        &self.validation
    }

    pub fn context(&self) -> &LineContext {
        &self.context
    }

    /// Review requirement implied by confidence, resolution and discrepancy.
    ///
    /// Unresolved and LOW records need a supervisor; MEDIUM records and any
    /// record with a discrepancy need a reviewer; the rest may auto-accept.
    pub fn requirement(&self) -> ReviewRequirement {
        if !self.resolution.is_resolved() || self.confidence.level == ConfidenceLevel::Low {
            ReviewRequirement::Supervisor
        } else if self.confidence.level == ConfidenceLevel::Medium
            || self.validation.discrepancy.is_some()
        {
            ReviewRequirement::Reviewer
        } else {
            ReviewRequirement::Auto
        }
    }
}

/// Completeness of a ChangeSet against its Amendment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub total_spans: usize,
    pub covered_spans: usize,
    pub fraction: f64,
    pub threshold: f64,
    pub incomplete: bool,
    /// Spans without any resolved, classified record.
    pub uncovered: Vec<usize>,
}

impl Coverage {
    /// A span is covered by a resolved record that is not `unclassified`.
    /// An amendment with no spans is fully covered.
    pub fn compute(total_spans: usize, records: &[ChangeRecord], threshold: f64) -> Self {
        let mut covered = vec![false; total_spans];
        for r in records {
            if r.resolution().is_resolved()
                && r.kind() != ChangeKind::Unclassified
                && let Some(slot) = covered.get_mut(r.intent().span_index)
            {
                *slot = true;
            }
        }
        let covered_spans = covered.iter().filter(|c| **c).count();
        let fraction = if total_spans == 0 {
            1.0
        } else {
            covered_spans as f64 / total_spans as f64
        };
        Self {
            total_spans,
            covered_spans,
            fraction,
            threshold,
            incomplete: fraction < threshold,
            uncovered: covered
                .iter()
                .enumerate()
                .filter(|(_, c)| !**c)
                .map(|(i, _)| i)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub changeset_id: String,
    pub amendment_id: String,
    pub act_id: String,
    pub act_version: u32,
    pub records: Vec<ChangeRecord>,
    pub coverage: Coverage,
}

/// Summary statistics for a ChangeSet.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSetSummary {
    pub total: usize,
    pub substitutions: usize,
    pub insertions: usize,
    pub deletions: usize,
    pub renumberings: usize,
    pub global_replacements: usize,
    pub unclassified: usize,
    pub unresolved: usize,
    pub high_confidence: usize,
    pub requires_review: usize,
    pub avg_confidence: f64,
}

impl ChangeSet {
    /// Conventional id for the ChangeSet of an amendment against an Act version.
    pub fn make_id(amendment_id: &str, act_id: &str, act_version: u32) -> String {
        format!("{amendment_id}@{act_id}v{act_version}")
    }

    pub fn record(&self, change_id: &ChangeId) -> Option<&ChangeRecord> {
        self.records.iter().find(|r| r.change_id() == change_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> ChangeSetSummary {
        let count = |k: ChangeKind| self.records.iter().filter(|r| r.kind() == k).count();
        let total = self.records.len();
        let avg_confidence = if total == 0 {
            0.0
        } else {
            self.records
                .iter()
                .map(|r| r.confidence().score as f64)
                .sum::<f64>()
                / total as f64
        };
        ChangeSetSummary {
            total,
            substitutions: count(ChangeKind::Substitution),
            insertions: count(ChangeKind::Insertion),
            deletions: count(ChangeKind::Deletion),
            renumberings: count(ChangeKind::Renumbering),
            global_replacements: count(ChangeKind::GlobalReplace),
            unclassified: count(ChangeKind::Unclassified),
            unresolved: self
                .records
                .iter()
                .filter(|r| !r.resolution().is_resolved())
                .count(),
            high_confidence: self
                .records
                .iter()
                .filter(|r| r.confidence().level == ConfidenceLevel::High)
                .count(),
            requires_review: self
                .records
                .iter()
                .filter(|r| r.requirement() != ReviewRequirement::Auto)
                .count(),
            avg_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::LineId;

    fn record(score: u32, resolved: bool, discrepancy: Option<&str>) -> ChangeRecord {
        let resolution = if resolved {
            Resolution::Resolved {
                range: LineRange::single(LineId(3)),
                path: SectionPath::section("1"),
                fuzzy: false,
            }
        } else {
            Resolution::Unresolved {
                failure: ResolutionFailure::ReferenceNotFound {
                    reference: "Section 99".into(),
                },
            }
        };
        ChangeRecord::new(
            "c1".into(),
            ChangeIntent {
                op: ChangeOp::Deletion {
                    original_text: None,
                },
                target_reference: Some("Section 1".into()),
                source_citation: Citation::new("Delete Section 1").unwrap(),
                span_index: 0,
            },
            resolution,
            Confidence::new(score),
            Validation {
                discrepancy: discrepancy.map(str::to_string),
                ..Validation::default()
            },
            LineContext::default(),
        )
    }

    #[test]
    fn confidence_bands() {
        assert_eq!(ConfidenceLevel::from_score(100), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(90), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(89), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(70), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(69), ConfidenceLevel::Low);
        assert_eq!(Confidence::new(250).score, 100);
    }

    #[test]
    fn stored_confidence_is_rederived() {
        let c: Confidence = serde_json::from_str(r#"{"score": 250, "level": "LOW"}"#).unwrap();
        assert_eq!(c, Confidence::new(100));
        let c: Confidence = serde_json::from_str(r#"{"score": 40, "level": "HIGH"}"#).unwrap();
        assert_eq!(c.level, ConfidenceLevel::Low);
    }

    #[test]
    fn stored_record_cannot_claim_high_with_a_discrepancy() {
        let mut json = serde_json::to_value(record(95, true, Some("texts differ"))).unwrap();
        json["confidence"] = serde_json::json!({"score": 250, "level": "HIGH"});
        let back: ChangeRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.confidence().score, 89);
        assert_eq!(back.confidence().level, ConfidenceLevel::Medium);
        assert_eq!(back.requirement(), ReviewRequirement::Reviewer);

        let json = serde_json::to_value(record(95, false, None)).unwrap();
        let back: ChangeRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.confidence().level, ConfidenceLevel::Low);

        let clean = record(95, true, None);
        let back: ChangeRecord =
            serde_json::from_value(serde_json::to_value(&clean).unwrap()).unwrap();
        assert_eq!(back, clean);
    }

    #[test]
    fn citation_cannot_be_empty() {
        assert!(matches!(Citation::new("   "), Err(ModelError::EmptyCitation)));
        let parsed: Result<Citation, _> = serde_json::from_str("\"\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn op_requires_fields_per_kind() {
        let err = ChangeOp::from_parts(ChangeKind::Substitution, Some("a".into()), None, None)
            .unwrap_err();
        assert!(matches!(
            err,
            ModelError::MissingField {
                kind: ChangeKind::Substitution,
                field: "new_text"
            }
        ));
        assert!(ChangeOp::from_parts(ChangeKind::GlobalReplace, None, Some("b".into()), None).is_err());
        assert!(ChangeOp::from_parts(ChangeKind::Insertion, None, Some("  ".into()), None).is_err());
        assert_eq!(
            ChangeOp::from_parts(ChangeKind::Deletion, None, None, None).unwrap(),
            ChangeOp::Deletion {
                original_text: None
            }
        );
    }

    #[test]
    fn op_serialises_with_kind_tag() {
        let op = ChangeOp::Substitution {
            original_text: Some("thirty days".into()),
            new_text: "forty-five days".into(),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["kind"], "substitution");
        assert_eq!(json["new_text"], "forty-five days");
    }

    #[test]
    fn requirement_follows_confidence_and_discrepancy() {
        assert_eq!(record(95, true, None).requirement(), ReviewRequirement::Auto);
        assert_eq!(
            record(95, true, Some("passes disagree")).requirement(),
            ReviewRequirement::Reviewer
        );
        assert_eq!(record(75, true, None).requirement(), ReviewRequirement::Reviewer);
        assert_eq!(record(60, true, None).requirement(), ReviewRequirement::Supervisor);
        assert_eq!(record(95, false, None).requirement(), ReviewRequirement::Supervisor);
    }

    #[test]
    fn coverage_counts_resolved_classified_spans() {
        let records = vec![record(95, true, None), record(30, false, None)];
        let cov = Coverage::compute(2, &records, 0.8);
        assert_eq!(cov.covered_spans, 1);
        assert!((cov.fraction - 0.5).abs() < 1e-9);
        assert!(cov.incomplete);
        assert_eq!(cov.uncovered, vec![1]);

        let empty = Coverage::compute(0, &[], 0.8);
        assert!(!empty.incomplete);
    }
}
