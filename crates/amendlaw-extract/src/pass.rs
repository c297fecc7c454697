//! Extraction passes and the dual-pass pipeline.
//!
//! Every producer of change intents, local or remote, implements
//! [`ExtractionPass`]. Their output is resolved against the Act with
//! [`resolve_pass`] and two such ChangeSets are merged by
//! [`reconcile`](crate::validation::reconcile). [`run_dual_pass`] does all of
//! it with the two passes running concurrently.

use amendlaw_core::{
    Act, Amendment, ChangeIntent, ChangeKind, ChangeOp, ChangeSet, Citation, EngineConfig,
    Validation,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classifier::Classifier;
use crate::error::ExtractError;
use crate::resolver::Resolver;
use crate::validation::{Draft, Scorer, assemble, reconcile};

/// A pre-classified intent as produced by an extraction pass.
///
/// This is also the wire format of remote passes, so every field except
/// the span index and kind is optional. A missing citation is back-filled
/// from the span and forces LOW confidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedIntent {
    pub span_index: usize,
    pub kind: ChangeKind,
    #[serde(default)]
    pub target_reference: Option<String>,
    #[serde(default)]
    pub original_text: Option<String>,
    #[serde(default)]
    pub new_text: Option<String>,
    #[serde(default)]
    pub new_label: Option<String>,
    #[serde(default)]
    pub citation: Option<String>,
}

impl From<&ChangeIntent> for ProposedIntent {
    fn from(intent: &ChangeIntent) -> Self {
        let new_label = match &intent.op {
            ChangeOp::Renumbering { new_label } => Some(new_label.clone()),
            _ => None,
        };
        let new_text = match &intent.op {
            ChangeOp::Renumbering { .. } => None,
            op => op.new_text().map(str::to_string),
        };
        Self {
            span_index: intent.span_index,
            kind: intent.kind(),
            target_reference: intent.target_reference.clone(),
            original_text: intent.op.original_text().map(str::to_string),
            new_text,
            new_label,
            citation: Some(intent.source_citation.as_str().to_string()),
        }
    }
}

/// One independent producer of change intents.
#[async_trait]
pub trait ExtractionPass: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(
        &self,
        amendment: &Amendment,
        act: &Act,
    ) -> Result<Vec<ProposedIntent>, ExtractError>;
}

/// The built-in pass: runs the pattern classifier over every span.
#[derive(Debug, Clone)]
pub struct PatternPass {
    name: String,
    classifier: Classifier,
}

impl PatternPass {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_classifier(name, Classifier::standard())
    }

    pub fn with_classifier(name: impl Into<String>, classifier: Classifier) -> Self {
        Self {
            name: name.into(),
            classifier,
        }
    }
}

#[async_trait]
impl ExtractionPass for PatternPass {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(
        &self,
        amendment: &Amendment,
        _act: &Act,
    ) -> Result<Vec<ProposedIntent>, ExtractError> {
        Ok(self
            .classifier
            .classify_amendment(amendment)
            .iter()
            .map(ProposedIntent::from)
            .collect())
    }
}

/// Turn one pass's proposals into a single-pass ChangeSet.
///
/// Proposals whose fields do not fit their kind become `unclassified`
/// records carrying the reason as a discrepancy, so nothing is dropped.
pub fn resolve_pass(
    pass: &str,
    proposals: Vec<ProposedIntent>,
    amendment: &Amendment,
    act: &Act,
    config: &EngineConfig,
) -> Result<ChangeSet, ExtractError> {
    let resolver = Resolver::new(act);
    let scorer = Scorer::new(amendment, act, &config.confidence);
    let mut drafts = Vec::with_capacity(proposals.len());

    for proposal in proposals {
        let span = amendment
            .span(proposal.span_index)
            .ok_or(ExtractError::SpanOutOfRange {
                index: proposal.span_index,
                spans: amendment.len(),
            })?;

        let supplied = proposal
            .citation
            .filter(|c| !c.trim().is_empty());
        let citation_backfilled = supplied.is_none();
        let source_citation = Citation::new(supplied.unwrap_or_else(|| span.text.clone()))?;

        let (op, note) = match ChangeOp::from_parts(
            proposal.kind,
            proposal.original_text,
            proposal.new_text,
            proposal.new_label,
        ) {
            Ok(op) => (op, None),
            Err(e) => {
                debug!(pass, span = proposal.span_index, error = %e, "invalid proposal");
                (ChangeOp::Unclassified, Some(format!("invalid proposal: {e}")))
            }
        };

        let intent = ChangeIntent {
            op,
            target_reference: proposal.target_reference,
            source_citation,
            span_index: proposal.span_index,
        };

        for resolved in resolver.resolve(intent) {
            let confidence =
                scorer.single_pass(&resolved.intent, &resolved.resolution, citation_backfilled);
            drafts.push(Draft {
                intent: resolved.intent,
                resolution: resolved.resolution,
                context: resolved.context,
                confidence,
                validation: Validation {
                    primary_extracted: true,
                    secondary_confirmed: false,
                    discrepancy: note.clone(),
                    citation_backfilled,
                },
            });
        }
    }

    let changeset_id = ChangeSet::make_id(&amendment.amendment_id, act.act_id(), act.version());
    let prefix = format!("{changeset_id}/{pass}");
    let changeset = assemble(changeset_id, &prefix, amendment, act, drafts, config);
    info!(pass, records = changeset.records.len(), "pass resolved");
    Ok(changeset)
}

/// Run both passes concurrently, resolve each against `act` and reconcile.
///
/// Dropping the returned future abandons both passes.
pub async fn run_dual_pass(
    primary: &dyn ExtractionPass,
    secondary: &dyn ExtractionPass,
    amendment: &Amendment,
    act: &Act,
    config: &EngineConfig,
) -> Result<ChangeSet, ExtractError> {
    info!(
        primary = primary.name(),
        secondary = secondary.name(),
        amendment_id = %amendment.amendment_id,
        spans = amendment.len(),
        "starting dual-pass extraction"
    );
    let (first, second) = futures::try_join!(
        primary.extract(amendment, act),
        secondary.extract(amendment, act)
    )?;

    let first = resolve_pass(primary.name(), first, amendment, act, config)?;
    let second = resolve_pass(secondary.name(), second, amendment, act, config)?;
    reconcile(&first, &second, amendment, act, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use amendlaw_core::{ConfidenceLevel, LineId, LineRange, ReviewRequirement, SourceLine};

    fn act() -> Act {
        let rows = [
            ("15. Appeals.", "15"),
            ("(1) Any person aggrieved may appeal to the District Magistrate.", "15(1)"),
            ("(2) An appeal shall be filed within thirty days.", "15(2)"),
            ("16. The District Magistrate may condone delay.", "16"),
            ("17. The District Magistrate shall keep records.", "17"),
        ];
        Act::from_source_lines(
            "act-1",
            rows.iter()
                .map(|(text, hint)| SourceLine {
                    text: text.to_string(),
                    page: None,
                    section_path_hint: Some(hint.to_string()),
                })
                .collect(),
        )
        .unwrap()
    }

    /// A pass that returns canned proposals.
    struct Canned(Vec<ProposedIntent>);

    #[async_trait]
    impl ExtractionPass for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn extract(
            &self,
            _amendment: &Amendment,
            _act: &Act,
        ) -> Result<Vec<ProposedIntent>, ExtractError> {
            Ok(self.0.clone())
        }
    }

    /// A pass that always fails.
    struct Broken;

    #[async_trait]
    impl ExtractionPass for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn extract(
            &self,
            _amendment: &Amendment,
            _act: &Act,
        ) -> Result<Vec<ProposedIntent>, ExtractError> {
            Err(ExtractError::Pass {
                pass: "broken".into(),
                message: "model unavailable".into(),
            })
        }
    }

    #[tokio::test]
    async fn agreeing_pattern_passes_give_high_confidence() {
        let amendment = Amendment::from_text(
            "amd-1",
            "In Section 15(2), for the words 'thirty days', substitute 'forty-five days'.",
        );
        let cs = run_dual_pass(
            &PatternPass::new("primary"),
            &PatternPass::new("secondary"),
            &amendment,
            &act(),
            &EngineConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(cs.records.len(), 1);
        let r = &cs.records[0];
        assert_eq!(r.kind(), ChangeKind::Substitution);
        assert_eq!(r.range(), Some(LineRange::single(LineId(3))));
        assert_eq!(r.confidence().level, ConfidenceLevel::High);
        assert_eq!(r.requirement(), ReviewRequirement::Auto);
        assert!(r.validation().secondary_confirmed);
    }

    #[tokio::test]
    async fn missing_citation_is_backfilled_and_low() {
        let amendment = Amendment::from_text("amd-1", "Delete Section 16.");
        let proposals = vec![ProposedIntent {
            span_index: 0,
            kind: ChangeKind::Deletion,
            target_reference: Some("Section 16".into()),
            original_text: None,
            new_text: None,
            new_label: None,
            citation: None,
        }];
        let cs = run_dual_pass(
            &Canned(proposals),
            &Canned(vec![]),
            &amendment,
            &act(),
            &EngineConfig::default(),
        )
        .await
        .unwrap();
        let r = &cs.records[0];
        assert_eq!(r.citation().as_str(), "Delete Section 16.");
        assert!(r.validation().citation_backfilled);
        assert_eq!(r.confidence().level, ConfidenceLevel::Low);
        assert_eq!(r.requirement(), ReviewRequirement::Supervisor);
    }

    #[tokio::test]
    async fn invalid_proposal_becomes_unclassified() {
        let amendment = Amendment::from_text("amd-1", "Substitute something.");
        let proposals = vec![ProposedIntent {
            span_index: 0,
            kind: ChangeKind::Substitution,
            target_reference: Some("Section 16".into()),
            original_text: None,
            new_text: None,
            new_label: None,
            citation: Some("Substitute something.".into()),
        }];
        let cs = resolve_pass(
            "canned",
            proposals,
            &amendment,
            &act(),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(cs.records[0].kind(), ChangeKind::Unclassified);
        assert!(
            cs.records[0]
                .validation()
                .discrepancy
                .as_deref()
                .is_some_and(|d| d.contains("new_text"))
        );
    }

    #[tokio::test]
    async fn span_out_of_range_is_an_error() {
        let amendment = Amendment::from_text("amd-1", "Delete Section 16.");
        let proposals = vec![ProposedIntent {
            span_index: 7,
            kind: ChangeKind::Deletion,
            target_reference: Some("Section 16".into()),
            original_text: None,
            new_text: None,
            new_label: None,
            citation: Some("Delete Section 16.".into()),
        }];
        let err = run_dual_pass(
            &Canned(proposals),
            &Canned(vec![]),
            &amendment,
            &act(),
            &EngineConfig::default(),
        )
        .await;
        assert!(matches!(
            err,
            Err(ExtractError::SpanOutOfRange { index: 7, spans: 1 })
        ));
    }

    #[tokio::test]
    async fn failing_pass_fails_the_run() {
        let amendment = Amendment::from_text("amd-1", "Delete Section 16.");
        let err = run_dual_pass(
            &PatternPass::new("primary"),
            &Broken,
            &amendment,
            &act(),
            &EngineConfig::default(),
        )
        .await;
        assert!(matches!(err, Err(ExtractError::Pass { .. })));
    }

    #[test]
    fn proposed_intent_round_trips_a_renumbering() {
        let intent = ChangeIntent {
            op: ChangeOp::Renumbering {
                new_label: "17".into(),
            },
            target_reference: Some("section 16".into()),
            source_citation: Citation::new("Section 16 shall be renumbered as section 17.").unwrap(),
            span_index: 0,
        };
        let proposal = ProposedIntent::from(&intent);
        assert_eq!(proposal.new_label.as_deref(), Some("17"));
        assert_eq!(proposal.new_text, None);
        let json = serde_json::to_string(&proposal).unwrap();
        let back: ProposedIntent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, proposal);
    }
}
