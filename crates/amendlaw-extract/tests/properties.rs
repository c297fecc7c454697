//! Property tests for extraction: citations are never empty, agreeing passes
//! score HIGH, disagreeing passes never do.

use amendlaw_core::{Act, Amendment, ChangeKind, ConfidenceLevel, EngineConfig, SourceLine};
use amendlaw_extract::{Classifier, PatternPass, ProposedIntent, reconcile, resolve_pass, run_dual_pass};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

const PHRASES: &[&str] = &[
    "thirty days",
    "the Collector",
    "a fine",
    "prescribed form",
    "District Magistrate",
    "one thousand rupees",
];

fn line(text: String, hint: Option<String>) -> SourceLine {
    SourceLine {
        text,
        page: Some(1),
        section_path_hint: hint,
    }
}

/// An Act whose section `section` has sub-section `sub` containing `phrase`.
fn act_with(section: u32, sub: u32, phrase: &str) -> Act {
    let mut lines = vec![line("The Sample Act".into(), None)];
    for s in 1..=section {
        lines.push(line(format!("{s}. Heading of section {s}."), Some(s.to_string())));
        if s == section {
            for k in 1..=sub {
                let text = if k == sub {
                    format!("({k}) Subject to {phrase} as provided.")
                } else {
                    format!("({k}) General provision.")
                };
                lines.push(line(text, Some(format!("{s}({k})"))));
            }
        }
    }
    Act::from_source_lines("act-prop", lines).unwrap()
}

fn arb_instruction_text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-z0-9 ,.;()'-]{0,120}",
        (1u32..40, prop::sample::select(PHRASES), prop::sample::select(PHRASES)).prop_map(
            |(s, old, new)| format!("In section {s}, for the words '{old}', substitute '{new}'.")
        ),
        (1u32..40).prop_map(|s| format!("Delete Section {s}.")),
        prop::sample::select(PHRASES)
            .prop_map(|p| format!("Wherever '{p}' occurs, substitute 'the Authority'.")),
    ]
}

/// Words that take part in no instruction pattern.
const FILLER: &[&str] = &[
    "gazette",
    "notification",
    "annexed",
    "hereto",
    "published",
    "forthwith",
    "government",
    "manner",
    "commencement",
    "tribunal",
];

/// One sentence: an instruction the classifier knows, or plain prose
/// (`Err`, carrying the prose without its full stop).
fn arb_sentence() -> impl Strategy<Value = Result<String, String>> {
    prop_oneof![
        (1u32..40).prop_map(|s| Ok(format!("Delete Section {s}."))),
        (1u32..40).prop_map(|s| Ok(format!("Section {s} shall be omitted."))),
        prop::sample::select(PHRASES)
            .prop_map(|p| Ok(format!("Wherever '{p}' occurs, substitute 'the Authority'."))),
        prop::collection::vec(prop::sample::select(FILLER), 1..5).prop_map(|w| Err(w.join(" "))),
    ]
}

fn arb_amendment_text() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_instruction_text(), 0..6).prop_map(|spans| spans.join("\n\n"))
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Every non-blank span yields at least one intent, and every intent
    /// carries a non-empty citation.
    #[test]
    fn classifier_never_drops_spans_or_citations(text in arb_amendment_text()) {
        let amendment = Amendment::from_text("amd-prop", &text);
        let intents = Classifier::standard().classify_amendment(&amendment);
        for span in amendment.spans() {
            prop_assert!(intents.iter().any(|i| i.span_index == span.index));
        }
        for intent in &intents {
            prop_assert!(!intent.source_citation.as_str().trim().is_empty());
        }
    }

    /// Prose sitting between recognised instructions in one span is carried
    /// by some intent's citation.
    #[test]
    fn classifier_keeps_text_between_matches(sentences in prop::collection::vec(arb_sentence(), 1..6)) {
        let text = sentences
            .iter()
            .map(|s| match s {
                Ok(instruction) => instruction.clone(),
                Err(prose) => format!("{prose}."),
            })
            .collect::<Vec<_>>()
            .join(" ");
        let amendment = Amendment::from_text("amd-prop", &text);
        let intents = Classifier::standard().classify_amendment(&amendment);
        for prose in sentences.iter().filter_map(|s| s.as_ref().err()) {
            prop_assert!(
                intents.iter().any(|i| i.source_citation.as_str().contains(prose.as_str())),
                "{prose:?} is in no citation of {text:?}"
            );
        }
    }

    /// Resolved records keep non-empty citations, including back-filled ones.
    #[test]
    fn resolved_records_have_citations(text in arb_amendment_text(), drop_citations in any::<bool>()) {
        let amendment = Amendment::from_text("amd-prop", &text);
        let act = act_with(5, 2, "thirty days");
        let proposals: Vec<ProposedIntent> = Classifier::standard()
            .classify_amendment(&amendment)
            .iter()
            .map(|i| {
                let mut p = ProposedIntent::from(i);
                if drop_citations {
                    p.citation = None;
                }
                p
            })
            .collect();
        let cs = resolve_pass("prop", proposals, &amendment, &act, &EngineConfig::default()).unwrap();
        for record in &cs.records {
            prop_assert!(!record.citation().as_str().is_empty());
            if drop_citations {
                prop_assert!(record.confidence().level == ConfidenceLevel::Low);
            }
        }
    }

    /// Two passes agreeing on kind, texts and an exact range give HIGH and
    /// `secondary_confirmed`.
    #[test]
    fn agreement_scores_at_least_ninety(
        section in 1u32..30,
        sub in 1u32..4,
        old in prop::sample::select(PHRASES),
        new in prop::sample::select(PHRASES),
    ) {
        let act = act_with(section, sub, old);
        let text = format!("In Section {section}({sub}), for the words '{old}', substitute '{new}'.");
        let amendment = Amendment::from_text("amd-prop", &text);
        let cs = futures::executor::block_on(run_dual_pass(
            &PatternPass::new("primary"),
            &PatternPass::new("secondary"),
            &amendment,
            &act,
            &EngineConfig::default(),
        ))
        .unwrap();
        prop_assert_eq!(cs.records.len(), 1);
        let r = &cs.records[0];
        prop_assert_eq!(r.kind(), ChangeKind::Substitution);
        prop_assert!(r.confidence().score >= 90);
        prop_assert!(r.validation().secondary_confirmed);
    }

    /// Passes that land on the same range but disagree on text never give HIGH.
    #[test]
    fn disagreement_is_never_high(
        section in 1u32..30,
        sub in 1u32..4,
        old in prop::sample::select(PHRASES),
        (a, b) in (prop::sample::select(PHRASES), prop::sample::select(PHRASES))
            .prop_filter("texts must differ", |(a, b)| a != b),
    ) {
        let act = act_with(section, sub, old);
        let text = format!("In Section {section}({sub}), for the words '{old}', substitute '{a}'.");
        let amendment = Amendment::from_text("amd-prop", &text);
        let proposal = |new: &str| ProposedIntent {
            span_index: 0,
            kind: ChangeKind::Substitution,
            target_reference: Some(format!("Section {section}({sub})")),
            original_text: Some(old.to_string()),
            new_text: Some(new.to_string()),
            new_label: None,
            citation: Some(text.clone()),
        };
        let config = EngineConfig::default();
        let first = resolve_pass("a", vec![proposal(a)], &amendment, &act, &config).unwrap();
        let second = resolve_pass("b", vec![proposal(b)], &amendment, &act, &config).unwrap();
        let cs = reconcile(&first, &second, &amendment, &act, &config).unwrap();
        for record in &cs.records {
            prop_assert!(record.confidence().level != ConfidenceLevel::High);
            prop_assert!(record.validation().discrepancy.is_some());
        }
    }
}
