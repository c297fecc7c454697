//! Location resolver: maps an intent's written target to line ranges.
//!
//! Resolution walks the Act's section-path index. An exact path match covers
//! the provision and all its descendants. Failing that, a reference that
//! names a clause falls back to the nearest clause of the same section and
//! is marked fuzzy. Relative references (`clause (c)` with no section) are
//! resolved only when exactly one provision fits.

use std::collections::BTreeSet;

use amendlaw_core::section_path::{Level, Reference, label_ordinal};
use amendlaw_core::{
    Act, ChangeIntent, ChangeOp, LineContext, LineRange, Resolution, ResolutionFailure,
    SectionPath,
};
use tracing::{debug, info};

/// An intent together with where it lands in the base version.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIntent {
    pub intent: ChangeIntent,
    pub resolution: Resolution,
    pub context: LineContext,
}

impl ResolvedIntent {
    fn unresolved(intent: ChangeIntent, failure: ResolutionFailure) -> Self {
        Self {
            intent,
            resolution: Resolution::Unresolved { failure },
            context: LineContext::default(),
        }
    }
}

/// A provision located through the section index.
struct Located {
    path: SectionPath,
    range: LineRange,
    fuzzy: bool,
}

pub struct Resolver<'a> {
    act: &'a Act,
}

impl<'a> Resolver<'a> {
    pub fn new(act: &'a Act) -> Self {
        Self { act }
    }

    /// Resolve every intent, logging how many landed.
    pub fn resolve_all(&self, intents: Vec<ChangeIntent>) -> Vec<ResolvedIntent> {
        let resolved: Vec<ResolvedIntent> =
            intents.into_iter().flat_map(|i| self.resolve(i)).collect();
        let unresolved = resolved
            .iter()
            .filter(|r| !r.resolution.is_resolved())
            .count();
        info!(
            act_id = self.act.act_id(),
            version = self.act.version(),
            records = resolved.len(),
            unresolved,
            "intents resolved"
        );
        resolved
    }

    /// Resolve one intent. Global replacements yield one result per
    /// occurrence line; everything else yields exactly one.
    pub fn resolve(&self, intent: ChangeIntent) -> Vec<ResolvedIntent> {
        if let ChangeOp::GlobalReplace { .. } = intent.op {
            return self.resolve_global(intent);
        }
        if intent.op == ChangeOp::Unclassified {
            return vec![ResolvedIntent::unresolved(intent, ResolutionFailure::NoTarget)];
        }
        let Some(reference) = intent.target_reference.clone() else {
            return vec![ResolvedIntent::unresolved(intent, ResolutionFailure::NoTarget)];
        };

        let located = match self.locate(&reference) {
            Ok(located) => located,
            Err(failure) => {
                debug!(%reference, %failure, "reference unresolved");
                return vec![ResolvedIntent::unresolved(intent, failure)];
            }
        };

        let range = match &intent.op {
            // Only the provision's heading line carries its own label.
            ChangeOp::Renumbering { .. } => Ok(LineRange::single(located.range.start)),
            ChangeOp::Substitution {
                original_text: Some(phrase),
                ..
            }
            | ChangeOp::Deletion {
                original_text: Some(phrase),
            } => self.narrow(&reference, phrase, located.range),
            _ => Ok(located.range),
        };

        match range {
            Ok(range) => vec![self.resolved(intent, range, located.path, located.fuzzy)],
            Err(failure) => vec![ResolvedIntent::unresolved(intent, failure)],
        }
    }

    fn resolved(
        &self,
        intent: ChangeIntent,
        range: LineRange,
        path: SectionPath,
        fuzzy: bool,
    ) -> ResolvedIntent {
        ResolvedIntent {
            context: self.context(&range),
            intent,
            resolution: Resolution::Resolved { range, path, fuzzy },
        }
    }

    /// One result per line of the scope containing the phrase. All results
    /// share the intent and therefore its citation.
    fn resolve_global(&self, intent: ChangeIntent) -> Vec<ResolvedIntent> {
        let Some(phrase) = intent.op.original_text().map(str::to_string) else {
            return vec![ResolvedIntent::unresolved(intent, ResolutionFailure::NoTarget)];
        };

        let (scope, fuzzy) = match intent.target_reference.as_deref() {
            Some(reference) => match self.locate(reference) {
                Ok(located) => (located.range, located.fuzzy),
                Err(failure) => return vec![ResolvedIntent::unresolved(intent, failure)],
            },
            None => match (self.act.lines().first(), self.act.lines().last()) {
                (Some(first), Some(last)) => (LineRange::new(first.id, last.id), false),
                _ => {
                    return vec![ResolvedIntent::unresolved(
                        intent,
                        ResolutionFailure::ReferenceNotFound {
                            reference: format!("'{phrase}'"),
                        },
                    )];
                }
            },
        };

        let hits: Vec<(LineRange, SectionPath)> = self
            .act
            .lines_in(&scope)
            .unwrap_or_default()
            .iter()
            .filter(|l| l.text.contains(&phrase))
            .map(|l| (LineRange::single(l.id), l.section_path.clone()))
            .collect();

        if hits.is_empty() {
            let reference = match &intent.target_reference {
                Some(r) => format!("'{phrase}' in {r}"),
                None => format!("'{phrase}'"),
            };
            return vec![ResolvedIntent::unresolved(
                intent,
                ResolutionFailure::ReferenceNotFound { reference },
            )];
        }
        debug!(%phrase, occurrences = hits.len(), "global replacement expanded");
        hits.into_iter()
            .map(|(range, path)| self.resolved(intent.clone(), range, path, fuzzy))
            .collect()
    }

    fn locate(&self, reference: &str) -> Result<Located, ResolutionFailure> {
        let not_found = || ResolutionFailure::ReferenceNotFound {
            reference: reference.to_string(),
        };
        match Reference::parse(reference) {
            None => Err(not_found()),
            Some(Reference::OutsideScope(_)) => Err(ResolutionFailure::ReferenceOutsideScope {
                reference: reference.to_string(),
            }),
            Some(Reference::Provision(path)) if !path.is_anchored() => {
                self.locate_relative(reference, &path)
            }
            Some(Reference::Provision(path)) => match self.act.provision_range(&path) {
                Some(range) => Ok(Located {
                    path,
                    range,
                    fuzzy: false,
                }),
                None => self.nearest_clause(&path).ok_or_else(not_found),
            },
        }
    }

    /// Complete a relative path against every provision in the Act and
    /// accept it only if exactly one completion exists.
    fn locate_relative(
        &self,
        reference: &str,
        relative: &SectionPath,
    ) -> Result<Located, ResolutionFailure> {
        let candidates: BTreeSet<SectionPath> = self
            .act
            .section_paths()
            .into_iter()
            .map(|p| relative.with_context(p))
            .filter(|c| c.is_anchored() && self.act.provision_range(c).is_some())
            .collect();

        let mut iter = candidates.iter();
        match (iter.next(), iter.next()) {
            (None, _) => Err(ResolutionFailure::ReferenceNotFound {
                reference: reference.to_string(),
            }),
            (Some(only), None) => {
                let range = self.act.provision_range(only).ok_or_else(|| {
                    ResolutionFailure::ReferenceNotFound {
                        reference: reference.to_string(),
                    }
                })?;
                Ok(Located {
                    path: only.clone(),
                    range,
                    fuzzy: true,
                })
            }
            _ => Err(ResolutionFailure::AmbiguousReference {
                reference: reference.to_string(),
                candidates: candidates.iter().map(|c| c.to_string()).collect(),
            }),
        }
    }

    /// Nearest existing clause of the same section, preferring the same
    /// sub-section. Only references that name a clause fall back.
    fn nearest_clause(&self, path: &SectionPath) -> Option<Located> {
        let wanted = path.get(Level::Clause)?;
        let wanted_ord = label_ordinal(Level::Clause, wanted)?;
        let section = SectionPath::section(path.get(Level::Section)?);

        let clauses: Vec<SectionPath> = self
            .act
            .section_paths()
            .into_iter()
            .filter(|p| p.starts_with(&section) && p.get(Level::Clause).is_some())
            .map(|p| p.truncated(Level::SubClause))
            .fold(Vec::new(), |mut acc, p| {
                if !acc.contains(&p) {
                    acc.push(p);
                }
                acc
            });

        let same_subsection: Vec<&SectionPath> = clauses
            .iter()
            .filter(|p| p.get(Level::Subsection) == path.get(Level::Subsection))
            .collect();
        let pool: Vec<&SectionPath> = if same_subsection.is_empty() {
            clauses.iter().collect()
        } else {
            same_subsection
        };

        let best = pool
            .into_iter()
            .filter_map(|p| {
                let ord = label_ordinal(Level::Clause, p.get(Level::Clause)?)?;
                Some((ord.abs_diff(wanted_ord), p))
            })
            .min_by_key(|(distance, _)| *distance)?
            .1
            .clone();

        let range = self.act.provision_range(&best)?;
        debug!(requested = %path, matched = %best, "fuzzy clause match");
        Some(Located {
            path: best,
            range,
            fuzzy: true,
        })
    }

    /// The single line inside `range` containing `phrase`.
    fn narrow(
        &self,
        reference: &str,
        phrase: &str,
        range: LineRange,
    ) -> Result<LineRange, ResolutionFailure> {
        let hits: Vec<_> = self
            .act
            .lines_in(&range)
            .unwrap_or_default()
            .iter()
            .filter(|l| l.text.contains(phrase))
            .map(|l| l.id)
            .collect();
        match hits.as_slice() {
            [] => Err(ResolutionFailure::ReferenceNotFound {
                reference: format!("'{phrase}' in {reference}"),
            }),
            [only] => Ok(LineRange::single(*only)),
            many => Err(ResolutionFailure::AmbiguousReference {
                reference: format!("'{phrase}' in {reference}"),
                candidates: many.iter().map(|id| id.to_string()).collect(),
            }),
        }
    }

    fn context(&self, range: &LineRange) -> LineContext {
        let lines = self.act.lines();
        let Some((start, end)) = self.act.range_positions(range) else {
            return LineContext::default();
        };
        LineContext {
            before: start
                .checked_sub(1)
                .and_then(|p| lines.get(p))
                .map(|l| l.text.clone()),
            after: lines.get(end + 1).map(|l| l.text.clone()),
        }
    }
}
