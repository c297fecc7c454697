//! Change extraction: instruction classification, location resolution and
//! dual-pass validation.

pub mod classifier;
pub mod error;
pub mod pass;
pub mod resolver;
pub mod validation;

pub use classifier::{Classifier, Pattern};
pub use error::ExtractError;
pub use pass::{ExtractionPass, PatternPass, ProposedIntent, resolve_pass, run_dual_pass};
pub use resolver::{ResolvedIntent, Resolver};
pub use validation::{Scorer, reconcile};
