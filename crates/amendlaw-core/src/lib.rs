pub mod amendment;
pub mod change;
pub mod config;
pub mod document;
pub mod error;
pub mod manifest;
pub mod review;
pub mod schema;
pub mod section_path;

pub use amendment::{Amendment, InstructionSpan, SourceLocation};
pub use change::{
    ChangeId, ChangeIntent, ChangeKind, ChangeOp, ChangeRecord, ChangeSet, ChangeSetSummary,
    Citation, Confidence, ConfidenceLevel, Coverage, LineContext, Resolution, ResolutionFailure,
    ReviewRequirement, Validation,
};
pub use config::{ConfidencePolicy, EngineConfig};
pub use document::{Act, ActDraft, Line, LineId, LineRange, SourceLine, infer_source_lines, label_path};
pub use error::ModelError;
pub use manifest::{AppliedChange, Manifest};
pub use review::{Decision, ReviewDecision, ReviewState};
pub use schema::manifest::{manifest_schema, manifest_to_record_batch};
pub use section_path::{LabelKey, Level, Reference, SectionPath, provision_key};
