use amendlaw_core::{ChangeId, Decision, ModelError, ReviewState};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown act: {0}")]
    UnknownAct(String),

    #[error("act {0} already imported")]
    ActExists(String),

    #[error("act {act_id} has no version {version}")]
    UnknownVersion { act_id: String, version: u32 },

    #[error("version_conflict on {act_id}: expected head v{expected}, found v{actual}")]
    VersionConflict {
        act_id: String,
        expected: u32,
        actual: u32,
    },

    #[error("unknown changeset: {0}")]
    UnknownChangeSet(String),

    #[error("changeset {0} already registered")]
    ChangeSetExists(String),

    #[error("no reverse patch recorded for {act_id} v{version}")]
    NoReversePatch { act_id: String, version: u32 },

    #[error("lock poisoned: {0}")]
    Poisoned(String),

    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("unknown change: {0}")]
    UnknownChange(ChangeId),

    #[error("stale_review on {change_id}: expected {expected}, current state is {actual}")]
    StaleReview {
        change_id: ChangeId,
        expected: ReviewState,
        actual: ReviewState,
    },

    #[error("cannot record {decision} on {change_id} while {from}")]
    InvalidTransition {
        change_id: ChangeId,
        from: ReviewState,
        decision: Decision,
    },

    #[error("conflict(with={with}): {change_id} overlaps an accepted change")]
    Conflict { change_id: ChangeId, with: ChangeId },

    #[error("unresolved change {0} cannot be accepted")]
    Unresolved(ChangeId),

    #[error("bulk decision needs at least one change")]
    EmptyBatch,

    #[error("change {0} listed twice in one batch")]
    DuplicateInBatch(ChangeId),

    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("changeset targets {expected}, apply was given {actual}")]
    WrongBase { expected: String, actual: String },

    #[error("stale_resolution for {change_id}: {reason}")]
    StaleResolution { change_id: ChangeId, reason: String },

    #[error("accepted changes {first} and {second} overlap")]
    Overlap { first: ChangeId, second: ChangeId },

    #[error("order_violation: {0}")]
    OrderViolation(String),

    #[error("reverse patch is for v{expected}, act is v{actual}")]
    PatchMismatch { expected: u32, actual: u32 },

    #[error("reverse patch could not be applied: {0}")]
    Reverse(#[source] ModelError),
}
