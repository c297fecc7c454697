//! Act version history, review ledger and apply engine.

pub mod apply;
mod error;
pub mod history;
pub mod review;
mod service;

pub use apply::{ApplyOutcome, Approved, Footprint, ReverseOp, ReversePatch, apply_changes, apply_reverse};
pub use error::{ApplyError, ReviewError, StoreError};
pub use history::{ActHistory, Provenance, VersionRecord};
pub use review::{AUTO_REVIEWER, ReviewLedger};
pub use service::{AmendmentService, Applied};
