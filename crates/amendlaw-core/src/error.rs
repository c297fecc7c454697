use thiserror::Error;

use crate::change::ChangeKind;
use crate::document::{LineId, LineRange};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("source citation must not be empty")]
    EmptyCitation,

    #[error("{kind} change requires `{field}`")]
    MissingField {
        kind: ChangeKind,
        field: &'static str,
    },

    #[error("invalid section path: {0:?}")]
    InvalidSectionPath(String),

    #[error("line {line} breaks document order: {current} follows {previous}")]
    OutOfOrder {
        line: LineId,
        previous: String,
        current: String,
    },

    #[error("duplicate or retired line id: {0}")]
    DuplicateLine(LineId),

    #[error("unknown line id: {0}")]
    UnknownLine(LineId),

    #[error("invalid line range: {0}")]
    InvalidRange(LineRange),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("invalid configuration: {0}")]
    Config(String),
}
