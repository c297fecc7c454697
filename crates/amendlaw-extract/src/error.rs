use amendlaw_core::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("span index {index} out of range (amendment has {spans} spans)")]
    SpanOutOfRange { index: usize, spans: usize },

    #[error("changesets do not describe the same amendment and act version: {0}")]
    Mismatch(String),

    #[error("extraction pass {pass} failed: {message}")]
    Pass { pass: String, message: String },

    #[error(transparent)]
    Model(#[from] ModelError),
}
