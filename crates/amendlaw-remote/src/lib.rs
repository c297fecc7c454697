//! Remote extraction passes: producers of change intents that live behind a
//! network boundary.

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{HttpExtractionPass, RemoteError};
