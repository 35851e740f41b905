//! Error types for classification.

use thiserror::Error;

/// Errors returned by a [`LogParser`](crate::classifier::LogParser).
///
/// Only failures of the whole body are reported. A single malformed message or
/// content block inside an otherwise valid body is skipped instead.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The body is not valid JSON or does not have the expected top-level shape.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The parser does not handle this kind of body.
    #[error("unsupported body: {0}")]
    Unsupported(&'static str),
}

/// Result type for classification.
pub type Result<T> = std::result::Result<T, ParseError>;
