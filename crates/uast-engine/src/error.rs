use thiserror::Error;

use crate::codec::Format;
use crate::node::NodeError;
use crate::query::ParseError;

/// Failure reported by an engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error("invalid query: {0}")]
    Query(#[from] ParseError),
    #[error("malformed {format} buffer: {reason}")]
    Decode { format: Format, reason: String },
    #[error("cannot encode as {format}: {reason}")]
    Encode { format: Format, reason: String },
    #[error("tree contains a cycle")]
    Cycle,
    /// A scalar query whose result cannot be read as the requested type.
    #[error("query result is not a {expected}: {reason}")]
    Coerce { expected: &'static str, reason: String },
    #[error("unknown tree order: {0}")]
    UnknownOrder(String),
    #[error("unknown format: {0}")]
    UnknownFormat(String),
}

impl EngineError {
    pub(crate) fn decode(format: Format, reason: impl Into<String>) -> Self {
        EngineError::Decode { format, reason: reason.into() }
    }

    pub(crate) fn coerce(expected: &'static str, reason: impl Into<String>) -> Self {
        EngineError::Coerce { expected, reason: reason.into() }
    }

    pub(crate) fn encode(format: Format, reason: impl Into<String>) -> Self {
        EngineError::Encode { format, reason: reason.into() }
    }
}
