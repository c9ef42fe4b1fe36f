use thiserror::Error;
use uast_engine::{EngineError, NodeError, NodeKind};

use crate::host::HostError;

/// Failure surfaced to the host.
#[derive(Debug, Error)]
pub enum Error {
    /// An accessor was used on a node of the wrong kind.
    #[error("expected {expected} node, found {found}")]
    TypeMismatch { expected: &'static str, found: NodeKind },
    /// A value that is not a recognized node wrapper, or a wrapper whose
    /// context no longer exists.
    #[error("{0}")]
    ForeignObject(String),
    /// Query, traversal or codec failure reported by the engine.
    #[error(transparent)]
    Engine(EngineError),
    /// A host operation failed; carried unchanged.
    #[error(transparent)]
    Host(#[from] HostError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn foreign(what: impl Into<String>) -> Self {
        Error::ForeignObject(what.into())
    }

    pub(crate) fn context_gone() -> Self {
        Error::foreign("the context that issued this object was destroyed")
    }
}

impl From<NodeError> for Error {
    fn from(err: NodeError) -> Self {
        match err {
            NodeError::Kind { expected, found } => Error::TypeMismatch { expected, found },
            NodeError::Detached => Error::context_gone(),
            NodeError::Host(boxed) => match boxed.downcast::<HostError>() {
                Ok(host) => Error::Host(*host),
                Err(other) => Error::Engine(EngineError::Node(NodeError::Host(other))),
            },
            other => Error::Engine(EngineError::Node(other)),
        }
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Node(err) => err.into(),
            other => Error::Engine(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_errors_come_back_unchanged() {
        let err: Error = EngineError::Node(NodeError::host(HostError::Immutable("tuple"))).into();
        assert!(matches!(err, Error::Host(HostError::Immutable("tuple"))));
    }

    #[test]
    fn kind_errors_are_type_mismatches() {
        let err: Error = NodeError::kind("int", NodeKind::Array).into();
        assert_eq!(err.to_string(), "expected int node, found array");
    }

    #[test]
    fn other_engine_errors_stay_engine_errors() {
        let err: Error = EngineError::UnknownOrder("sideways".into()).into();
        assert!(matches!(err, Error::Engine(EngineError::UnknownOrder(_))));
    }
}
