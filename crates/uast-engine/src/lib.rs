//! Tree engine for Universal Abstract Syntax Trees.
//!
//! The engine never owns the trees it works on. It sees them through the
//! [`Node`] trait and allocates new ones through a [`NodeCreator`], so the
//! same traversal, query and codec code runs over live host structures and
//! over decoded [`ExternalTree`]s alike.
//!
//! - [`TreeIter`] walks a tree in one of the [`TreeOrder`]s.
//! - [`query::filter`] selects nodes with JSONPath-style expressions.
//! - [`codec::encode`] / [`codec::decode`] serialize to CBOR or JSON.
//! - [`load`] copies any tree into another representation.

pub mod codec;
mod error;
mod external;
mod kind;
mod load;
mod node;
mod order;
pub mod query;

pub use codec::Format;
pub use error::EngineError;
pub use external::{ExternalTree, HandleNode, NodeHandle};
pub use kind::NodeKind;
pub use load::load;
pub use node::{Node, NodeCreator, NodeError, NodeId, NodeResult};
pub use order::{TreeIter, TreeOrder};
