//! Adapter between dynamically-typed host object graphs and the UAST engine.
//!
//! Host values ([`HostValue`]) are classified into node kinds, wrapped in
//! identity-preserving [`Node`]s and handed to the engine for traversal,
//! JSONPath queries and encoding. Decoded buffers stay in the engine's
//! handle-addressed form behind an [`ExternalContext`] until they are
//! explicitly loaded back into host values.
//!
//! ```
//! use uast_bridge::{iterator, HostValue, TreeOrder};
//!
//! let doc = HostValue::dict([("a", HostValue::int(1)), ("b", HostValue::list([]))]);
//! let visited = iterator(&doc, TreeOrder::PreOrder).unwrap().count();
//! assert_eq!(visited, 3);
//! ```

mod classify;
pub mod cli;
mod context;
mod error;
mod external;
mod host;
mod interface;
mod iterator;
mod node;
mod tracker;

pub use classify::classify;
pub use context::Context;
pub use error::{Error, Result};
pub use external::{ExternalContext, ExternalNode};
pub use host::{HostData, HostError, HostId, HostResult, HostValue};
pub use interface::Interface;
pub use iterator::NodeIterator;
pub use node::Node;
pub use tracker::{MemTracker, ScopeId, TrackerStats};
pub use uast_engine::{Format, NodeHandle, NodeKind, TreeOrder};

use uast_engine::codec;

/// A new explicit context with no root bound.
pub fn uast() -> Context {
    Context::new()
}

/// Parses `buf` into an external tree without creating host values.
pub fn decode(buf: &[u8], format: Format) -> Result<ExternalContext> {
    let tree = codec::decode(buf, format)?;
    Ok(ExternalContext::new(tree))
}

/// What a boundary call was given.
enum Target<'a> {
    External(std::rc::Rc<ExternalNode>),
    Live(&'a HostValue),
}

fn target(value: &HostValue) -> Result<Target<'_>> {
    if let Some(node) = ExternalNode::from_host(value) {
        return Ok(Target::External(node));
    }
    match value.data() {
        HostData::Capsule(_) => Err(Error::foreign(format!(
            "expected a node or an external node, got {}",
            value.type_name()
        ))),
        _ => Ok(Target::Live(value)),
    }
}

/// Walks the tree under `value` in `order`.
///
/// External node capsules are walked inside their own context, which the
/// iterator only borrows. A bare host value gets a context of its own that
/// lives exactly as long as the returned iterator.
pub fn iterator(value: &HostValue, order: TreeOrder) -> Result<NodeIterator> {
    match target(value)? {
        Target::External(node) => node.iterate(order),
        Target::Live(value) => Ok(Context::with_root(value.clone()).into_iterator(order)),
    }
}

/// Evaluates `query` against the tree under `value`, with the same context
/// ownership rules as [`iterator`].
pub fn filter(value: &HostValue, query: &str) -> Result<NodeIterator> {
    match target(value)? {
        Target::External(node) => node.filter(query),
        Target::Live(value) => Context::with_root(value.clone()).into_filter(query),
    }
}

/// Evaluates `query` against the tree under `value` and reads the result as
/// a boolean.
pub fn filter_bool(value: &HostValue, query: &str) -> Result<bool> {
    match target(value)? {
        Target::External(node) => node.filter_bool(query),
        Target::Live(value) => Context::with_root(value.clone()).filter_bool(query, None),
    }
}

/// Evaluates `query` against the tree under `value`; it must match exactly
/// one numeric node.
pub fn filter_number(value: &HostValue, query: &str) -> Result<f64> {
    match target(value)? {
        Target::External(node) => node.filter_number(query),
        Target::Live(value) => Context::with_root(value.clone()).filter_number(query, None),
    }
}

/// Evaluates `query` against the tree under `value`; it must match exactly
/// one scalar node.
pub fn filter_string(value: &HostValue, query: &str) -> Result<String> {
    match target(value)? {
        Target::External(node) => node.filter_string(query),
        Target::Live(value) => Context::with_root(value.clone()).filter_string(query, None),
    }
}

/// Serializes the tree under `value`.
pub fn encode(value: &HostValue, format: Format) -> Result<Vec<u8>> {
    match target(value)? {
        Target::External(node) => node.encode(format),
        Target::Live(value) => Context::with_root(value.clone()).encode(None, format),
    }
}
