//! Decoded trees exposed to the host without materializing them.

use std::rc::{Rc, Weak};

use uast_engine::{
    codec, query, EngineError, ExternalTree, Format, HandleNode, NodeHandle, NodeKind, TreeIter, TreeOrder,
};

use crate::error::{Error, Result};
use crate::host::HostValue;
use crate::interface::Interface;
use crate::iterator::{Cursor, NodeIterator, Ownership};

pub(crate) struct ExternalInner {
    tree: Rc<ExternalTree>,
}

impl Drop for ExternalInner {
    fn drop(&mut self) {
        tracing::debug!(nodes = self.tree.len(), "destroying external context");
    }
}

/// Owner of a decoded tree.
///
/// Nodes are addressed by [`NodeHandle`]s and handed to the host as
/// [`ExternalNode`] capsules. Dropping the context invalidates every capsule
/// issued from it: they report a foreign-object error from then on.
pub struct ExternalContext {
    inner: Rc<ExternalInner>,
}

impl ExternalContext {
    pub(crate) fn new(tree: ExternalTree) -> Self {
        tracing::debug!(nodes = tree.len(), "creating external context");
        ExternalContext { inner: Rc::new(ExternalInner { tree: Rc::new(tree) }) }
    }

    fn capsule(&self, handle: NodeHandle) -> HostValue {
        HostValue::capsule(ExternalNode::new(Rc::downgrade(&self.inner), handle))
    }

    fn handle_node(&self, handle: NodeHandle) -> HandleNode {
        HandleNode::new(Rc::clone(&self.inner.tree), handle)
    }

    /// Root node as an [`ExternalNode`] capsule.
    pub fn root(&self) -> Option<HostValue> {
        self.inner.tree.root().map(|handle| self.capsule(handle))
    }

    /// Resolves an optional capsule to a handle of this context, defaulting
    /// to the root.
    fn start(&self, node: Option<&HostValue>) -> Result<Option<NodeHandle>> {
        let Some(value) = node else { return Ok(self.inner.tree.root()) };
        let node = ExternalNode::from_host(value)
            .ok_or_else(|| Error::foreign(format!("expected an external node, got {}", value.type_name())))?;
        if !node.ctx.ptr_eq(&Rc::downgrade(&self.inner)) {
            return Err(Error::foreign("external node belongs to another context"));
        }
        Ok(Some(node.handle))
    }

    pub fn filter(&self, query: &str, node: Option<&HostValue>) -> Result<NodeIterator> {
        let ownership = Ownership::Borrowed(Rc::downgrade(&self.inner));
        filter_external(&self.inner, self.start(node)?, query, ownership)
    }

    pub fn iterate(&self, node: Option<&HostValue>, order: TreeOrder) -> Result<NodeIterator> {
        let cursor = match self.start(node)? {
            Some(handle) => TreeIter::new(self.handle_node(handle), order),
            None => TreeIter::empty(order),
        };
        let ownership = Ownership::Borrowed(Rc::downgrade(&self.inner));
        Ok(NodeIterator::external(Cursor::Walk(cursor), ownership))
    }

    /// Re-serializes `node` (the root when absent) straight from the decoded
    /// tree.
    pub fn encode(&self, node: Option<&HostValue>, format: Format) -> Result<Vec<u8>> {
        match self.start(node)? {
            Some(handle) => Ok(codec::encode(&self.handle_node(handle), format)?),
            None => Ok(Vec::new()),
        }
    }

    /// Materializes `node` (the root when absent) as fresh host values.
    pub fn load(&self, node: Option<&HostValue>) -> Result<HostValue> {
        match self.start(node)? {
            Some(handle) => load_handle(&self.handle_node(handle)),
            None => Ok(HostValue::none()),
        }
    }

    /// Evaluates `query` and reads the result as a boolean. No match is
    /// `false`; more than one match is `true`.
    pub fn filter_bool(&self, query: &str, node: Option<&HostValue>) -> Result<bool> {
        self.matches(query, node).and_then(|m| Ok(query::coerce_bool(&m)?))
    }

    /// Evaluates `query`, which must match exactly one numeric node.
    pub fn filter_number(&self, query: &str, node: Option<&HostValue>) -> Result<f64> {
        self.matches(query, node).and_then(|m| Ok(query::coerce_number(&m)?))
    }

    /// Evaluates `query`, which must match exactly one scalar node.
    pub fn filter_string(&self, query: &str, node: Option<&HostValue>) -> Result<String> {
        self.matches(query, node).and_then(|m| Ok(query::coerce_string(&m)?))
    }

    fn matches(&self, query: &str, node: Option<&HostValue>) -> Result<Vec<HandleNode>> {
        match self.start(node)? {
            Some(handle) => Ok(query::filter(&self.handle_node(handle), query)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn kind(&self, handle: NodeHandle) -> Result<NodeKind> {
        Ok(self.inner.tree.kind(handle)?)
    }

    pub fn size(&self, handle: NodeHandle) -> Result<usize> {
        Ok(self.inner.tree.size(handle)?)
    }

    pub fn key_at(&self, handle: NodeHandle, index: usize) -> Result<String> {
        Ok(self.inner.tree.key_at(handle, index)?.to_string())
    }

    pub fn value_at(&self, handle: NodeHandle, index: usize) -> Result<NodeHandle> {
        Ok(self.inner.tree.value_at(handle, index)?)
    }

    /// Like [`iterate`](Self::iterate) over the root, handing this context
    /// to the iterator.
    pub fn into_iterator(self, order: TreeOrder) -> NodeIterator {
        let cursor = match self.inner.tree.root() {
            Some(handle) => TreeIter::new(self.handle_node(handle), order),
            None => TreeIter::empty(order),
        };
        NodeIterator::external(Cursor::Walk(cursor), Ownership::Owned(self.inner))
    }

    /// Like [`filter`](Self::filter) over the root, handing this context to
    /// the iterator.
    pub fn into_filter(self, query: &str) -> Result<NodeIterator> {
        let root = self.inner.tree.root();
        let inner = self.inner;
        filter_external(&inner, root, query, Ownership::Owned(Rc::clone(&inner)))
    }
}

fn filter_external(
    inner: &ExternalInner,
    start: Option<NodeHandle>,
    query: &str,
    ownership: Ownership<ExternalInner>,
) -> Result<NodeIterator> {
    let Some(handle) = start else { return Ok(NodeIterator::empty()) };
    let matches = query::filter(&HandleNode::new(Rc::clone(&inner.tree), handle), query)?;
    tracing::debug!(query, matches = matches.len(), "filtered external tree");
    Ok(NodeIterator::external(Cursor::Matches(matches.into_iter()), ownership))
}

fn load_handle(node: &HandleNode) -> Result<HostValue> {
    let iface = Interface::new();
    let loaded = uast_engine::load(node, &iface)?;
    tracing::debug!(nodes = iface.len(), "materialized external subtree");
    Ok(loaded.map_or_else(HostValue::none, |node| node.value().clone()))
}

/// One node of an [`ExternalContext`], as seen by the host.
pub struct ExternalNode {
    ctx: Weak<ExternalInner>,
    handle: NodeHandle,
}

impl ExternalNode {
    pub(crate) fn new(ctx: Weak<ExternalInner>, handle: NodeHandle) -> Self {
        ExternalNode { ctx, handle }
    }

    /// The wrapper inside `value`, if `value` is an external node capsule.
    pub fn from_host(value: &HostValue) -> Option<Rc<ExternalNode>> {
        value.downcast::<ExternalNode>()
    }

    pub fn handle(&self) -> NodeHandle {
        self.handle
    }

    fn tree(&self) -> Result<Rc<ExternalInner>> {
        self.ctx.upgrade().ok_or_else(Error::context_gone)
    }

    fn handle_node(&self) -> Result<HandleNode> {
        Ok(HandleNode::new(Rc::clone(&self.tree()?.tree), self.handle))
    }

    pub fn kind(&self) -> Result<NodeKind> {
        Ok(self.tree()?.tree.kind(self.handle)?)
    }

    pub fn size(&self) -> Result<usize> {
        Ok(self.tree()?.tree.size(self.handle)?)
    }

    pub fn key_at(&self, index: usize) -> Result<String> {
        Ok(self.tree()?.tree.key_at(self.handle, index)?.to_string())
    }

    /// Child as another capsule.
    pub fn value_at(&self, index: usize) -> Result<HostValue> {
        let child = self.tree()?.tree.value_at(self.handle, index)?;
        Ok(HostValue::capsule(ExternalNode::new(self.ctx.clone(), child)))
    }

    pub fn load(&self) -> Result<HostValue> {
        load_handle(&self.handle_node()?)
    }

    pub fn encode(&self, format: Format) -> Result<Vec<u8>> {
        Ok(codec::encode(&self.handle_node()?, format)?)
    }

    /// Walks the subtree, borrowing the owning context.
    pub fn iterate(&self, order: TreeOrder) -> Result<NodeIterator> {
        let cursor = Cursor::Walk(TreeIter::new(self.handle_node()?, order));
        Ok(NodeIterator::external(cursor, Ownership::Borrowed(self.ctx.clone())))
    }

    /// Queries the subtree, borrowing the owning context.
    pub fn filter(&self, query: &str) -> Result<NodeIterator> {
        let inner = self.tree()?;
        filter_external(&inner, Some(self.handle), query, Ownership::Borrowed(self.ctx.clone()))
    }

    pub fn filter_bool(&self, query: &str) -> Result<bool> {
        self.scalar(|node| query::filter_bool(node, query))
    }

    pub fn filter_number(&self, query: &str) -> Result<f64> {
        self.scalar(|node| query::filter_number(node, query))
    }

    pub fn filter_string(&self, query: &str) -> Result<String> {
        self.scalar(|node| query::filter_string(node, query))
    }

    fn scalar<T>(&self, f: impl FnOnce(&HandleNode) -> std::result::Result<T, EngineError>) -> Result<T> {
        Ok(f(&self.handle_node()?)?)
    }
}
