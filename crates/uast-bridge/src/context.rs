//! Live contexts: a registry plus an optional root, issuing iterators and
//! query results over host values.

use std::cell::RefCell;
use std::rc::Rc;

use uast_engine::Node as _;
use uast_engine::{codec, query, EngineError, Format, NodeKind, TreeIter, TreeOrder};

use crate::error::{Error, Result};
use crate::host::{HostData, HostValue};
use crate::interface::Interface;
use crate::iterator::{Cursor, NodeIterator, Ownership};
use crate::node::Node;

pub(crate) struct ContextInner {
    pub(crate) iface: Interface,
    root: Option<HostValue>,
    root_node: RefCell<Option<Node>>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        tracing::debug!(registered = self.iface.len(), "destroying context");
    }
}

/// Explicit, reusable context over live host values.
///
/// Iterators obtained from a `Context` borrow it: the context stays usable
/// after they are gone, and they stop with an error if it is dropped first.
pub struct Context {
    inner: Rc<ContextInner>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// A context with no root bound.
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_root(root: HostValue) -> Self {
        Self::build(Some(root))
    }

    fn build(root: Option<HostValue>) -> Self {
        tracing::debug!(has_root = root.is_some(), "creating context");
        Context {
            inner: Rc::new(ContextInner {
                iface: Interface::new(),
                root,
                root_node: RefCell::new(None),
            }),
        }
    }

    pub fn root(&self) -> Option<HostValue> {
        self.inner.root.clone()
    }

    pub fn interface(&self) -> &Interface {
        &self.inner.iface
    }

    fn root_node(&self) -> Option<Node> {
        let root = self.inner.root.as_ref()?;
        let mut cached = self.inner.root_node.borrow_mut();
        Some(cached.get_or_insert_with(|| self.inner.iface.lookup_or_create(root)).clone())
    }

    /// The node for `value`, or the root when `value` is absent.
    fn start(&self, value: Option<&HostValue>) -> Result<Option<Node>> {
        match value {
            Some(value) => self.node_for(value).map(Some),
            None => Ok(self.root_node()),
        }
    }

    fn node_for(&self, value: &HostValue) -> Result<Node> {
        if let HostData::Capsule(_) = value.data() {
            return Err(Error::foreign("a live context only accepts plain host values"));
        }
        Ok(self.inner.iface.lookup_or_create(value))
    }

    /// Evaluates `query` starting at `node` (the root when absent).
    ///
    /// With nothing to start from, the result is an empty iterator and the
    /// query is not looked at.
    pub fn filter(&self, query: &str, node: Option<&HostValue>) -> Result<NodeIterator> {
        let ownership = Ownership::Borrowed(Rc::downgrade(&self.inner));
        filter_live(&self.inner, self.start(node)?, query, ownership)
    }

    /// Walks the tree under `value` in `order`.
    pub fn iterate(&self, value: &HostValue, order: TreeOrder) -> Result<NodeIterator> {
        let node = self.node_for(value)?;
        let ownership = Ownership::Borrowed(Rc::downgrade(&self.inner));
        Ok(NodeIterator::live(Cursor::Walk(TreeIter::new(node, order)), ownership))
    }

    /// Serializes `node` (the root when absent). An empty context encodes
    /// as null.
    pub fn encode(&self, node: Option<&HostValue>, format: Format) -> Result<Vec<u8>> {
        self.in_filter_scope(node, |node| codec::encode(node, format))
    }

    /// Evaluates `query` and reads the result as a boolean. No match is
    /// `false`; more than one match is `true`.
    pub fn filter_bool(&self, query: &str, node: Option<&HostValue>) -> Result<bool> {
        self.in_filter_scope(node, |node| query::filter_bool(node, query))
    }

    /// Evaluates `query`, which must match exactly one numeric node.
    pub fn filter_number(&self, query: &str, node: Option<&HostValue>) -> Result<f64> {
        self.in_filter_scope(node, |node| query::filter_number(node, query))
    }

    /// Evaluates `query`, which must match exactly one scalar node.
    pub fn filter_string(&self, query: &str, node: Option<&HostValue>) -> Result<String> {
        self.in_filter_scope(node, |node| query::filter_string(node, query))
    }

    /// Runs `f` on `node` (the root when absent, a null for an empty
    /// context) with the filter scope open.
    fn in_filter_scope<T>(
        &self,
        node: Option<&HostValue>,
        f: impl FnOnce(&Node) -> std::result::Result<T, EngineError>,
    ) -> Result<T> {
        let node = match self.start(node)? {
            Some(node) => node,
            None => self.inner.iface.lookup_or_create(&HostValue::none()),
        };
        let _scope = FilterScope::enter(&self.inner.iface)?;
        Ok(f(&node)?)
    }

    /// Iterator over the root that owns this context.
    pub(crate) fn into_iterator(self, order: TreeOrder) -> NodeIterator {
        let cursor = match self.root_node() {
            Some(root) => Cursor::Walk(TreeIter::new(root, order)),
            None => Cursor::Walk(TreeIter::empty(order)),
        };
        NodeIterator::live(cursor, Ownership::Owned(self.inner))
    }

    /// Query results over the root, owning this context.
    pub(crate) fn into_filter(self, query: &str) -> Result<NodeIterator> {
        let start = self.root_node();
        let inner = self.inner;
        filter_live(&inner, start, query, Ownership::Owned(Rc::clone(&inner)))
    }
}

fn filter_live(
    inner: &ContextInner,
    start: Option<Node>,
    query: &str,
    ownership: Ownership<ContextInner>,
) -> Result<NodeIterator> {
    let Some(start) = start.filter(|node| node.kind() != NodeKind::Null) else {
        return Ok(NodeIterator::empty());
    };
    let matches = {
        let _scope = FilterScope::enter(&inner.iface)?;
        query::filter(&start, query)?
    };
    tracing::debug!(query, matches = matches.len(), "filtered live tree");
    Ok(NodeIterator::live(Cursor::Matches(matches.into_iter()), ownership))
}

/// Open filter scope of a registry's tracker; released on drop.
pub(crate) struct FilterScope<'a> {
    iface: &'a Interface,
}

impl<'a> FilterScope<'a> {
    pub(crate) fn enter(iface: &'a Interface) -> Result<Self> {
        iface.tracker_mut().enter_filter()?;
        Ok(FilterScope { iface })
    }
}

impl Drop for FilterScope<'_> {
    fn drop(&mut self) {
        self.iface.tracker_mut().exit_filter();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> HostValue {
        HostValue::dict([
            ("@type", HostValue::str("File")),
            (
                "children",
                HostValue::list([
                    HostValue::dict([("@type", HostValue::str("Ident")), ("Name", HostValue::str("a"))]),
                    HostValue::dict([("@type", HostValue::str("Ident")), ("Name", HostValue::str("b"))]),
                ]),
            ),
        ])
    }

    #[test]
    fn filter_returns_host_values() {
        let ctx = Context::with_root(doc());
        let names: Vec<_> = ctx
            .filter("$..Name", None)
            .unwrap()
            .map(|v| v.unwrap().as_str().map(str::to_string))
            .collect();
        assert_eq!(names, [Some("a".to_string()), Some("b".to_string())]);
    }

    #[test]
    fn filter_results_are_the_host_objects() {
        let root = doc();
        let ctx = Context::with_root(root.clone());
        let first = ctx.filter("$.children[0]", None).unwrap().next().unwrap().unwrap();
        assert!(first.is(&root.get("children").unwrap().get_item(0).unwrap()));
    }

    #[test]
    fn empty_context_filters_to_nothing() {
        let ctx = Context::new();
        assert_eq!(ctx.filter("$[this is not a query", None).unwrap().count(), 0);
        let none = Context::with_root(HostValue::none());
        assert_eq!(none.filter("$..*", None).unwrap().count(), 0);
    }

    #[test]
    fn bad_query_is_an_engine_error() {
        let ctx = Context::with_root(doc());
        assert!(matches!(ctx.filter("$[", None), Err(Error::Engine(_))));
    }

    #[test]
    fn filter_scope_releases_on_exit() {
        let ctx = Context::with_root(doc());
        ctx.filter("$..@type", None).unwrap();
        let stats = ctx.interface().tracker().stats();
        assert!(stats.tracked > 0);
        assert_eq!(stats.pending(), 0);
    }

    #[test]
    fn capsules_are_foreign() {
        let ctx = Context::with_root(doc());
        let err = ctx.iterate(&HostValue::capsule(Context::new()), TreeOrder::PreOrder).unwrap_err();
        assert!(matches!(err, Error::ForeignObject(_)));
    }

    #[test]
    fn encode_uses_the_root_by_default() {
        let ctx = Context::with_root(HostValue::list([HostValue::int(1), HostValue::bool(false)]));
        assert_eq!(ctx.encode(None, Format::Json).unwrap(), b"[1,false]");
        assert_eq!(Context::new().encode(None, Format::Json).unwrap(), b"null");
    }

    #[test]
    fn scalar_queries() {
        let root = doc();
        let ctx = Context::with_root(root.clone());
        assert!(ctx.filter_bool("$..[?(@.Name == 'b')]", None).unwrap());
        assert!(!ctx.filter_bool("$.missing", None).unwrap());
        assert_eq!(ctx.filter_string("$.children[1].Name", None).unwrap(), "b");
        let first = root.get("children").unwrap().get_item(0).unwrap();
        assert_eq!(ctx.filter_string("$.Name", Some(&first)).unwrap(), "a");
        assert!(matches!(ctx.filter_number("$['@type']", None), Err(Error::Engine(EngineError::Coerce { .. }))));
        assert_eq!(ctx.interface().tracker().stats().pending(), 0);
    }

    #[test]
    fn scalar_queries_on_an_empty_context() {
        let ctx = Context::new();
        assert!(!ctx.filter_bool("$", None).unwrap());
        assert!(matches!(ctx.filter_string("$", None), Err(Error::Engine(EngineError::Coerce { .. }))));
    }
}
