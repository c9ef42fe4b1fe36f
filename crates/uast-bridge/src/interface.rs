//! Identity registry and tree construction over host values.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

use uast_engine::{NodeCreator, NodeKind, NodeResult};

use crate::classify::classify;
use crate::host::{HostId, HostValue};
use crate::node::Node;
use crate::tracker::MemTracker;

pub(crate) struct InterfaceInner {
    nodes: RefCell<HashMap<HostId, Node>>,
    tracker: RefCell<MemTracker>,
}

impl InterfaceInner {
    pub(crate) fn tracker_mut(&self) -> RefMut<'_, MemTracker> {
        self.tracker.borrow_mut()
    }
}

/// Maps host values to the one [`Node`] that wraps each of them.
///
/// A registered node keeps its host value alive for as long as the
/// interface lives. Nulls are never registered: every lookup of a null
/// yields a fresh node.
#[derive(Clone)]
pub struct Interface(Rc<InterfaceInner>);

impl Default for Interface {
    fn default() -> Self {
        Self::new()
    }
}

impl Interface {
    pub fn new() -> Self {
        Interface(Rc::new(InterfaceInner {
            nodes: RefCell::new(HashMap::new()),
            tracker: RefCell::new(MemTracker::new()),
        }))
    }

    pub(crate) fn from_inner(inner: Rc<InterfaceInner>) -> Self {
        Interface(inner)
    }

    /// The node already wrapping `value`, or a new one.
    pub fn lookup_or_create(&self, value: &HostValue) -> Node {
        if let Some(node) = self.0.nodes.borrow().get(&value.id()) {
            return node.clone();
        }
        let kind = classify(value);
        if kind == NodeKind::Null {
            return Node::new(kind, value.clone(), Rc::downgrade(&self.0));
        }
        self.create(kind, value.clone())
    }

    /// Wraps and registers a value whose kind is already known.
    pub fn create(&self, kind: NodeKind, value: HostValue) -> Node {
        let node = Node::new(kind, value, Rc::downgrade(&self.0));
        self.0.nodes.borrow_mut().insert(node.value().id(), node.clone());
        node
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.0.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tracker(&self) -> Ref<'_, MemTracker> {
        self.0.tracker.borrow()
    }

    pub(crate) fn tracker_mut(&self) -> RefMut<'_, MemTracker> {
        self.0.tracker_mut()
    }

    pub(crate) fn ptr_eq(&self, inner: &Rc<InterfaceInner>) -> bool {
        Rc::ptr_eq(&self.0, inner)
    }
}

impl NodeCreator for Interface {
    type Node = Node;

    fn new_object(&self, _size_hint: usize) -> NodeResult<Node> {
        Ok(self.create(NodeKind::Object, HostValue::dict::<String>([])))
    }

    fn new_array(&self, size: usize) -> NodeResult<Node> {
        let items = (0..size).map(|_| HostValue::none());
        Ok(self.create(NodeKind::Array, HostValue::list(items)))
    }

    fn new_string(&self, value: &str) -> NodeResult<Node> {
        Ok(self.create(NodeKind::String, HostValue::str(value)))
    }

    fn new_int(&self, value: i64) -> NodeResult<Node> {
        Ok(self.create(NodeKind::Int, HostValue::int(value)))
    }

    fn new_uint(&self, value: u64) -> NodeResult<Node> {
        Ok(self.create(NodeKind::Uint, HostValue::int(value)))
    }

    fn new_float(&self, value: f64) -> NodeResult<Node> {
        Ok(self.create(NodeKind::Float, HostValue::float(value)))
    }

    fn new_bool(&self, value: bool) -> NodeResult<Node> {
        Ok(self.create(NodeKind::Bool, HostValue::bool(value)))
    }
}
