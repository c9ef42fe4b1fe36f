//! Decoded trees addressed by opaque handles.
//!
//! An [`ExternalTree`] is what a decode produces: a flat arena of slots, no
//! host values involved. [`HandleNode`] pairs a shared tree with one handle
//! and implements [`Node`] so the engine can traverse, query and re-encode
//! a decoded tree without materializing it.

use std::rc::Rc;

use crate::node::{Node, NodeError, NodeId, NodeResult};
use crate::NodeKind;

/// Opaque index of a node inside an [`ExternalTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(u32);

impl NodeHandle {
    pub fn from_raw(raw: u32) -> Self {
        NodeHandle(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(Box<str>),
    Array(Vec<NodeHandle>),
    Object(Vec<(Rc<str>, NodeHandle)>),
}

impl Slot {
    fn kind(&self) -> NodeKind {
        match self {
            Slot::Null => NodeKind::Null,
            Slot::Bool(_) => NodeKind::Bool,
            Slot::Int(_) => NodeKind::Int,
            Slot::Uint(_) => NodeKind::Uint,
            Slot::Float(_) => NodeKind::Float,
            Slot::String(_) => NodeKind::String,
            Slot::Array(_) => NodeKind::Array,
            Slot::Object(_) => NodeKind::Object,
        }
    }
}

/// Read-only tree produced by a decoder.
#[derive(Debug, Default)]
pub struct ExternalTree {
    slots: Vec<Slot>,
    root: Option<NodeHandle>,
}

impl ExternalTree {
    pub fn root(&self) -> Option<NodeHandle> {
        self.root
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn push(&mut self, slot: Slot) -> NodeHandle {
        let handle = NodeHandle(self.slots.len() as u32);
        self.slots.push(slot);
        handle
    }

    pub(crate) fn set_root(&mut self, root: NodeHandle) {
        self.root = Some(root);
    }

    fn slot(&self, handle: NodeHandle) -> NodeResult<&Slot> {
        self.slots.get(handle.index()).ok_or(NodeError::OutOfRange {
            index: handle.index(),
            size: self.slots.len(),
        })
    }

    pub fn kind(&self, handle: NodeHandle) -> NodeResult<NodeKind> {
        Ok(self.slot(handle)?.kind())
    }

    pub fn size(&self, handle: NodeHandle) -> NodeResult<usize> {
        match self.slot(handle)? {
            Slot::Array(items) => Ok(items.len()),
            Slot::Object(fields) => Ok(fields.len()),
            Slot::String(s) => Ok(s.chars().count()),
            _ => Ok(0),
        }
    }

    pub fn key_at(&self, handle: NodeHandle, index: usize) -> NodeResult<Rc<str>> {
        match self.slot(handle)? {
            Slot::Object(fields) => fields
                .get(index)
                .map(|(key, _)| key.clone())
                .ok_or(NodeError::OutOfRange { index, size: fields.len() }),
            other => Err(NodeError::kind("object", other.kind())),
        }
    }

    pub fn value_at(&self, handle: NodeHandle, index: usize) -> NodeResult<NodeHandle> {
        match self.slot(handle)? {
            Slot::Array(items) => items
                .get(index)
                .copied()
                .ok_or(NodeError::OutOfRange { index, size: items.len() }),
            Slot::Object(fields) => fields
                .get(index)
                .map(|(_, value)| *value)
                .ok_or(NodeError::OutOfRange { index, size: fields.len() }),
            other => Err(NodeError::kind("container", other.kind())),
        }
    }

    pub fn as_str(&self, handle: NodeHandle) -> NodeResult<&str> {
        match self.slot(handle)? {
            Slot::String(s) => Ok(s),
            other => Err(NodeError::kind("string", other.kind())),
        }
    }

    pub fn as_int(&self, handle: NodeHandle) -> NodeResult<i64> {
        match self.slot(handle)? {
            Slot::Int(v) => Ok(*v),
            Slot::Uint(v) => i64::try_from(*v).map_err(|_| overflow(*v, "i64")),
            other => Err(NodeError::kind("int", other.kind())),
        }
    }

    pub fn as_uint(&self, handle: NodeHandle) -> NodeResult<u64> {
        match self.slot(handle)? {
            Slot::Uint(v) => Ok(*v),
            Slot::Int(v) => u64::try_from(*v).map_err(|_| overflow(*v, "u64")),
            other => Err(NodeError::kind("uint", other.kind())),
        }
    }

    pub fn as_float(&self, handle: NodeHandle) -> NodeResult<f64> {
        match self.slot(handle)? {
            Slot::Float(v) => Ok(*v),
            Slot::Int(v) => Ok(*v as f64),
            Slot::Uint(v) => Ok(*v as f64),
            other => Err(NodeError::kind("float", other.kind())),
        }
    }

    pub fn as_bool(&self, handle: NodeHandle) -> NodeResult<bool> {
        match self.slot(handle)? {
            Slot::Bool(v) => Ok(*v),
            other => Err(NodeError::kind("bool", other.kind())),
        }
    }
}

fn overflow(value: impl Into<i128>, target: &'static str) -> NodeError {
    NodeError::Overflow { value: value.into(), target }
}

/// A node of a shared [`ExternalTree`].
#[derive(Debug, Clone)]
pub struct HandleNode {
    tree: Rc<ExternalTree>,
    handle: NodeHandle,
}

impl HandleNode {
    pub fn new(tree: Rc<ExternalTree>, handle: NodeHandle) -> Self {
        Self { tree, handle }
    }

    /// The root of `tree`, if it has one.
    pub fn root(tree: &Rc<ExternalTree>) -> Option<Self> {
        tree.root().map(|handle| Self::new(tree.clone(), handle))
    }

    pub fn handle(&self) -> NodeHandle {
        self.handle
    }

    pub fn tree(&self) -> &Rc<ExternalTree> {
        &self.tree
    }
}

impl Node for HandleNode {
    fn id(&self) -> NodeId {
        self.handle.index()
    }

    fn kind(&self) -> NodeKind {
        // Handles are only minted by the tree itself, so the slot exists.
        self.tree.kind(self.handle).unwrap_or(NodeKind::Null)
    }

    fn as_str(&self) -> NodeResult<&str> {
        self.tree.as_str(self.handle)
    }

    fn as_int(&self) -> NodeResult<i64> {
        self.tree.as_int(self.handle)
    }

    fn as_uint(&self) -> NodeResult<u64> {
        self.tree.as_uint(self.handle)
    }

    fn as_float(&self) -> NodeResult<f64> {
        self.tree.as_float(self.handle)
    }

    fn as_bool(&self) -> NodeResult<bool> {
        self.tree.as_bool(self.handle)
    }

    fn size(&self) -> NodeResult<usize> {
        self.tree.size(self.handle)
    }

    fn key_at(&self, index: usize) -> NodeResult<Rc<str>> {
        self.tree.key_at(self.handle, index)
    }

    fn value_at(&self, index: usize) -> NodeResult<Self> {
        let handle = self.tree.value_at(self.handle, index)?;
        Ok(Self::new(self.tree.clone(), handle))
    }

    fn set_value(&self, _index: usize, _value: Option<&Self>) -> NodeResult<()> {
        Err(NodeError::ReadOnly)
    }

    fn set_key_value(&self, _key: &str, _value: Option<&Self>) -> NodeResult<()> {
        Err(NodeError::ReadOnly)
    }
}
