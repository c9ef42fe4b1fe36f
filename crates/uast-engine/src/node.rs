//! The node interface the engine drives.
//!
//! Any tree the engine traverses, queries or encodes is seen exclusively
//! through [`Node`]. Trees the engine has to build (decoding, loading an
//! external tree into another representation) are allocated through a
//! [`NodeCreator`].

use std::error::Error as StdError;

use thiserror::Error;

use crate::NodeKind;

/// Identity of a node within one tree. Two handles with the same id are the
/// same node.
pub type NodeId = usize;

pub type NodeResult<T> = Result<T, NodeError>;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("expected {expected} node, found {found}")]
    Kind { expected: &'static str, found: NodeKind },
    #[error("index {index} out of range for node of size {size}")]
    OutOfRange { index: usize, size: usize },
    /// A number node read through an integer accessor whose type cannot
    /// hold its value.
    #[error("integer {value} does not fit in {target}")]
    Overflow { value: i128, target: &'static str },
    #[error("node is read-only")]
    ReadOnly,
    #[error("node outlived the context that issued it")]
    Detached,
    /// A failure raised by the backing store of the node. Kept boxed and
    /// untouched so that the owner can downcast it back.
    #[error("{0}")]
    Host(Box<dyn StdError>),
}

impl NodeError {
    pub fn kind(expected: &'static str, found: NodeKind) -> Self {
        NodeError::Kind { expected, found }
    }

    pub fn host(err: impl StdError + 'static) -> Self {
        NodeError::Host(Box::new(err))
    }
}

/// Read/write capability surface of a single node.
///
/// Scalar accessors are only valid for the matching kind and report
/// [`NodeError::Kind`] otherwise. Numbers form one category: `as_int` and
/// `as_uint` accept both integer kinds and fail with
/// [`NodeError::Overflow`] when the value does not fit, `as_float` accepts
/// every number kind. `key_at`/`value_at` index into the
/// node's children: array elements by position, object values in the
/// order reported by `key_at`.
pub trait Node: Clone {
    fn id(&self) -> NodeId;

    fn kind(&self) -> NodeKind;

    fn as_str(&self) -> NodeResult<&str>;

    fn as_int(&self) -> NodeResult<i64>;

    fn as_uint(&self) -> NodeResult<u64>;

    fn as_float(&self) -> NodeResult<f64>;

    fn as_bool(&self) -> NodeResult<bool>;

    /// Element count for arrays and objects, 0 for null.
    fn size(&self) -> NodeResult<usize>;

    fn key_at(&self, index: usize) -> NodeResult<std::rc::Rc<str>>;

    fn value_at(&self, index: usize) -> NodeResult<Self>;

    /// Replaces the `index`-th element. `None` stores a null.
    fn set_value(&self, index: usize, value: Option<&Self>) -> NodeResult<()>;

    /// Inserts or replaces `key`. `None` stores a null.
    fn set_key_value(&self, key: &str, value: Option<&Self>) -> NodeResult<()>;

    /// Looks up an object value by key.
    fn get(&self, key: &str) -> NodeResult<Option<Self>> {
        if self.kind() != NodeKind::Object {
            return Ok(None);
        }
        for i in 0..self.size()? {
            if &*self.key_at(i)? == key {
                return self.value_at(i).map(Some);
            }
        }
        Ok(None)
    }
}

/// Allocates fresh nodes of a requested kind.
pub trait NodeCreator {
    type Node: Node;

    fn new_object(&self, size_hint: usize) -> NodeResult<Self::Node>;

    /// Creates an array of `size` null elements, to be filled with
    /// [`Node::set_value`].
    fn new_array(&self, size: usize) -> NodeResult<Self::Node>;

    fn new_string(&self, value: &str) -> NodeResult<Self::Node>;

    fn new_int(&self, value: i64) -> NodeResult<Self::Node>;

    fn new_uint(&self, value: u64) -> NodeResult<Self::Node>;

    fn new_float(&self, value: f64) -> NodeResult<Self::Node>;

    fn new_bool(&self, value: bool) -> NodeResult<Self::Node>;
}
