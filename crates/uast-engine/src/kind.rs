//! Node kind taxonomy shared by every node implementation.

use std::fmt;

/// Closed classification of a node's scalar or container category.
///
/// Assigned once when a node is created and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Null,
    Bool,
    Int,
    Uint,
    Float,
    String,
    Array,
    Object,
}

impl NodeKind {
    /// `true` for `Array` and `Object`.
    pub fn is_container(self) -> bool {
        matches!(self, NodeKind::Array | NodeKind::Object)
    }

    /// `true` for every kind that carries a single value.
    pub fn is_scalar(self) -> bool {
        !self.is_container() && self != NodeKind::Null
    }

    /// `true` for `Int`, `Uint` and `Float`.
    pub fn is_number(self) -> bool {
        matches!(self, NodeKind::Int | NodeKind::Uint | NodeKind::Float)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Null => "null",
            NodeKind::Bool => "bool",
            NodeKind::Int => "int",
            NodeKind::Uint => "uint",
            NodeKind::Float => "float",
            NodeKind::String => "string",
            NodeKind::Array => "array",
            NodeKind::Object => "object",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
