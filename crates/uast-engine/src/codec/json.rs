//! JSON encoding of node trees and decoding into [`ExternalTree`].

use std::cell::RefCell;
use std::collections::HashSet;

use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value};

use super::Format;
use crate::external::Slot;
use crate::node::{Node, NodeError, NodeId};
use crate::{EngineError, ExternalTree, NodeHandle, NodeKind};

/// Shared state of one serialization pass.
#[derive(Default)]
struct Walk {
    path: RefCell<HashSet<NodeId>>,
    /// First node failure, kept so it is reported as-is rather than as text.
    fault: RefCell<Option<EngineError>>,
}

impl Walk {
    fn fail<E: serde::ser::Error>(&self, err: EngineError) -> E {
        let message = err.to_string();
        self.fault.borrow_mut().get_or_insert(err);
        E::custom(message)
    }
}

struct NodeView<'w, N> {
    node: N,
    walk: &'w Walk,
}

impl<N: Node> Serialize for NodeView<'_, N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let walk = self.walk;
        let node = &self.node;
        let fail = |err: NodeError| walk.fail::<S::Error>(err.into());
        match node.kind() {
            NodeKind::Null => serializer.serialize_unit(),
            NodeKind::Bool => serializer.serialize_bool(node.as_bool().map_err(fail)?),
            NodeKind::Int => serializer.serialize_i64(node.as_int().map_err(fail)?),
            NodeKind::Uint => serializer.serialize_u64(node.as_uint().map_err(fail)?),
            NodeKind::Float => {
                let float = node.as_float().map_err(fail)?;
                if !float.is_finite() {
                    return Err(S::Error::custom(format!("{float} has no JSON representation")));
                }
                serializer.serialize_f64(float)
            }
            NodeKind::String => serializer.serialize_str(node.as_str().map_err(fail)?),
            kind => {
                if !walk.path.borrow_mut().insert(node.id()) {
                    return Err(walk.fail(EngineError::Cycle));
                }
                let size = node.size().map_err(fail)?;
                let out = if kind == NodeKind::Array {
                    let mut seq = serializer.serialize_seq(Some(size))?;
                    for i in 0..size {
                        let child = node.value_at(i).map_err(fail)?;
                        seq.serialize_element(&NodeView { node: child, walk })?;
                    }
                    seq.end()
                } else {
                    let mut map = serializer.serialize_map(Some(size))?;
                    for i in 0..size {
                        let key = node.key_at(i).map_err(fail)?;
                        let child = node.value_at(i).map_err(fail)?;
                        map.serialize_entry(&*key, &NodeView { node: child, walk })?;
                    }
                    map.end()
                };
                walk.path.borrow_mut().remove(&node.id());
                out
            }
        }
    }
}

pub(crate) fn encode<N: Node>(node: &N) -> Result<Vec<u8>, EngineError> {
    let walk = Walk::default();
    let result = serde_json::to_vec(&NodeView { node: node.clone(), walk: &walk });
    result.map_err(|err| {
        walk.fault
            .into_inner()
            .unwrap_or_else(|| EngineError::encode(Format::Json, err.to_string()))
    })
}

/// Copies the tree rooted at `node` into a [`serde_json::Value`].
///
/// Non-finite floats become `null`. Cycles are an error.
pub fn to_json<N: Node>(node: &N) -> Result<Value, EngineError> {
    fn walk<N: Node>(node: &N, path: &mut HashSet<NodeId>) -> Result<Value, EngineError> {
        Ok(match node.kind() {
            NodeKind::Null => Value::Null,
            NodeKind::Bool => Value::Bool(node.as_bool()?),
            NodeKind::Int => Value::from(node.as_int()?),
            NodeKind::Uint => Value::from(node.as_uint()?),
            NodeKind::Float => Number::from_f64(node.as_float()?).map_or(Value::Null, Value::Number),
            NodeKind::String => Value::String(node.as_str()?.to_string()),
            kind => {
                if !path.insert(node.id()) {
                    return Err(EngineError::Cycle);
                }
                let size = node.size()?;
                let value = if kind == NodeKind::Array {
                    let mut items = Vec::with_capacity(size);
                    for i in 0..size {
                        items.push(walk(&node.value_at(i)?, path)?);
                    }
                    Value::Array(items)
                } else {
                    let mut map = Map::with_capacity(size);
                    for i in 0..size {
                        map.insert(node.key_at(i)?.to_string(), walk(&node.value_at(i)?, path)?);
                    }
                    Value::Object(map)
                };
                path.remove(&node.id());
                value
            }
        })
    }
    walk(node, &mut HashSet::new())
}

pub(crate) fn decode(buf: &[u8]) -> Result<ExternalTree, EngineError> {
    let value: Value =
        serde_json::from_slice(buf).map_err(|err| EngineError::decode(Format::Json, err.to_string()))?;
    let mut tree = ExternalTree::default();
    let root = build(&mut tree, value);
    tree.set_root(root);
    Ok(tree)
}

fn build(tree: &mut ExternalTree, value: Value) -> NodeHandle {
    let slot = match value {
        Value::Null => Slot::Null,
        Value::Bool(b) => Slot::Bool(b),
        Value::Number(n) => {
            if let Some(int) = n.as_i64() {
                Slot::Int(int)
            } else if let Some(uint) = n.as_u64() {
                Slot::Uint(uint)
            } else {
                Slot::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => Slot::String(s.into_boxed_str()),
        Value::Array(items) => Slot::Array(items.into_iter().map(|item| build(tree, item)).collect()),
        Value::Object(map) => Slot::Object(
            map.into_iter()
                .map(|(key, value)| (key.into(), build(tree, value)))
                .collect(),
        ),
    };
    tree.push(slot)
}
