//! Materializing one node tree in another representation.

use std::collections::HashSet;

use crate::node::{Node, NodeCreator, NodeId};
use crate::{EngineError, NodeKind};

/// Rebuilds the tree rooted at `src` with nodes allocated by `dst`.
///
/// Returns `None` when `src` is null: creators have no null constructor,
/// a null is represented by its absence. Children are built before the
/// container that holds them.
pub fn load<S, C>(src: &S, dst: &C) -> Result<Option<C::Node>, EngineError>
where
    S: Node,
    C: NodeCreator,
{
    load_node(src, dst, &mut HashSet::new())
}

fn load_node<S, C>(src: &S, dst: &C, path: &mut HashSet<NodeId>) -> Result<Option<C::Node>, EngineError>
where
    S: Node,
    C: NodeCreator,
{
    let node = match src.kind() {
        NodeKind::Null => return Ok(None),
        NodeKind::Bool => dst.new_bool(src.as_bool()?)?,
        NodeKind::Int => dst.new_int(src.as_int()?)?,
        NodeKind::Uint => dst.new_uint(src.as_uint()?)?,
        NodeKind::Float => dst.new_float(src.as_float()?)?,
        NodeKind::String => dst.new_string(src.as_str()?)?,
        kind => {
            if !path.insert(src.id()) {
                return Err(EngineError::Cycle);
            }
            let size = src.size()?;
            let node = if kind == NodeKind::Array {
                let array = dst.new_array(size)?;
                for i in 0..size {
                    let child = load_node(&src.value_at(i)?, dst, path)?;
                    array.set_value(i, child.as_ref())?;
                }
                array
            } else {
                let object = dst.new_object(size)?;
                for i in 0..size {
                    let key = src.key_at(i)?;
                    let child = load_node(&src.value_at(i)?, dst, path)?;
                    object.set_key_value(&key, child.as_ref())?;
                }
                object
            };
            path.remove(&src.id());
            node
        }
    };
    Ok(Some(node))
}
