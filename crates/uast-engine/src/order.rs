//! Traversal orders and the cursor that walks a node tree.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::node::{Node, NodeId, NodeResult};
use crate::{EngineError, NodeKind};

/// Order in which [`TreeIter`] visits nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "String")]
#[repr(u8)]
pub enum TreeOrder {
    /// No ordering guarantee; uses the cheapest walk available (pre-order).
    AnyOrder = 0,
    #[default]
    PreOrder = 1,
    PostOrder = 2,
    LevelOrder = 3,
    /// Immediate children of the start node only.
    ChildrenOrder = 4,
    /// Positioned object nodes sorted by their start position.
    PositionOrder = 5,
}

impl TreeOrder {
    pub const ALL: [TreeOrder; 6] = [
        TreeOrder::AnyOrder,
        TreeOrder::PreOrder,
        TreeOrder::PostOrder,
        TreeOrder::LevelOrder,
        TreeOrder::ChildrenOrder,
        TreeOrder::PositionOrder,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TreeOrder::AnyOrder => "any",
            TreeOrder::PreOrder => "pre",
            TreeOrder::PostOrder => "post",
            TreeOrder::LevelOrder => "level",
            TreeOrder::ChildrenOrder => "children",
            TreeOrder::PositionOrder => "position",
        }
    }
}

impl fmt::Display for TreeOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for TreeOrder {
    type Error = EngineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        TreeOrder::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| EngineError::UnknownOrder(value.to_string()))
    }
}

impl FromStr for TreeOrder {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let name = lower.strip_suffix("_order").unwrap_or(&lower);
        TreeOrder::ALL
            .into_iter()
            .find(|order| order.name() == name)
            .ok_or_else(|| EngineError::UnknownOrder(s.to_string()))
    }
}

impl TryFrom<String> for TreeOrder {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

enum State<N> {
    Stack(Vec<N>),
    Post(Vec<(N, bool)>),
    Queue(VecDeque<N>),
    /// Orders that need the whole walk before yielding anything.
    Deferred(N),
    Ready(std::vec::IntoIter<N>),
    Done,
}

/// Cursor over a node tree.
///
/// Every node is visited once: containers are remembered by [`Node::id`], so a
/// container reachable twice (including through a cycle) is only expanded the
/// first time. The first failure is yielded as an error and the cursor is
/// exhausted afterwards.
pub struct TreeIter<N: Node> {
    order: TreeOrder,
    state: State<N>,
    seen: HashSet<NodeId>,
}

impl<N: Node> TreeIter<N> {
    pub fn new(start: N, order: TreeOrder) -> Self {
        let state = match order {
            TreeOrder::AnyOrder | TreeOrder::PreOrder => State::Stack(vec![start]),
            TreeOrder::PostOrder => State::Post(vec![(start, false)]),
            TreeOrder::LevelOrder => State::Queue(VecDeque::from([start])),
            TreeOrder::ChildrenOrder | TreeOrder::PositionOrder => State::Deferred(start),
        };
        Self { order, state, seen: HashSet::new() }
    }

    /// A cursor that yields nothing.
    pub fn empty(order: TreeOrder) -> Self {
        Self { order, state: State::Done, seen: HashSet::new() }
    }

    pub fn order(&self) -> TreeOrder {
        self.order
    }

    fn first_visit(&mut self, node: &N) -> bool {
        !node.kind().is_container() || self.seen.insert(node.id())
    }

    fn step(&mut self) -> NodeResult<Option<N>> {
        loop {
            match &mut self.state {
                State::Done => return Ok(None),
                State::Stack(stack) => {
                    let Some(node) = stack.pop() else { return Ok(None) };
                    if !node.kind().is_container() {
                        return Ok(Some(node));
                    }
                    if !self.seen.insert(node.id()) {
                        continue;
                    }
                    stack.extend(children(&node)?.into_iter().rev());
                    return Ok(Some(node));
                }
                State::Post(stack) => {
                    let Some((node, expanded)) = stack.pop() else { return Ok(None) };
                    if expanded || !node.kind().is_container() {
                        return Ok(Some(node));
                    }
                    if !self.seen.insert(node.id()) {
                        continue;
                    }
                    let children = children(&node)?;
                    stack.push((node, true));
                    stack.extend(children.into_iter().rev().map(|child| (child, false)));
                }
                State::Queue(queue) => {
                    let Some(node) = queue.pop_front() else { return Ok(None) };
                    if !self.first_visit(&node) {
                        continue;
                    }
                    if node.kind().is_container() {
                        let children = children(&node)?;
                        if let State::Queue(queue) = &mut self.state {
                            queue.extend(children);
                        }
                    }
                    return Ok(Some(node));
                }
                State::Deferred(start) => {
                    let start = start.clone();
                    let nodes = match self.order {
                        TreeOrder::ChildrenOrder if start.kind().is_container() => children(&start)?,
                        TreeOrder::ChildrenOrder => Vec::new(),
                        _ => by_position(start)?,
                    };
                    self.state = State::Ready(nodes.into_iter());
                }
                State::Ready(nodes) => return Ok(nodes.next()),
            }
        }
    }
}

impl<N: Node> Iterator for TreeIter<N> {
    type Item = Result<N, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.step() {
            Ok(Some(node)) => Some(Ok(node)),
            Ok(None) => {
                self.state = State::Done;
                None
            }
            Err(err) => {
                self.state = State::Done;
                Some(Err(err.into()))
            }
        }
    }
}

impl<N: Node> std::iter::FusedIterator for TreeIter<N> {}

pub(crate) fn children<N: Node>(node: &N) -> NodeResult<Vec<N>> {
    let size = node.size()?;
    (0..size).map(|i| node.value_at(i)).collect()
}

/// `(offset, line, col)` of `@pos.start`, when the node carries one.
fn start_position<N: Node>(node: &N) -> NodeResult<Option<(u64, u64, u64)>> {
    if node.kind() != NodeKind::Object {
        return Ok(None);
    }
    let Some(pos) = node.get("@pos")? else { return Ok(None) };
    let Some(start) = pos.get("start")? else { return Ok(None) };
    let Some(offset) = start.get("offset")? else { return Ok(None) };
    if !matches!(offset.kind(), NodeKind::Int | NodeKind::Uint) {
        return Ok(None);
    }
    let field = |name: &str| -> NodeResult<u64> {
        match start.get(name)? {
            Some(v) if matches!(v.kind(), NodeKind::Int | NodeKind::Uint) => v.as_uint(),
            _ => Ok(0),
        }
    };
    Ok(Some((offset.as_uint()?, field("line")?, field("col")?)))
}

fn by_position<N: Node>(start: N) -> NodeResult<Vec<N>> {
    let mut positioned = Vec::new();
    for node in TreeIter::new(start, TreeOrder::PreOrder) {
        let node = node.map_err(into_node_error)?;
        if let Some(pos) = start_position(&node)? {
            positioned.push((pos, node));
        }
    }
    positioned.sort_by_key(|(pos, _)| *pos);
    Ok(positioned.into_iter().map(|(_, node)| node).collect())
}

fn into_node_error(err: EngineError) -> crate::NodeError {
    match err {
        EngineError::Node(err) => err,
        other => crate::NodeError::host(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, Format};
    use crate::HandleNode;
    use serde_json::json;
    use std::rc::Rc;

    fn tree(value: serde_json::Value) -> HandleNode {
        let bytes = serde_json::to_vec(&value).unwrap();
        let tree = Rc::new(decode(&bytes, Format::Json).unwrap());
        HandleNode::root(&tree).unwrap()
    }

    fn names(root: HandleNode, order: TreeOrder) -> Vec<String> {
        TreeIter::new(root, order)
            .map(|n| n.unwrap())
            .filter(|n| n.kind() == NodeKind::Object)
            .map(|n| n.get("@type").unwrap().unwrap().as_str().unwrap().to_string())
            .collect()
    }

    fn node(name: &str, offset: u64, children: Vec<serde_json::Value>) -> serde_json::Value {
        json!({
            "@type": name,
            "@pos": {"start": {"offset": offset, "line": 0, "col": 0}},
            "children": children,
        })
    }

    fn sample() -> HandleNode {
        tree(node(
            "root",
            0,
            vec![
                node("son1", 1, vec![node("son1_1", 10, vec![]), node("son1_2", 10, vec![])]),
                node("son2", 100, vec![node("son2_1", 5, vec![]), node("son2_2", 15, vec![])]),
            ],
        ))
    }

    #[test]
    fn pre_order() {
        assert_eq!(
            names(sample(), TreeOrder::PreOrder),
            ["root", "son1", "son1_1", "son1_2", "son2", "son2_1", "son2_2"]
        );
    }

    #[test]
    fn post_order() {
        assert_eq!(
            names(sample(), TreeOrder::PostOrder),
            ["son1_1", "son1_2", "son1", "son2_1", "son2_2", "son2", "root"]
        );
    }

    #[test]
    fn level_order() {
        assert_eq!(
            names(sample(), TreeOrder::LevelOrder),
            ["root", "son1", "son2", "son1_1", "son1_2", "son2_1", "son2_2"]
        );
    }

    #[test]
    fn position_order() {
        assert_eq!(
            names(sample(), TreeOrder::PositionOrder),
            ["root", "son1", "son2_1", "son1_1", "son1_2", "son2_2", "son2"]
        );
    }

    #[test]
    fn children_order_yields_direct_children_only() {
        let root = tree(json!({"a": 1, "b": [true, null]}));
        let kinds: Vec<_> = TreeIter::new(root, TreeOrder::ChildrenOrder)
            .map(|n| n.unwrap().kind())
            .collect();
        assert_eq!(kinds, [NodeKind::Int, NodeKind::Array]);
    }

    #[test]
    fn pre_order_visits_scalars() {
        let root = tree(json!({"a": 1, "b": [true, null]}));
        let kinds: Vec<_> = TreeIter::new(root, TreeOrder::PreOrder)
            .map(|n| n.unwrap().kind())
            .collect();
        assert_eq!(
            kinds,
            [NodeKind::Object, NodeKind::Int, NodeKind::Array, NodeKind::Bool, NodeKind::Null]
        );
    }

    #[test]
    fn scalar_start_yields_itself() {
        let root = tree(json!("x"));
        for order in [TreeOrder::PreOrder, TreeOrder::PostOrder, TreeOrder::LevelOrder] {
            assert_eq!(TreeIter::new(root.clone(), order).count(), 1);
        }
        assert_eq!(TreeIter::new(root, TreeOrder::ChildrenOrder).count(), 0);
    }

    #[test]
    fn order_parsing() {
        assert_eq!(TreeOrder::try_from(2).unwrap(), TreeOrder::PostOrder);
        assert!(TreeOrder::try_from(6).is_err());
        assert_eq!("level".parse::<TreeOrder>().unwrap(), TreeOrder::LevelOrder);
        assert_eq!("PRE_ORDER".parse::<TreeOrder>().unwrap(), TreeOrder::PreOrder);
        assert!("sideways".parse::<TreeOrder>().is_err());
    }
}
