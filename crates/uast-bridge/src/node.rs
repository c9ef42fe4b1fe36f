//! Live nodes: the engine's view of one host value.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use uast_engine::{NodeError, NodeId, NodeKind, NodeResult};

use crate::host::{HostData, HostValue};
use crate::interface::{Interface, InterfaceInner};

struct NodeInner {
    kind: NodeKind,
    value: HostValue,
    /// Key order of an object, captured on first structural access.
    keys: RefCell<Option<Vec<Rc<str>>>>,
    iface: Weak<InterfaceInner>,
}

/// A host value wrapped for the engine.
///
/// The kind is fixed at creation. Strings are read straight out of the host
/// value, which the node keeps alive, so no decoded copy is cached.
#[derive(Clone)]
pub struct Node(Rc<NodeInner>);

impl Node {
    pub(crate) fn new(kind: NodeKind, value: HostValue, iface: Weak<InterfaceInner>) -> Self {
        Node(Rc::new(NodeInner { kind, value, keys: RefCell::new(None), iface }))
    }

    pub fn value(&self) -> &HostValue {
        &self.0.value
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Whether this node was issued by `iface`.
    pub fn belongs_to(&self, iface: &Interface) -> bool {
        self.0.iface.upgrade().is_some_and(|inner| iface.ptr_eq(&inner))
    }

    fn interface(&self) -> NodeResult<Rc<InterfaceInner>> {
        self.0.iface.upgrade().ok_or(NodeError::Detached)
    }

    fn expect(&self, expected: &'static str, ok: bool) -> NodeResult<()> {
        if ok {
            Ok(())
        } else {
            Err(NodeError::kind(expected, self.0.kind))
        }
    }

    fn int_value(&self, expected: &'static str) -> NodeResult<i128> {
        self.expect(expected, matches!(self.0.kind, NodeKind::Int | NodeKind::Uint))?;
        match self.0.value.data() {
            HostData::Int(v) => Ok(*v),
            _ => Err(NodeError::kind(expected, self.0.kind)),
        }
    }

    fn with_keys<T>(&self, f: impl FnOnce(&[Rc<str>]) -> NodeResult<T>) -> NodeResult<T> {
        self.expect("object", self.0.kind == NodeKind::Object)?;
        let mut keys = self.0.keys.borrow_mut();
        if keys.is_none() {
            let snapshot = self.0.value.keys().map_err(NodeError::host)?;
            *keys = Some(snapshot.into_iter().map(Rc::from).collect());
        }
        f(keys.as_deref().unwrap_or_default())
    }

    fn child(&self, value: HostValue) -> NodeResult<Node> {
        let iface = self.interface()?;
        iface.tracker_mut().track(value.clone());
        Ok(Interface::from_inner(iface).lookup_or_create(&value))
    }
}

impl uast_engine::Node for Node {
    fn id(&self) -> NodeId {
        Rc::as_ptr(&self.0) as *const u8 as usize
    }

    fn kind(&self) -> NodeKind {
        self.0.kind
    }

    fn as_str(&self) -> NodeResult<&str> {
        self.expect("string", self.0.kind == NodeKind::String)?;
        self.0.value.as_str().ok_or(NodeError::kind("string", self.0.kind))
    }

    fn as_int(&self) -> NodeResult<i64> {
        let v = self.int_value("int")?;
        i64::try_from(v).map_err(|_| NodeError::Overflow { value: v, target: "i64" })
    }

    fn as_uint(&self) -> NodeResult<u64> {
        let v = self.int_value("uint")?;
        u64::try_from(v).map_err(|_| NodeError::Overflow { value: v, target: "u64" })
    }

    fn as_float(&self) -> NodeResult<f64> {
        self.expect("float", self.0.kind.is_number())?;
        match self.0.value.data() {
            HostData::Float(v) => Ok(*v),
            HostData::Int(v) => Ok(*v as f64),
            _ => Err(NodeError::kind("float", self.0.kind)),
        }
    }

    fn as_bool(&self) -> NodeResult<bool> {
        self.expect("bool", self.0.kind == NodeKind::Bool)?;
        match self.0.value.data() {
            HostData::Bool(v) => Ok(*v),
            _ => Err(NodeError::kind("bool", self.0.kind)),
        }
    }

    fn size(&self) -> NodeResult<usize> {
        match self.0.kind {
            NodeKind::Null => Ok(0),
            NodeKind::Object => self.with_keys(|keys| Ok(keys.len())),
            _ => self.0.value.len().map_err(NodeError::host),
        }
    }

    fn key_at(&self, index: usize) -> NodeResult<Rc<str>> {
        self.with_keys(|keys| {
            keys.get(index).cloned().ok_or(NodeError::OutOfRange { index, size: keys.len() })
        })
    }

    fn value_at(&self, index: usize) -> NodeResult<Self> {
        let value = match self.0.kind {
            NodeKind::Array => {
                let size = self.size()?;
                if index >= size {
                    return Err(NodeError::OutOfRange { index, size });
                }
                self.0.value.get_item(index).map_err(NodeError::host)?
            }
            NodeKind::Object => {
                let key = self.key_at(index)?;
                self.0.value.get(&key).map_err(NodeError::host)?
            }
            kind => return Err(NodeError::kind("container", kind)),
        };
        self.child(value)
    }

    fn set_value(&self, index: usize, value: Option<&Self>) -> NodeResult<()> {
        self.expect("array", self.0.kind == NodeKind::Array)?;
        let value = value.map_or_else(HostValue::none, |node| node.value().clone());
        self.0.value.set_item(index, value).map_err(NodeError::host)
    }

    fn set_key_value(&self, key: &str, value: Option<&Self>) -> NodeResult<()> {
        self.expect("object", self.0.kind == NodeKind::Object)?;
        let value = value.map_or_else(HostValue::none, |node| node.value().clone());
        self.0.value.set(key, value).map_err(NodeError::host)?;
        if let Some(keys) = self.0.keys.borrow_mut().as_mut() {
            if !keys.iter().any(|k| &**k == key) {
                keys.push(key.into());
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.0.kind)
            .field("value", &self.0.value)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uast_engine::Node as _;

    fn scenario() -> (Interface, HostValue) {
        let value = HostValue::dict([
            ("a", HostValue::int(1)),
            ("b", HostValue::list([HostValue::bool(true), HostValue::none()])),
        ]);
        (Interface::new(), value)
    }

    #[test]
    fn scenario_shape() {
        let (iface, value) = scenario();
        let root = iface.lookup_or_create(&value);
        assert_eq!(root.kind(), NodeKind::Object);
        assert_eq!(root.size().unwrap(), 2);
        assert_eq!(&*root.key_at(0).unwrap(), "a");
        assert_eq!(&*root.key_at(1).unwrap(), "b");

        let a = root.value_at(0).unwrap();
        assert_eq!((a.kind(), a.as_int().unwrap()), (NodeKind::Int, 1));

        let b = root.value_at(1).unwrap();
        assert_eq!(b.kind(), NodeKind::Array);
        assert_eq!(b.value_at(0).unwrap().kind(), NodeKind::Bool);
        assert_eq!(b.value_at(1).unwrap().kind(), NodeKind::Null);
    }

    #[test]
    fn children_share_identity() {
        let (iface, value) = scenario();
        let root = iface.lookup_or_create(&value);
        let first = root.value_at(1).unwrap();
        let second = root.value_at(1).unwrap();
        assert!(first.ptr_eq(&second));

        first.set_value(0, None).unwrap();
        assert_eq!(second.value_at(0).unwrap().kind(), NodeKind::Null);
    }

    #[test]
    fn wrong_accessor_is_a_kind_error() {
        let (iface, value) = scenario();
        let b = iface.lookup_or_create(&value).value_at(1).unwrap();
        assert!(matches!(
            b.as_int(),
            Err(NodeError::Kind { expected: "int", found: NodeKind::Array })
        ));
        assert_eq!(b.size().unwrap(), 2);
    }

    #[test]
    fn key_order_is_a_snapshot() {
        let (iface, value) = scenario();
        let root = iface.lookup_or_create(&value);
        assert_eq!(root.size().unwrap(), 2);

        // changes made behind the node's back do not reorder it
        value.set("c", HostValue::int(3)).unwrap();
        assert_eq!(root.size().unwrap(), 2);

        root.set_key_value("d", Some(&iface.lookup_or_create(&HostValue::str("x")))).unwrap();
        assert_eq!(root.size().unwrap(), 3);
        assert_eq!(&*root.key_at(2).unwrap(), "d");
        assert_eq!(value.get("d").unwrap().as_str(), Some("x"));
    }

    #[test]
    fn size_of_scalars() {
        let iface = Interface::new();
        assert_eq!(iface.lookup_or_create(&HostValue::str("abc")).size().unwrap(), 3);
        assert_eq!(iface.lookup_or_create(&HostValue::none()).size().unwrap(), 0);
        assert!(matches!(
            iface.lookup_or_create(&HostValue::int(3)).size(),
            Err(NodeError::Host(_))
        ));
    }

    #[test]
    fn tuple_elements_cannot_be_replaced() {
        let iface = Interface::new();
        let tuple = iface.lookup_or_create(&HostValue::tuple([HostValue::int(1)]));
        assert!(matches!(tuple.set_value(0, None), Err(NodeError::Host(_))));
    }

    #[test]
    fn detached_node_reports_it() {
        let value = HostValue::list([HostValue::int(1)]);
        let node = Interface::new().lookup_or_create(&value);
        assert!(matches!(node.value_at(0), Err(NodeError::Detached)));
    }

    #[test]
    fn numbers_share_one_category() {
        let iface = Interface::new();
        let big = iface.lookup_or_create(&HostValue::int(u64::MAX));
        assert_eq!(big.kind(), NodeKind::Uint);
        assert_eq!(big.as_uint().unwrap(), u64::MAX);
        assert!(matches!(big.as_int(), Err(NodeError::Overflow { target: "i64", .. })));

        let neg = iface.lookup_or_create(&HostValue::int(-2));
        assert!(matches!(neg.as_uint(), Err(NodeError::Overflow { value: -2, target: "u64" })));
        assert_eq!(neg.as_float().unwrap(), -2.0);

        let text = iface.lookup_or_create(&HostValue::str("1"));
        assert!(matches!(text.as_float(), Err(NodeError::Kind { expected: "float", .. })));
    }
}
