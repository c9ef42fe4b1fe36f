use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use uast_engine::codec::{self, json::to_json};
use uast_engine::{load, Format, HandleNode, Node, NodeCreator, NodeError, NodeId, NodeKind, NodeResult};

/// Minimal mutable tree used as a load target.
#[derive(Clone, Debug)]
enum Mem {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(Rc<str>),
    Array(Rc<RefCell<Vec<Mem>>>),
    Object(Rc<RefCell<Vec<(Rc<str>, Mem)>>>),
}

impl Node for Mem {
    fn id(&self) -> NodeId {
        match self {
            Mem::Array(items) => Rc::as_ptr(items) as *const u8 as usize,
            Mem::Object(fields) => Rc::as_ptr(fields) as *const u8 as usize,
            _ => 0,
        }
    }

    fn kind(&self) -> NodeKind {
        match self {
            Mem::Null => NodeKind::Null,
            Mem::Bool(_) => NodeKind::Bool,
            Mem::Int(_) => NodeKind::Int,
            Mem::Uint(_) => NodeKind::Uint,
            Mem::Float(_) => NodeKind::Float,
            Mem::Str(_) => NodeKind::String,
            Mem::Array(_) => NodeKind::Array,
            Mem::Object(_) => NodeKind::Object,
        }
    }

    fn as_str(&self) -> NodeResult<&str> {
        match self {
            Mem::Str(s) => Ok(&**s),
            other => Err(NodeError::kind("string", other.kind())),
        }
    }

    fn as_int(&self) -> NodeResult<i64> {
        match self {
            Mem::Int(v) => Ok(*v),
            other => Err(NodeError::kind("int", other.kind())),
        }
    }

    fn as_uint(&self) -> NodeResult<u64> {
        match self {
            Mem::Uint(v) => Ok(*v),
            other => Err(NodeError::kind("uint", other.kind())),
        }
    }

    fn as_float(&self) -> NodeResult<f64> {
        match self {
            Mem::Float(v) => Ok(*v),
            other => Err(NodeError::kind("float", other.kind())),
        }
    }

    fn as_bool(&self) -> NodeResult<bool> {
        match self {
            Mem::Bool(v) => Ok(*v),
            other => Err(NodeError::kind("bool", other.kind())),
        }
    }

    fn size(&self) -> NodeResult<usize> {
        Ok(match self {
            Mem::Array(items) => items.borrow().len(),
            Mem::Object(fields) => fields.borrow().len(),
            _ => 0,
        })
    }

    fn key_at(&self, index: usize) -> NodeResult<Rc<str>> {
        match self {
            Mem::Object(fields) => fields.borrow().get(index).map(|(k, _)| k.clone()).ok_or(
                NodeError::OutOfRange { index, size: fields.borrow().len() },
            ),
            other => Err(NodeError::kind("object", other.kind())),
        }
    }

    fn value_at(&self, index: usize) -> NodeResult<Self> {
        let found = match self {
            Mem::Array(items) => items.borrow().get(index).cloned(),
            Mem::Object(fields) => fields.borrow().get(index).map(|(_, v)| v.clone()),
            other => return Err(NodeError::kind("container", other.kind())),
        };
        found.ok_or(NodeError::OutOfRange { index, size: self.size()? })
    }

    fn set_value(&self, index: usize, value: Option<&Self>) -> NodeResult<()> {
        let Mem::Array(items) = self else { return Err(NodeError::kind("array", self.kind())) };
        let mut items = items.borrow_mut();
        let size = items.len();
        let slot = items.get_mut(index).ok_or(NodeError::OutOfRange { index, size })?;
        *slot = value.cloned().unwrap_or(Mem::Null);
        Ok(())
    }

    fn set_key_value(&self, key: &str, value: Option<&Self>) -> NodeResult<()> {
        let Mem::Object(fields) = self else { return Err(NodeError::kind("object", self.kind())) };
        fields.borrow_mut().push((key.into(), value.cloned().unwrap_or(Mem::Null)));
        Ok(())
    }
}

struct MemCreator;

impl NodeCreator for MemCreator {
    type Node = Mem;

    fn new_object(&self, size_hint: usize) -> NodeResult<Mem> {
        Ok(Mem::Object(Rc::new(RefCell::new(Vec::with_capacity(size_hint)))))
    }

    fn new_array(&self, size: usize) -> NodeResult<Mem> {
        Ok(Mem::Array(Rc::new(RefCell::new(vec![Mem::Null; size]))))
    }

    fn new_string(&self, value: &str) -> NodeResult<Mem> {
        Ok(Mem::Str(value.into()))
    }

    fn new_int(&self, value: i64) -> NodeResult<Mem> {
        Ok(Mem::Int(value))
    }

    fn new_uint(&self, value: u64) -> NodeResult<Mem> {
        Ok(Mem::Uint(value))
    }

    fn new_float(&self, value: f64) -> NodeResult<Mem> {
        Ok(Mem::Float(value))
    }

    fn new_bool(&self, value: bool) -> NodeResult<Mem> {
        Ok(Mem::Bool(value))
    }
}

fn decode(value: &serde_json::Value) -> HandleNode {
    let bytes = serde_json::to_vec(value).unwrap();
    HandleNode::root(&Rc::new(codec::decode(&bytes, Format::Json).unwrap())).unwrap()
}

#[test]
fn load_copies_every_kind() {
    let doc = json!({
        "@type": "File",
        "n": -3,
        "big": 18446744073709551615u64,
        "f": 0.5,
        "ok": true,
        "none": null,
        "children": [{"@type": "Ident"}, null, "s"]
    });
    let loaded = load(&decode(&doc), &MemCreator).unwrap().unwrap();
    assert_eq!(loaded.kind(), NodeKind::Object);
    assert_eq!(to_json(&loaded).unwrap(), doc);
}

#[test]
fn null_root_loads_as_none() {
    assert!(load(&decode(&json!(null)), &MemCreator).unwrap().is_none());
}

#[test]
fn loaded_tree_is_independent() {
    let src = decode(&json!({"a": [1]}));
    let loaded = load(&src, &MemCreator).unwrap().unwrap();
    loaded.set_key_value("b", None).unwrap();
    assert_eq!(loaded.size().unwrap(), 2);
    assert_eq!(src.size().unwrap(), 1);
}
