//! The dynamically-typed host object graph.
//!
//! A [`HostValue`] is a reference-counted handle with identity, the same way
//! objects behave in a scripting runtime: cloning a handle shares the value,
//! containers are mutated in place, and two handles are "the same object"
//! only when [`HostValue::is`] says so.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Identity of a live host value.
pub type HostId = usize;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HostError {
    #[error("object of type '{0}' has no len()")]
    NotSized(&'static str),
    #[error("'{0}' object is not a sequence")]
    NotSequence(&'static str),
    #[error("'{0}' object is not a mapping")]
    NotMapping(&'static str),
    #[error("'{0}' object does not support item assignment")]
    Immutable(&'static str),
    #[error("index {index} out of range for sequence of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("key {0:?} not found")]
    KeyMissing(String),
    #[error("'{0}' object is being modified elsewhere")]
    Busy(&'static str),
    #[error("integer {value} does not fit in {target}")]
    IntOverflow { value: i128, target: &'static str },
    #[error("'{0}' object cannot be represented as JSON")]
    Unrepresentable(&'static str),
}

pub type HostResult<T> = Result<T, HostError>;

/// Payload of a host value.
pub enum HostData {
    None,
    Bool(bool),
    /// Arbitrary-size integer.
    Int(i128),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(RefCell<Vec<HostValue>>),
    Tuple(Vec<HostValue>),
    Dict(RefCell<IndexMap<String, HostValue>>),
    /// Opaque object handed to the host by the adapter.
    Capsule(Rc<dyn Any>),
}

#[derive(Clone)]
pub struct HostValue(Rc<HostData>);

impl HostValue {
    pub fn new(data: HostData) -> Self {
        HostValue(Rc::new(data))
    }

    pub fn none() -> Self {
        Self::new(HostData::None)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(HostData::Bool(value))
    }

    pub fn int(value: impl Into<i128>) -> Self {
        Self::new(HostData::Int(value.into()))
    }

    pub fn float(value: f64) -> Self {
        Self::new(HostData::Float(value))
    }

    pub fn str(value: impl Into<String>) -> Self {
        Self::new(HostData::Str(value.into()))
    }

    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Self::new(HostData::Bytes(value.into()))
    }

    pub fn list(items: impl IntoIterator<Item = HostValue>) -> Self {
        Self::new(HostData::List(RefCell::new(items.into_iter().collect())))
    }

    pub fn tuple(items: impl IntoIterator<Item = HostValue>) -> Self {
        Self::new(HostData::Tuple(items.into_iter().collect()))
    }

    pub fn dict<K: Into<String>>(entries: impl IntoIterator<Item = (K, HostValue)>) -> Self {
        let map = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::new(HostData::Dict(RefCell::new(map)))
    }

    pub fn capsule<T: Any>(object: T) -> Self {
        Self::new(HostData::Capsule(Rc::new(object)))
    }

    pub fn data(&self) -> &HostData {
        &self.0
    }

    /// Reference equality.
    pub fn is(&self, other: &HostValue) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn id(&self) -> HostId {
        Rc::as_ptr(&self.0) as *const u8 as usize
    }

    /// Number of live handles to this value.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn type_name(&self) -> &'static str {
        match self.data() {
            HostData::None => "NoneType",
            HostData::Bool(_) => "bool",
            HostData::Int(_) => "int",
            HostData::Float(_) => "float",
            HostData::Str(_) => "str",
            HostData::Bytes(_) => "bytes",
            HostData::List(_) => "list",
            HostData::Tuple(_) => "tuple",
            HostData::Dict(_) => "dict",
            HostData::Capsule(_) => "capsule",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self.data(), HostData::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.data() {
            HostData::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self.data() {
            HostData::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The capsule payload, if this is a capsule holding a `T`.
    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        match self.data() {
            HostData::Capsule(object) => object.clone().downcast::<T>().ok(),
            _ => None,
        }
    }

    pub fn len(&self) -> HostResult<usize> {
        match self.data() {
            HostData::Str(s) => Ok(s.chars().count()),
            HostData::Bytes(b) => Ok(b.len()),
            HostData::List(items) => Ok(items.try_borrow().map_err(|_| self.busy())?.len()),
            HostData::Tuple(items) => Ok(items.len()),
            HostData::Dict(map) => Ok(map.try_borrow().map_err(|_| self.busy())?.len()),
            _ => Err(HostError::NotSized(self.type_name())),
        }
    }

    pub fn is_empty(&self) -> HostResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get_item(&self, index: usize) -> HostResult<HostValue> {
        let out_of_range = |len| HostError::IndexOutOfRange { index, len };
        match self.data() {
            HostData::List(items) => {
                let items = items.try_borrow().map_err(|_| self.busy())?;
                items.get(index).cloned().ok_or(out_of_range(items.len()))
            }
            HostData::Tuple(items) => items.get(index).cloned().ok_or(out_of_range(items.len())),
            _ => Err(HostError::NotSequence(self.type_name())),
        }
    }

    pub fn set_item(&self, index: usize, value: HostValue) -> HostResult<()> {
        match self.data() {
            HostData::List(items) => {
                let mut items = items.try_borrow_mut().map_err(|_| self.busy())?;
                let len = items.len();
                let slot = items.get_mut(index).ok_or(HostError::IndexOutOfRange { index, len })?;
                *slot = value;
                Ok(())
            }
            HostData::Tuple(_) => Err(HostError::Immutable(self.type_name())),
            _ => Err(HostError::NotSequence(self.type_name())),
        }
    }

    /// Appends to a list.
    pub fn push(&self, value: HostValue) -> HostResult<()> {
        match self.data() {
            HostData::List(items) => {
                items.try_borrow_mut().map_err(|_| self.busy())?.push(value);
                Ok(())
            }
            HostData::Tuple(_) => Err(HostError::Immutable(self.type_name())),
            _ => Err(HostError::NotSequence(self.type_name())),
        }
    }

    /// Mapping keys in insertion order.
    pub fn keys(&self) -> HostResult<Vec<String>> {
        match self.data() {
            HostData::Dict(map) => Ok(map.try_borrow().map_err(|_| self.busy())?.keys().cloned().collect()),
            _ => Err(HostError::NotMapping(self.type_name())),
        }
    }

    pub fn get(&self, key: &str) -> HostResult<HostValue> {
        match self.data() {
            HostData::Dict(map) => map
                .try_borrow()
                .map_err(|_| self.busy())?
                .get(key)
                .cloned()
                .ok_or_else(|| HostError::KeyMissing(key.to_string())),
            _ => Err(HostError::NotMapping(self.type_name())),
        }
    }

    /// Inserts or replaces `key`. A new key goes last.
    pub fn set(&self, key: &str, value: HostValue) -> HostResult<()> {
        match self.data() {
            HostData::Dict(map) => {
                map.try_borrow_mut().map_err(|_| self.busy())?.insert(key.to_string(), value);
                Ok(())
            }
            _ => Err(HostError::NotMapping(self.type_name())),
        }
    }

    fn busy(&self) -> HostError {
        HostError::Busy(self.type_name())
    }

    /// Builds a fresh value graph from JSON. Arrays become lists, objects
    /// become dicts.
    pub fn from_json(value: &Value) -> HostValue {
        match value {
            Value::Null => HostValue::none(),
            Value::Bool(b) => HostValue::bool(*b),
            Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => HostValue::int(i),
                (None, Some(u)) => HostValue::int(u),
                _ => HostValue::float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => HostValue::str(s.as_str()),
            Value::Array(items) => HostValue::list(items.iter().map(HostValue::from_json)),
            Value::Object(map) => HostValue::dict(map.iter().map(|(k, v)| (k.as_str(), HostValue::from_json(v)))),
        }
    }

    /// Copies the value graph into JSON. Lists and tuples both become
    /// arrays; non-finite floats become `null`.
    pub fn to_json(&self) -> HostResult<Value> {
        self.to_json_inner(&mut HashSet::new())
    }

    fn to_json_inner(&self, path: &mut HashSet<HostId>) -> HostResult<Value> {
        let container = |path: &mut HashSet<HostId>| {
            if path.insert(self.id()) {
                Ok(())
            } else {
                Err(HostError::Unrepresentable("recursive"))
            }
        };
        let value = match self.data() {
            HostData::None => Value::Null,
            HostData::Bool(b) => Value::Bool(*b),
            HostData::Int(v) => {
                if let Ok(i) = i64::try_from(*v) {
                    Value::from(i)
                } else {
                    Value::from(u64::try_from(*v).map_err(|_| HostError::IntOverflow { value: *v, target: "u64" })?)
                }
            }
            HostData::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            HostData::Str(s) => Value::String(s.clone()),
            HostData::List(_) | HostData::Tuple(_) => {
                container(path)?;
                let mut items = Vec::new();
                for i in 0..self.len()? {
                    items.push(self.get_item(i)?.to_json_inner(path)?);
                }
                Value::Array(items)
            }
            HostData::Dict(_) => {
                container(path)?;
                let mut map = Map::new();
                for key in self.keys()? {
                    let value = self.get(&key)?.to_json_inner(path)?;
                    map.insert(key, value);
                }
                Value::Object(map)
            }
            HostData::Bytes(_) | HostData::Capsule(_) => {
                return Err(HostError::Unrepresentable(self.type_name()));
            }
        };
        path.remove(&self.id());
        Ok(value)
    }

    /// Structural equality. Lists and tuples compare equal element-wise,
    /// dicts compare key order too. Capsules are only equal to themselves.
    pub fn deep_equal(&self, other: &HostValue) -> bool {
        if self.is(other) {
            return true;
        }
        match (self.data(), other.data()) {
            (HostData::None, HostData::None) => true,
            (HostData::Bool(a), HostData::Bool(b)) => a == b,
            (HostData::Int(a), HostData::Int(b)) => a == b,
            (HostData::Float(a), HostData::Float(b)) => a == b,
            (HostData::Str(a), HostData::Str(b)) => a == b,
            (HostData::Bytes(a), HostData::Bytes(b)) => a == b,
            (HostData::List(_) | HostData::Tuple(_), HostData::List(_) | HostData::Tuple(_)) => {
                match (self.len(), other.len()) {
                    (Ok(a), Ok(b)) if a == b => (0..a).all(|i| match (self.get_item(i), other.get_item(i)) {
                        (Ok(x), Ok(y)) => x.deep_equal(&y),
                        _ => false,
                    }),
                    _ => false,
                }
            }
            (HostData::Dict(_), HostData::Dict(_)) => match (self.keys(), other.keys()) {
                (Ok(a), Ok(b)) if a == b => a.iter().all(|k| match (self.get(k), other.get(k)) {
                    (Ok(x), Ok(y)) => x.deep_equal(&y),
                    _ => false,
                }),
                _ => false,
            },
            _ => false,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data() {
            HostData::None => f.write_str("None"),
            HostData::Bool(b) => write!(f, "{b}"),
            HostData::Int(v) => write!(f, "{v}"),
            HostData::Float(v) => write!(f, "{v:?}"),
            HostData::Str(s) => write!(f, "{s:?}"),
            HostData::Bytes(b) => write!(f, "b{b:?}"),
            HostData::List(items) => match items.try_borrow() {
                Ok(items) => f.debug_list().entries(items.iter()).finish(),
                Err(_) => f.write_str("[<busy>]"),
            },
            HostData::Tuple(items) => {
                let mut t = f.debug_tuple("");
                for item in items {
                    t.field(item);
                }
                t.finish()
            }
            HostData::Dict(map) => match map.try_borrow() {
                Ok(map) => f.debug_map().entries(map.iter()).finish(),
                Err(_) => f.write_str("{<busy>}"),
            },
            HostData::Capsule(_) => write!(f, "<capsule at {:#x}>", self.id()),
        }
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::bool(value)
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        HostValue::int(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::float(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::str(value)
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::str(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_is_by_reference() {
        let a = HostValue::str("x");
        let b = a.clone();
        let c = HostValue::str("x");
        assert!(a.is(&b));
        assert!(!a.is(&c));
        assert_eq!(a.id(), b.id());
        assert_eq!(a.ref_count(), 2);
        assert!(a.deep_equal(&c));
    }

    #[test]
    fn list_mutation_is_shared() {
        let list = HostValue::list([HostValue::int(1), HostValue::int(2)]);
        let alias = list.clone();
        alias.set_item(1, HostValue::str("two")).unwrap();
        assert_eq!(list.get_item(1).unwrap().as_str(), Some("two"));
        assert_eq!(
            list.set_item(5, HostValue::none()),
            Err(HostError::IndexOutOfRange { index: 5, len: 2 })
        );
    }

    #[test]
    fn tuples_are_immutable() {
        let tuple = HostValue::tuple([HostValue::int(1)]);
        assert_eq!(tuple.set_item(0, HostValue::none()), Err(HostError::Immutable("tuple")));
        assert_eq!(tuple.len().unwrap(), 1);
    }

    #[test]
    fn dict_keeps_insertion_order() {
        let dict = HostValue::dict([("z", HostValue::int(1)), ("a", HostValue::int(2))]);
        dict.set("m", HostValue::int(3)).unwrap();
        dict.set("z", HostValue::int(4)).unwrap();
        assert_eq!(dict.keys().unwrap(), ["z", "a", "m"]);
        assert_eq!(dict.get("z").unwrap().as_int(), Some(4));
        assert_eq!(dict.get("q").unwrap_err(), HostError::KeyMissing("q".into()));
    }

    #[test]
    fn scalars_have_no_len_except_text() {
        assert_eq!(HostValue::str("héllo").len().unwrap(), 5);
        assert_eq!(HostValue::int(3).len(), Err(HostError::NotSized("int")));
        assert_eq!(HostValue::none().keys(), Err(HostError::NotMapping("NoneType")));
    }

    #[test]
    fn json_round_trip() {
        let doc = json!({"a": [1, -2, 3.5, "s", null, true], "b": {"c": 18446744073709551615u64}});
        let value = HostValue::from_json(&doc);
        assert_eq!(value.to_json().unwrap(), doc);
    }

    #[test]
    fn recursive_structures_are_not_json() {
        let list = HostValue::list([]);
        list.push(list.clone()).unwrap();
        assert_eq!(list.to_json(), Err(HostError::Unrepresentable("recursive")));
        // break the cycle so the test does not leak
        list.set_item(0, HostValue::none()).unwrap();
    }

    #[test]
    fn int_overflow_names_the_target() {
        let json = HostValue::int(u64::MAX as i128).to_json().unwrap();
        assert_eq!(json, json!(u64::MAX));
        let err = HostValue::int(u64::MAX as i128 + 1).to_json().unwrap_err();
        assert!(matches!(err, HostError::IntOverflow { target: "u64", .. }));
        assert_eq!(err.to_string(), "integer 18446744073709551616 does not fit in u64");
    }

    #[test]
    fn capsules_downcast_to_their_payload() {
        let capsule = HostValue::capsule(42u32);
        assert_eq!(capsule.downcast::<u32>().as_deref(), Some(&42));
        assert!(capsule.downcast::<String>().is_none());
        assert!(HostValue::int(1).downcast::<u32>().is_none());
    }
}
