//! CBOR writer for node trees and a decoder into [`ExternalTree`].

use std::collections::HashSet;
use std::rc::Rc;

use ciborium::value::Value;

use super::Format;
use crate::external::Slot;
use crate::node::{Node, NodeId};
use crate::{EngineError, ExternalTree, NodeHandle, NodeKind};

const OVERLAY_UIN: u8 = 0b000_00000;
const OVERLAY_NIN: u8 = 0b001_00000;
const OVERLAY_STR: u8 = 0b011_00000;
const OVERLAY_ARR: u8 = 0b100_00000;
const OVERLAY_MAP: u8 = 0b101_00000;

/// Streams a node tree as CBOR.
///
/// Floats are written as f32 when that is lossless, f64 otherwise. Integers
/// use the shortest header that fits.
#[derive(Debug, Default)]
pub struct CborWriter {
    out: Vec<u8>,
    /// Containers on the current path, for cycle detection.
    path: HashSet<NodeId>,
}

impl CborWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }

    pub fn write_node<N: Node>(&mut self, node: &N) -> Result<(), EngineError> {
        match node.kind() {
            NodeKind::Null => self.write_null(),
            NodeKind::Bool => self.write_boolean(node.as_bool()?),
            NodeKind::Int => self.write_integer(node.as_int()?),
            NodeKind::Uint => self.write_u_integer(node.as_uint()?),
            NodeKind::Float => self.write_float(node.as_float()?),
            NodeKind::String => self.write_str(node.as_str()?),
            kind @ (NodeKind::Array | NodeKind::Object) => {
                if !self.path.insert(node.id()) {
                    return Err(EngineError::Cycle);
                }
                let size = node.size()?;
                if kind == NodeKind::Array {
                    self.write_hdr(OVERLAY_ARR, size as u64);
                    for i in 0..size {
                        self.write_node(&node.value_at(i)?)?;
                    }
                } else {
                    self.write_hdr(OVERLAY_MAP, size as u64);
                    for i in 0..size {
                        self.write_str(&node.key_at(i)?);
                        self.write_node(&node.value_at(i)?)?;
                    }
                }
                self.path.remove(&node.id());
            }
        }
        Ok(())
    }

    pub fn write_null(&mut self) {
        self.out.push(0xf6);
    }

    pub fn write_boolean(&mut self, b: bool) {
        self.out.push(if b { 0xf5 } else { 0xf4 });
    }

    pub fn write_integer(&mut self, int: i64) {
        if int >= 0 {
            self.write_u_integer(int as u64);
        } else {
            self.encode_nint(int);
        }
    }

    pub fn write_u_integer(&mut self, uint: u64) {
        self.write_hdr(OVERLAY_UIN, uint);
    }

    pub fn encode_nint(&mut self, int: i64) {
        let uint = (-1i64).wrapping_sub(int) as u64;
        self.write_hdr(OVERLAY_NIN, uint);
    }

    /// Uses f32 if the value fits losslessly, otherwise f64.
    pub fn write_float(&mut self, float: f64) {
        if is_float32(float) {
            self.out.push(0xfa);
            self.out.extend_from_slice(&(float as f32).to_be_bytes());
        } else {
            self.out.push(0xfb);
            self.out.extend_from_slice(&float.to_be_bytes());
        }
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_hdr(OVERLAY_STR, s.len() as u64);
        self.out.extend_from_slice(s.as_bytes());
    }

    /// Major type in the top three bits of `overlay`, argument in the
    /// shortest encoding.
    fn write_hdr(&mut self, overlay: u8, length: u64) {
        if length <= 23 {
            self.out.push(overlay | length as u8);
        } else if length <= 0xff {
            self.out.extend_from_slice(&[overlay | 0x18, length as u8]);
        } else if length <= 0xffff {
            self.out.push(overlay | 0x19);
            self.out.extend_from_slice(&(length as u16).to_be_bytes());
        } else if length <= 0xffff_ffff {
            self.out.push(overlay | 0x1a);
            self.out.extend_from_slice(&(length as u32).to_be_bytes());
        } else {
            self.out.push(overlay | 0x1b);
            self.out.extend_from_slice(&length.to_be_bytes());
        }
    }
}

fn is_float32(value: f64) -> bool {
    value.is_nan() || (value as f32) as f64 == value
}

pub(crate) fn decode(buf: &[u8]) -> Result<ExternalTree, EngineError> {
    let mut reader = buf;
    let value: Value = ciborium::de::from_reader(&mut reader)
        .map_err(|err| EngineError::decode(Format::Binary, err.to_string()))?;
    if !reader.is_empty() {
        return Err(EngineError::decode(
            Format::Binary,
            format!("{} trailing byte(s)", reader.len()),
        ));
    }
    let mut tree = ExternalTree::default();
    let root = build(&mut tree, value)?;
    tree.set_root(root);
    Ok(tree)
}

fn build(tree: &mut ExternalTree, value: Value) -> Result<NodeHandle, EngineError> {
    let slot = match value {
        Value::Null => Slot::Null,
        Value::Bool(b) => Slot::Bool(b),
        Value::Integer(int) => {
            let int = i128::from(int);
            if let Ok(int) = i64::try_from(int) {
                Slot::Int(int)
            } else if let Ok(uint) = u64::try_from(int) {
                Slot::Uint(uint)
            } else {
                return Err(EngineError::decode(Format::Binary, format!("integer {int} out of range")));
            }
        }
        Value::Float(float) => Slot::Float(float),
        Value::Text(s) => Slot::String(s.into_boxed_str()),
        Value::Tag(_, inner) => return build(tree, *inner),
        Value::Array(items) => {
            let handles = items
                .into_iter()
                .map(|item| build(tree, item))
                .collect::<Result<Vec<_>, _>>()?;
            Slot::Array(handles)
        }
        Value::Map(entries) => {
            let mut fields: Vec<(Rc<str>, NodeHandle)> = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                let Value::Text(key) = key else {
                    return Err(EngineError::decode(Format::Binary, "object keys must be text strings"));
                };
                if fields.iter().any(|(existing, _)| **existing == *key) {
                    return Err(EngineError::decode(Format::Binary, format!("duplicate key {key:?}")));
                }
                let handle = build(tree, value)?;
                fields.push((key.into(), handle));
            }
            Slot::Object(fields)
        }
        Value::Bytes(_) => {
            return Err(EngineError::decode(Format::Binary, "byte strings are not supported"));
        }
        other => {
            return Err(EngineError::decode(Format::Binary, format!("unsupported item {other:?}")));
        }
    };
    Ok(tree.push(slot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HandleNode;

    fn decode_root(buf: &[u8]) -> HandleNode {
        HandleNode::root(&Rc::new(decode(buf).unwrap())).unwrap()
    }

    #[test]
    fn integer_headers() {
        let mut w = CborWriter::new();
        w.write_integer(10);
        w.write_integer(100);
        w.write_integer(1000);
        w.write_integer(-1);
        w.write_integer(-500);
        assert_eq!(w.into_bytes(), [0x0a, 0x18, 0x64, 0x19, 0x03, 0xe8, 0x20, 0x39, 0x01, 0xf3]);
    }

    #[test]
    fn floats_shrink_when_lossless() {
        let mut w = CborWriter::new();
        w.write_float(1.5);
        assert_eq!(w.into_bytes(), [0xfa, 0x3f, 0xc0, 0x00, 0x00]);

        let mut w = CborWriter::new();
        w.write_float(0.1);
        assert_eq!(w.into_bytes()[0], 0xfb);
    }

    #[test]
    fn string_and_map_headers() {
        let mut w = CborWriter::new();
        w.write_hdr(OVERLAY_MAP, 1);
        w.write_str("a");
        w.write_boolean(true);
        assert_eq!(w.into_bytes(), [0xa1, 0x61, b'a', 0xf5]);
    }

    #[test]
    fn decodes_big_unsigned() {
        let root = decode_root(&[0x1b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(root.kind(), NodeKind::Uint);
        assert_eq!(root.as_uint().unwrap(), u64::MAX);
    }

    #[test]
    fn rejects_trailing_bytes() {
        assert!(matches!(
            decode(&[0xf6, 0xf6]),
            Err(EngineError::Decode { format: Format::Binary, .. })
        ));
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(decode(&[0x82, 0x01]).is_err());
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn rejects_non_text_keys_and_bytes() {
        assert!(decode(&[0xa1, 0x01, 0x02]).is_err());
        assert!(decode(&[0x41, 0x00]).is_err());
    }
}
