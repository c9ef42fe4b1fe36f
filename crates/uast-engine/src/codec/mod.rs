//! Serialization of node trees.
//!
//! Encoding walks any [`Node`] tree. Decoding never touches a host: it
//! produces an [`ExternalTree`] that can be traversed and queried directly,
//! or materialized elsewhere with [`load`](crate::load).

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::node::Node;
use crate::{EngineError, ExternalTree};

mod cbor;
pub mod json;

pub use cbor::CborWriter;

/// Wire format of an encoded tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "String")]
#[repr(u8)]
pub enum Format {
    /// Compact binary (CBOR, RFC 8949).
    #[default]
    Binary = 0,
    /// UTF-8 JSON text.
    Json = 1,
}

impl Format {
    pub fn name(self) -> &'static str {
        match self {
            Format::Binary => "binary",
            Format::Json => "json",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for Format {
    type Error = EngineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Format::Binary),
            1 => Ok(Format::Json),
            other => Err(EngineError::UnknownFormat(other.to_string())),
        }
    }
}

impl FromStr for Format {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" | "cbor" => Ok(Format::Binary),
            "json" => Ok(Format::Json),
            _ => Err(EngineError::UnknownFormat(s.to_string())),
        }
    }
}

impl TryFrom<String> for Format {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Serializes the tree rooted at `node`.
///
/// Fails on cyclic trees and on non-finite floats in JSON.
pub fn encode<N: Node>(node: &N, format: Format) -> Result<Vec<u8>, EngineError> {
    match format {
        Format::Binary => {
            let mut writer = CborWriter::new();
            writer.write_node(node)?;
            Ok(writer.into_bytes())
        }
        Format::Json => json::encode(node),
    }
}

/// Parses `buf` into a read-only tree. The whole buffer must be consumed.
pub fn decode(buf: &[u8], format: Format) -> Result<ExternalTree, EngineError> {
    match format {
        Format::Binary => cbor::decode(buf),
        Format::Json => json::decode(buf),
    }
}
