//! Queries read as a single scalar.
//!
//! A boolean read never fails on the shape of the result: no match is
//! `false`, several matches are `true` and a single match is tested for
//! truthiness. Number and string reads need exactly one scalar match.

use crate::node::Node;
use crate::{EngineError, NodeKind};

use super::filter;

pub fn filter_bool<N: Node>(root: &N, query: &str) -> Result<bool, EngineError> {
    coerce_bool(&filter(root, query)?)
}

pub fn filter_number<N: Node>(root: &N, query: &str) -> Result<f64, EngineError> {
    coerce_number(&filter(root, query)?)
}

pub fn filter_string<N: Node>(root: &N, query: &str) -> Result<String, EngineError> {
    coerce_string(&filter(root, query)?)
}

pub fn coerce_bool<N: Node>(matches: &[N]) -> Result<bool, EngineError> {
    let [node] = matches else { return Ok(!matches.is_empty()) };
    Ok(match node.kind() {
        NodeKind::Null => false,
        NodeKind::Bool => node.as_bool()?,
        NodeKind::Int | NodeKind::Uint | NodeKind::Float => {
            let value = node.as_float()?;
            value != 0.0 && !value.is_nan()
        }
        NodeKind::String => !node.as_str()?.is_empty(),
        NodeKind::Array | NodeKind::Object => true,
    })
}

pub fn coerce_number<N: Node>(matches: &[N]) -> Result<f64, EngineError> {
    let node = single(matches, "number")?;
    match node.kind() {
        NodeKind::Int | NodeKind::Uint | NodeKind::Float => Ok(node.as_float()?),
        NodeKind::Bool => Ok(if node.as_bool()? { 1.0 } else { 0.0 }),
        NodeKind::String => {
            let text = node.as_str()?;
            text.trim()
                .parse()
                .map_err(|_| EngineError::coerce("number", format!("{text:?} is not numeric")))
        }
        kind => Err(EngineError::coerce("number", format!("matched a {kind} node"))),
    }
}

pub fn coerce_string<N: Node>(matches: &[N]) -> Result<String, EngineError> {
    let node = single(matches, "string")?;
    match node.kind() {
        NodeKind::String => Ok(node.as_str()?.to_string()),
        NodeKind::Bool => Ok(node.as_bool()?.to_string()),
        NodeKind::Int => Ok(node.as_int()?.to_string()),
        NodeKind::Uint => Ok(node.as_uint()?.to_string()),
        NodeKind::Float => Ok(node.as_float()?.to_string()),
        kind => Err(EngineError::coerce("string", format!("matched a {kind} node"))),
    }
}

fn single<'a, N: Node>(matches: &'a [N], expected: &'static str) -> Result<&'a N, EngineError> {
    match matches {
        [node] => Ok(node),
        _ => Err(EngineError::coerce(expected, format!("query matched {} nodes", matches.len()))),
    }
}
