//! Core logic of the `uast` command-line tool.
//!
//! Documents are read as JSON, turned into host values and pushed through
//! the same boundary functions a host would call:
//! - `iterate` prints every visited node, one JSON value per line
//! - `filter` prints the matches of a JSONPath query
//! - `encode` writes the binary or JSON encoding of a document
//! - `decode` materializes an encoded buffer and prints it as JSON

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::{Error, Format, HostValue, NodeIterator, TreeOrder};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),
    #[error("{0}")]
    Uast(#[from] Error),
    #[error("{0}")]
    Usage(String),
}

/// Defaults read from a TOML file; flags on the command line win.
///
/// ```toml
/// format = "json"
/// order = "post"
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CliConfig {
    pub format: Format,
    pub order: TreeOrder,
}

impl CliConfig {
    pub fn from_toml(text: &str) -> Result<Self, CliError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), ?config, "loaded config");
        Ok(config)
    }
}

fn parse(json: &str) -> Result<HostValue, CliError> {
    let value: Value = serde_json::from_str(json)?;
    Ok(HostValue::from_json(&value))
}

fn lines(nodes: NodeIterator) -> Result<Vec<String>, CliError> {
    let mut out = Vec::new();
    for node in nodes {
        let value = node?.to_json().map_err(Error::from)?;
        out.push(serde_json::to_string(&value)?);
    }
    Ok(out)
}

/// Every node of a JSON document in `order`, one compact JSON value each.
pub fn iterate(json: &str, order: TreeOrder) -> Result<Vec<String>, CliError> {
    lines(crate::iterator(&parse(json)?, order)?)
}

/// Matches of `query` in a JSON document.
pub fn filter(json: &str, query: &str) -> Result<Vec<String>, CliError> {
    lines(crate::filter(&parse(json)?, query)?)
}

/// Encodes a JSON document in `format`.
pub fn encode(json: &str, format: Format) -> Result<Vec<u8>, CliError> {
    Ok(crate::encode(&parse(json)?, format)?)
}

/// Decodes a `format` buffer and renders it as pretty-printed JSON.
pub fn decode(bytes: &[u8], format: Format) -> Result<String, CliError> {
    let ctx = crate::decode(bytes, format)?;
    let value = ctx.load(None)?.to_json().map_err(Error::from)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_and_overrides() {
        assert_eq!(CliConfig::from_toml("").unwrap(), CliConfig::default());
        let config = CliConfig::from_toml("format = \"json\"\norder = \"level\"").unwrap();
        assert_eq!(config.format, Format::Json);
        assert_eq!(config.order, TreeOrder::LevelOrder);
        assert!(matches!(CliConfig::from_toml("order = \"sideways\""), Err(CliError::Config(_))));
    }

    #[test]
    fn iterate_prints_each_node() {
        let out = iterate(r#"{"a": 1, "b": [true]}"#, TreeOrder::PostOrder).unwrap();
        assert_eq!(out, ["1", "true", "[true]", r#"{"a":1,"b":[true]}"#]);
    }

    #[test]
    fn filter_prints_matches() {
        let out = filter(r#"{"a": {"x": 1}, "b": {"x": 2}}"#, "$..x").unwrap();
        assert_eq!(out, ["1", "2"]);
    }

    #[test]
    fn encode_then_decode() {
        let bytes = encode(r#"{"k": [1, 2.5, "s", null]}"#, Format::Binary).unwrap();
        let json = decode(&bytes, Format::Binary).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, serde_json::json!({"k": [1, 2.5, "s", null]}));
    }

    #[test]
    fn bad_input_is_reported() {
        assert!(matches!(iterate("{", TreeOrder::PreOrder), Err(CliError::Json(_))));
        assert!(matches!(decode(b"\xff", Format::Binary), Err(CliError::Uast(_))));
    }
}
