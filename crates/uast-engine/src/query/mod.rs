//! JSONPath-style queries (RFC 9535 subset) over [`Node`] trees.
//!
//! Member names may start with `@`, so UAST keys read naturally:
//!
//! ```
//! use std::rc::Rc;
//! use uast_engine::{codec, query, Format, HandleNode, Node};
//!
//! let doc = br#"{"@type": "File", "children": [{"@type": "Ident", "Name": "x"}]}"#;
//! let tree = Rc::new(codec::decode(doc, Format::Json).unwrap());
//! let root = HandleNode::root(&tree).unwrap();
//!
//! let idents = query::filter(&root, "$..[?(@.@type == 'Ident')].Name").unwrap();
//! assert_eq!(idents[0].as_str().unwrap(), "x");
//! ```

use std::fmt;

use crate::node::Node;
use crate::EngineError;

mod eval;
mod parser;
mod scalar;
mod types;

pub use eval::QueryEval;
pub use parser::{ParseError, QueryParser};
pub use scalar::{coerce_bool, coerce_number, coerce_string, filter_bool, filter_number, filter_string};
pub use types::*;

/// Parses `query` and evaluates it against `root`.
pub fn filter<N: Node>(root: &N, query: &str) -> Result<Vec<N>, EngineError> {
    let path = QueryParser::parse(query)?;
    QueryEval::new(root).eval(&path)
}

impl fmt::Display for QueryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        write_segments(f, &self.segments)
    }
}

fn write_segments(f: &mut fmt::Formatter<'_>, segments: &[PathSegment]) -> fmt::Result {
    for segment in segments {
        if segment.recursive {
            f.write_str("..")?;
        }
        match segment.selectors.as_slice() {
            [Selector::Name(name)] if is_identifier(name) => {
                if !segment.recursive {
                    f.write_str(".")?;
                }
                f.write_str(name)?;
            }
            [Selector::Wildcard] => f.write_str(if segment.recursive { "*" } else { ".*" })?,
            selectors => {
                f.write_str("[")?;
                for (i, selector) in selectors.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{selector}")?;
                }
                f.write_str("]")?;
            }
        }
    }
    Ok(())
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Name(name) => write!(f, "'{}'", escape_single_quoted(name)),
            Selector::Index(index) => write!(f, "{index}"),
            Selector::Slice { start, end, step } => {
                if let Some(v) = start {
                    write!(f, "{v}")?;
                }
                f.write_str(":")?;
                if let Some(v) = end {
                    write!(f, "{v}")?;
                }
                if let Some(v) = step {
                    write!(f, ":{v}")?;
                }
                Ok(())
            }
            Selector::Wildcard => f.write_str("*"),
            Selector::Filter(expr) => write!(f, "?{expr}"),
        }
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpression::Comparison { operator, left, right } => {
                write!(f, "{left} {} {right}", operator.symbol())
            }
            FilterExpression::Logical { operator, left, right } => {
                let op = match operator {
                    LogicalOperator::And => "&&",
                    LogicalOperator::Or => "||",
                };
                write!(f, "{left} {op} {right}")
            }
            FilterExpression::Existence { origin, path } => write_path(f, *origin, path),
            FilterExpression::Function { name, args } => write_call(f, name, args),
            FilterExpression::Paren(expr) => write!(f, "({expr})"),
            FilterExpression::Negation(expr) => write!(f, "!{expr}"),
        }
    }
}

impl fmt::Display for ValueExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueExpression::Literal(serde_json::Value::String(s)) => write!(f, "'{}'", escape_single_quoted(s)),
            ValueExpression::Literal(value) => write!(f, "{value}"),
            ValueExpression::Path { origin, path } => write_path(f, *origin, path),
            ValueExpression::Function { name, args } => write_call(f, name, args),
        }
    }
}

fn write_path(f: &mut fmt::Formatter<'_>, origin: Origin, path: &QueryPath) -> fmt::Result {
    f.write_str(match origin {
        Origin::Current => "@",
        Origin::Root => "$",
    })?;
    write_segments(f, &path.segments)
}

fn write_call(f: &mut fmt::Formatter<'_>, name: &str, args: &[ValueExpression]) -> fmt::Result {
    write!(f, "{name}(")?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{arg}")?;
    }
    f.write_str(")")
}

fn is_identifier(name: &str) -> bool {
    let rest = name.strip_prefix('@').unwrap_or(name);
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

fn escape_single_quoted(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            _ => out.push(ch),
        }
    }
    out
}
