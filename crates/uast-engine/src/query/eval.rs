//! Query evaluator over any [`Node`] tree.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde_json::Value;

use super::parser::ParseError;
use super::types::*;
use crate::codec::json::to_json;
use crate::node::Node;
use crate::order::children;
use crate::{EngineError, NodeKind};

/// Evaluates parsed queries against one root.
///
/// `$` inside filter expressions always refers to the root the evaluator was
/// created with, not to the node under test.
pub struct QueryEval<'r, N: Node> {
    root: &'r N,
    patterns: HashMap<(String, bool), Regex>,
}

impl<'r, N: Node> QueryEval<'r, N> {
    pub fn new(root: &'r N) -> Self {
        Self { root, patterns: HashMap::new() }
    }

    /// Matching nodes in document order. Duplicates are kept.
    pub fn eval(&mut self, path: &QueryPath) -> Result<Vec<N>, EngineError> {
        self.eval_from(path, self.root.clone())
    }

    fn eval_from(&mut self, path: &QueryPath, start: N) -> Result<Vec<N>, EngineError> {
        let mut current = vec![start];
        for segment in &path.segments {
            let mut next = Vec::new();
            for node in &current {
                if segment.recursive {
                    self.descend(node, &segment.selectors, &mut next)?;
                } else {
                    for selector in &segment.selectors {
                        self.select(node, selector, &mut next)?;
                    }
                }
            }
            current = next;
        }
        Ok(current)
    }

    /// Applies `selectors` to `start` and each of its descendants, pre-order.
    /// Containers reachable twice are only visited once.
    fn descend(&mut self, start: &N, selectors: &[Selector], out: &mut Vec<N>) -> Result<(), EngineError> {
        let mut seen = HashSet::new();
        let mut stack = vec![start.clone()];
        while let Some(node) = stack.pop() {
            let container = node.kind().is_container();
            if container && !seen.insert(node.id()) {
                continue;
            }
            for selector in selectors {
                self.select(&node, selector, out)?;
            }
            if container {
                stack.extend(children(&node)?.into_iter().rev());
            }
        }
        Ok(())
    }

    fn select(&mut self, node: &N, selector: &Selector, out: &mut Vec<N>) -> Result<(), EngineError> {
        match selector {
            Selector::Name(name) => {
                if let Some(child) = node.get(name)? {
                    out.push(child);
                }
            }
            Selector::Index(index) => {
                if node.kind() == NodeKind::Array {
                    if let Some(i) = normalize_index(*index, node.size()?) {
                        out.push(node.value_at(i)?);
                    }
                }
            }
            Selector::Slice { start, end, step } => {
                if node.kind() == NodeKind::Array {
                    for i in slice_indices(*start, *end, *step, node.size()?) {
                        out.push(node.value_at(i)?);
                    }
                }
            }
            Selector::Wildcard => {
                if node.kind().is_container() {
                    out.extend(children(node)?);
                }
            }
            Selector::Filter(expr) => {
                if node.kind().is_container() {
                    for child in children(node)? {
                        if self.test(expr, &child)? {
                            out.push(child);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn origin(&self, origin: Origin, current: &N) -> N {
        match origin {
            Origin::Current => current.clone(),
            Origin::Root => self.root.clone(),
        }
    }

    fn test(&mut self, expr: &FilterExpression, current: &N) -> Result<bool, EngineError> {
        match expr {
            FilterExpression::Comparison { operator, left, right } => {
                let left = self.operand(left, current)?;
                let right = self.operand(right, current)?;
                Ok(compare(*operator, left.as_ref(), right.as_ref()))
            }
            FilterExpression::Logical { operator, left, right } => {
                let left = self.test(left, current)?;
                match operator {
                    LogicalOperator::And if !left => Ok(false),
                    LogicalOperator::Or if left => Ok(true),
                    _ => self.test(right, current),
                }
            }
            FilterExpression::Existence { origin, path } => {
                let start = self.origin(*origin, current);
                Ok(!self.eval_from(path, start)?.is_empty())
            }
            FilterExpression::Function { name, args } => Ok(match self.call(name, args, current)? {
                Some(Value::Bool(result)) => result,
                Some(_) => true,
                None => false,
            }),
            FilterExpression::Paren(expr) => self.test(expr, current),
            FilterExpression::Negation(expr) => Ok(!self.test(expr, current)?),
        }
    }

    /// Nodes selected by a path operand, `None` for anything else.
    fn nodes(&mut self, expr: &ValueExpression, current: &N) -> Result<Option<Vec<N>>, EngineError> {
        match expr {
            ValueExpression::Path { origin, path } => {
                let start = self.origin(*origin, current);
                self.eval_from(path, start).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Value of an operand. A path yields the value of its first match.
    fn operand(&mut self, expr: &ValueExpression, current: &N) -> Result<Option<Value>, EngineError> {
        match expr {
            ValueExpression::Literal(value) => Ok(Some(value.clone())),
            ValueExpression::Path { .. } => match self.nodes(expr, current)? {
                Some(nodes) => nodes.first().map(to_json).transpose(),
                None => Ok(None),
            },
            ValueExpression::Function { name, args } => self.call(name, args, current),
        }
    }

    fn call(&mut self, name: &str, args: &[ValueExpression], current: &N) -> Result<Option<Value>, EngineError> {
        match (name, args) {
            ("length", [arg]) => {
                if let Some(nodes) = self.nodes(arg, current)? {
                    return match nodes.first() {
                        Some(node) => node_length(node).map(|len| len.map(Value::from)),
                        None => Ok(None),
                    };
                }
                Ok(self.operand(arg, current)?.and_then(|value| value_length(&value)).map(Value::from))
            }
            ("count", [arg]) => Ok(self.nodes(arg, current)?.map(|nodes| Value::from(nodes.len()))),
            ("value", [arg]) => match self.nodes(arg, current)? {
                Some(nodes) if nodes.len() == 1 => to_json(&nodes[0]).map(Some),
                _ => Ok(None),
            },
            ("match" | "search", [subject, pattern]) => {
                let subject = self.operand(subject, current)?;
                let pattern = self.operand(pattern, current)?;
                let (Some(Value::String(subject)), Some(Value::String(pattern))) = (subject, pattern) else {
                    return Ok(Some(Value::Bool(false)));
                };
                let regex = self.regex(&pattern, name == "match")?;
                Ok(Some(Value::Bool(regex.is_match(&subject))))
            }
            _ => Err(ParseError::UnknownFunction(name.to_string()).into()),
        }
    }

    /// Compiled pattern, anchored on both ends when `full` is set.
    fn regex(&mut self, pattern: &str, full: bool) -> Result<&Regex, EngineError> {
        match self.patterns.entry((pattern.to_string(), full)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let source = if full { format!("^(?:{pattern})$") } else { pattern.to_string() };
                let regex = Regex::new(&source).map_err(|err| ParseError::InvalidRegex(err.to_string()))?;
                Ok(entry.insert(regex))
            }
        }
    }
}

fn node_length<N: Node>(node: &N) -> Result<Option<usize>, EngineError> {
    Ok(match node.kind() {
        NodeKind::String => Some(node.as_str()?.chars().count()),
        kind if kind.is_container() => Some(node.size()?),
        _ => None,
    })
}

fn value_length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

fn normalize_index(index: isize, len: usize) -> Option<usize> {
    let index = if index < 0 { len as isize + index } else { index };
    (0..len as isize).contains(&index).then_some(index as usize)
}

/// Indices selected by `[start:end:step]` on an array of `len` elements.
pub(crate) fn slice_indices(start: Option<isize>, end: Option<isize>, step: Option<isize>, len: usize) -> Vec<usize> {
    let step = step.unwrap_or(1);
    let len = len as isize;
    let normalize = |i: isize| if i < 0 { len + i } else { i };
    let mut indices = Vec::new();
    if step > 0 {
        let lower = start.map(normalize).unwrap_or(0).clamp(0, len);
        let upper = end.map(normalize).unwrap_or(len).clamp(0, len);
        let mut i = lower;
        while i < upper {
            indices.push(i as usize);
            i = match i.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }
    } else if step < 0 {
        let upper = start.map(normalize).unwrap_or(len - 1).clamp(-1, len - 1);
        let lower = end.map(normalize).unwrap_or(-len - 1).clamp(-1, len - 1);
        let mut i = upper;
        while lower < i {
            indices.push(i as usize);
            i = match i.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }
    }
    indices
}

fn compare(operator: ComparisonOperator, left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (None, None) => matches!(
            operator,
            ComparisonOperator::Equal | ComparisonOperator::LessEqual | ComparisonOperator::GreaterEqual
        ),
        (Some(l), Some(r)) => {
            let ord = compare_values(l, r);
            let equal = match (l, r) {
                (Value::Number(_), Value::Number(_)) => ord == Some(Ordering::Equal),
                _ => l == r,
            };
            match operator {
                ComparisonOperator::Equal => equal,
                ComparisonOperator::NotEqual => !equal,
                ComparisonOperator::Less => ord == Some(Ordering::Less),
                ComparisonOperator::LessEqual => equal || ord == Some(Ordering::Less),
                ComparisonOperator::Greater => ord == Some(Ordering::Greater),
                ComparisonOperator::GreaterEqual => equal || ord == Some(Ordering::Greater),
            }
        }
        _ => operator == ComparisonOperator::NotEqual,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn forward_slices() {
        assert_eq!(slice_indices(Some(1), Some(3), None, 5), [1, 2]);
        assert_eq!(slice_indices(None, None, Some(2), 5), [0, 2, 4]);
        assert_eq!(slice_indices(Some(-2), None, None, 5), [3, 4]);
        assert_eq!(slice_indices(Some(10), None, None, 5), Vec::<usize>::new());
    }

    #[test]
    fn huge_steps_stop_after_one_index() {
        assert_eq!(slice_indices(Some(1), None, Some(isize::MAX), 3), [1]);
        assert_eq!(slice_indices(Some(-1), None, Some(isize::MIN), 3), [2]);
    }

    #[test]
    fn backward_slices() {
        assert_eq!(slice_indices(None, None, Some(-1), 4), [3, 2, 1, 0]);
        assert_eq!(slice_indices(Some(3), Some(0), Some(-2), 5), [3, 1]);
        assert_eq!(slice_indices(Some(-1), Some(-3), Some(-1), 5), [4, 3]);
    }

    #[test]
    fn zero_step_selects_nothing() {
        assert!(slice_indices(None, None, Some(0), 5).is_empty());
    }

    #[test]
    fn negative_indices() {
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(-4, 3), None);
        assert_eq!(normalize_index(3, 3), None);
    }

    #[test]
    fn numeric_comparison_ignores_representation() {
        assert!(compare(ComparisonOperator::Equal, Some(&json!(1)), Some(&json!(1.0))));
        assert!(compare(ComparisonOperator::Less, Some(&json!(1)), Some(&json!(1.5))));
        assert!(!compare(ComparisonOperator::Less, Some(&json!("a")), Some(&json!(1))));
    }

    #[test]
    fn missing_operands() {
        assert!(compare(ComparisonOperator::Equal, None, None));
        assert!(!compare(ComparisonOperator::Equal, Some(&json!(null)), None));
        assert!(compare(ComparisonOperator::NotEqual, Some(&json!(1)), None));
    }
}
