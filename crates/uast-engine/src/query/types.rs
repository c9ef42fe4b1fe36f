//! Query AST.

use serde_json::Value;

/// A single selector inside a segment.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// `.name`, `['key']`
    Name(String),
    /// `[0]`, `[-1]`
    Index(isize),
    /// `[start:end:step]`
    Slice { start: Option<isize>, end: Option<isize>, step: Option<isize> },
    /// `.*`, `[*]`
    Wildcard,
    /// `[?(@.price < 10)]`
    Filter(FilterExpression),
}

/// One step of a path, holding one or more selectors.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSegment {
    pub selectors: Vec<Selector>,
    /// Descendant segment (`..`).
    pub recursive: bool,
}

impl PathSegment {
    pub fn new(selectors: Vec<Selector>, recursive: bool) -> Self {
        Self { selectors, recursive }
    }
}

/// A parsed query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryPath {
    pub segments: Vec<PathSegment>,
}

impl QueryPath {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }
}

/// Node a path inside a filter starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// `@`
    Current,
    /// `$`
    Root,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpression {
    Comparison {
        operator: ComparisonOperator,
        left: ValueExpression,
        right: ValueExpression,
    },
    Logical {
        operator: LogicalOperator,
        left: Box<FilterExpression>,
        right: Box<FilterExpression>,
    },
    /// `@.name` used as a test.
    Existence { origin: Origin, path: QueryPath },
    /// A function used as a test: `match(@.a, 'x.*')`.
    Function { name: String, args: Vec<ValueExpression> },
    Paren(Box<FilterExpression>),
    Negation(Box<FilterExpression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl ComparisonOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOperator::Equal => "==",
            ComparisonOperator::NotEqual => "!=",
            ComparisonOperator::Less => "<",
            ComparisonOperator::LessEqual => "<=",
            ComparisonOperator::Greater => ">",
            ComparisonOperator::GreaterEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

/// Operand of a comparison or function argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpression {
    Literal(Value),
    Path { origin: Origin, path: QueryPath },
    Function { name: String, args: Vec<ValueExpression> },
}

impl ValueExpression {
    pub fn current() -> Self {
        ValueExpression::Path { origin: Origin::Current, path: QueryPath::default() }
    }
}
