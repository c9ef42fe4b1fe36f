//! Query parser (JSONPath, RFC 9535 subset).

use serde_json::{Number, Value};
use thiserror::Error;

use super::types::*;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("expected root identifier '$' at start")]
    ExpectedRoot,
    #[error("unexpected character {0:?} at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("invalid escape sequence")]
    InvalidEscape,
    #[error("invalid number")]
    InvalidNumber,
    #[error("unclosed string")]
    UnclosedString,
    #[error("invalid selector at offset {0}")]
    InvalidSelector(usize),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("{name}() takes {expected} argument(s), got {found}")]
    ArgumentCount { name: String, expected: usize, found: usize },
    #[error("invalid regular expression: {0}")]
    InvalidRegex(String),
}

/// Known functions and their arity.
const FUNCTIONS: [(&str, usize); 5] = [("length", 1), ("count", 1), ("match", 2), ("search", 2), ("value", 1)];

struct ComparisonToken {
    operator: ComparisonOperator,
    len: usize,
}

/// Parses query strings into a [`QueryPath`].
pub struct QueryParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> QueryParser<'a> {
    pub fn parse(input: &'a str) -> Result<QueryPath, ParseError> {
        let mut parser = Self { input, pos: 0 };
        let path = parser.parse_path()?;
        parser.skip_whitespace();
        match parser.peek() {
            None => Ok(path),
            Some(c) => Err(ParseError::UnexpectedChar(c, parser.pos)),
        }
    }

    fn parse_path(&mut self) -> Result<QueryPath, ParseError> {
        self.skip_whitespace();
        if self.peek() != Some('$') {
            return Err(ParseError::ExpectedRoot);
        }
        self.advance();
        Ok(QueryPath::new(self.parse_segments(false)?))
    }

    /// Segments following `$` or `@`. Inside filters the walk stops at the
    /// first token that cannot continue a path.
    fn parse_segments(&mut self, in_filter: bool) -> Result<Vec<PathSegment>, ParseError> {
        let mut segments = Vec::new();
        loop {
            if in_filter {
                self.skip_whitespace();
            }
            match self.peek() {
                Some('.') => {
                    self.advance();
                    if self.peek() == Some('.') {
                        self.advance();
                        let selectors = self.parse_descendant_selectors()?;
                        segments.push(PathSegment::new(selectors, true));
                    } else if self.peek() == Some('*') {
                        self.advance();
                        segments.push(PathSegment::new(vec![Selector::Wildcard], false));
                    } else {
                        let name = self.parse_identifier()?;
                        segments.push(PathSegment::new(vec![Selector::Name(name)], false));
                    }
                }
                Some('[') => {
                    let selectors = self.parse_bracket_selectors()?;
                    segments.push(PathSegment::new(selectors, false));
                }
                _ => break,
            }
        }
        Ok(segments)
    }

    fn parse_descendant_selectors(&mut self) -> Result<Vec<Selector>, ParseError> {
        match self.peek() {
            Some('*') => {
                self.advance();
                Ok(vec![Selector::Wildcard])
            }
            Some('[') => self.parse_bracket_selectors(),
            _ => Ok(vec![Selector::Name(self.parse_identifier()?)]),
        }
    }

    fn parse_bracket_selectors(&mut self) -> Result<Vec<Selector>, ParseError> {
        self.expect('[')?;
        let mut selectors = Vec::new();
        loop {
            self.skip_whitespace();
            selectors.push(self.parse_bracket_selector()?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.advance(),
                Some(']') => {
                    self.advance();
                    return Ok(selectors);
                }
                Some(c) => return Err(ParseError::UnexpectedChar(c, self.pos)),
                None => return Err(ParseError::UnexpectedEnd),
            }
        }
    }

    fn parse_bracket_selector(&mut self) -> Result<Selector, ParseError> {
        match self.peek() {
            Some('\'') | Some('"') => Ok(Selector::Name(self.parse_string()?)),
            Some('*') => {
                self.advance();
                Ok(Selector::Wildcard)
            }
            Some(':') | Some('-') | Some('0'..='9') => self.parse_index_or_slice(),
            Some('?') => {
                self.advance();
                self.skip_whitespace();
                Ok(Selector::Filter(self.parse_filter_expression()?))
            }
            None => Err(ParseError::UnexpectedEnd),
            _ => Err(ParseError::InvalidSelector(self.pos)),
        }
    }

    fn parse_index_or_slice(&mut self) -> Result<Selector, ParseError> {
        let start = self.parse_optional_int()?;
        self.skip_whitespace();
        if self.peek() != Some(':') {
            return start.map(Selector::Index).ok_or(ParseError::InvalidSelector(self.pos));
        }
        self.advance();
        let end = self.parse_optional_int()?;
        self.skip_whitespace();
        let step = if self.peek() == Some(':') {
            self.advance();
            self.parse_optional_int()?
        } else {
            None
        };
        Ok(Selector::Slice { start, end, step })
    }

    fn parse_optional_int(&mut self) -> Result<Option<isize>, ParseError> {
        self.skip_whitespace();
        if matches!(self.peek(), Some('0'..='9') | Some('-')) {
            Ok(Some(self.parse_int()?))
        } else {
            Ok(None)
        }
    }

    fn parse_int(&mut self) -> Result<isize, ParseError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.advance();
        }
        while matches!(self.peek(), Some('0'..='9')) {
            self.advance();
        }
        self.input[start..self.pos].parse::<isize>().map_err(|_| ParseError::InvalidNumber)
    }

    /// Member-name shorthand. A leading `@` is accepted so that keys such as
    /// `@type` can be written without brackets.
    fn parse_identifier(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        if self.peek() == Some('@') {
            self.advance();
        }
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                self.advance();
            } else {
                break;
            }
        }
        if self.pos == start {
            return match self.peek() {
                Some(c) => Err(ParseError::UnexpectedChar(c, self.pos)),
                None => Err(ParseError::UnexpectedEnd),
            };
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_string(&mut self) -> Result<String, ParseError> {
        let Some(quote) = self.peek() else { return Err(ParseError::UnexpectedEnd) };
        self.advance();
        let mut result = String::new();
        loop {
            match self.peek() {
                None => return Err(ParseError::UnclosedString),
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(result);
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        Some('n') => result.push('\n'),
                        Some('t') => result.push('\t'),
                        Some('r') => result.push('\r'),
                        Some('/') => result.push('/'),
                        Some('\\') => result.push('\\'),
                        Some('\'') => result.push('\''),
                        Some('"') => result.push('"'),
                        _ => return Err(ParseError::InvalidEscape),
                    }
                    self.advance();
                }
                Some(c) => {
                    result.push(c);
                    self.advance();
                }
            }
        }
    }

    fn parse_filter_expression(&mut self) -> Result<FilterExpression, ParseError> {
        self.parse_logical_or()
    }

    fn parse_logical_or(&mut self) -> Result<FilterExpression, ParseError> {
        let mut left = self.parse_logical_and()?;
        self.skip_whitespace();
        while self.peek_str("||") {
            self.advance_by(2);
            let right = self.parse_logical_and()?;
            left = FilterExpression::Logical {
                operator: LogicalOperator::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
            self.skip_whitespace();
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<FilterExpression, ParseError> {
        let mut left = self.parse_unary()?;
        self.skip_whitespace();
        while self.peek_str("&&") {
            self.advance_by(2);
            let right = self.parse_unary()?;
            left = FilterExpression::Logical {
                operator: LogicalOperator::And,
                left: Box::new(left),
                right: Box::new(right),
            };
            self.skip_whitespace();
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<FilterExpression, ParseError> {
        self.skip_whitespace();
        if self.peek() == Some('!') && !self.peek_str("!=") {
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(FilterExpression::Negation(Box::new(expr)));
        }
        if self.peek() == Some('(') {
            self.advance();
            let expr = self.parse_filter_expression()?;
            self.skip_whitespace();
            self.expect(')')?;
            return Ok(FilterExpression::Paren(Box::new(expr)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<FilterExpression, ParseError> {
        let start = self.pos;
        let left = self.parse_value_expression()?;
        self.skip_whitespace();

        if let Some(op) = self.peek_comparison_operator() {
            self.advance_by(op.len);
            let right = self.parse_value_expression()?;
            return Ok(FilterExpression::Comparison { operator: op.operator, left, right });
        }

        match left {
            ValueExpression::Path { origin, path } => Ok(FilterExpression::Existence { origin, path }),
            ValueExpression::Function { name, args } => Ok(FilterExpression::Function { name, args }),
            ValueExpression::Literal(_) => Err(ParseError::InvalidSelector(start)),
        }
    }

    fn parse_value_expression(&mut self) -> Result<ValueExpression, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some('@') => {
                self.advance();
                let path = QueryPath::new(self.parse_segments(true)?);
                Ok(ValueExpression::Path { origin: Origin::Current, path })
            }
            Some('$') => {
                self.advance();
                let path = QueryPath::new(self.parse_segments(true)?);
                Ok(ValueExpression::Path { origin: Origin::Root, path })
            }
            Some('\'') | Some('"') => Ok(ValueExpression::Literal(Value::String(self.parse_string()?))),
            Some('0'..='9') | Some('-') => Ok(ValueExpression::Literal(self.parse_number()?)),
            _ if self.peek_keyword("true") => {
                self.advance_by(4);
                Ok(ValueExpression::Literal(Value::Bool(true)))
            }
            _ if self.peek_keyword("false") => {
                self.advance_by(5);
                Ok(ValueExpression::Literal(Value::Bool(false)))
            }
            _ if self.peek_keyword("null") => {
                self.advance_by(4);
                Ok(ValueExpression::Literal(Value::Null))
            }
            Some('a'..='z') => self.parse_function(),
            None => Err(ParseError::UnexpectedEnd),
            _ => Err(ParseError::InvalidSelector(self.pos)),
        }
    }

    fn parse_function(&mut self) -> Result<ValueExpression, ParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.advance();
        }
        let name = self.input[start..self.pos].to_string();
        let Some(&(_, arity)) = FUNCTIONS.iter().find(|(known, _)| *known == name) else {
            return Err(ParseError::UnknownFunction(name));
        };
        self.skip_whitespace();
        self.expect('(')?;
        let mut args = Vec::new();
        self.skip_whitespace();
        if self.peek() != Some(')') {
            loop {
                args.push(self.parse_value_expression()?);
                self.skip_whitespace();
                if self.peek() == Some(',') {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.skip_whitespace();
        self.expect(')')?;
        if args.len() != arity {
            return Err(ParseError::ArgumentCount { name, expected: arity, found: args.len() });
        }
        Ok(ValueExpression::Function { name, args })
    }

    fn parse_number(&mut self) -> Result<Value, ParseError> {
        let start = self.pos;
        let mut is_float = false;
        if self.peek() == Some('-') {
            self.advance();
        }
        if !matches!(self.peek(), Some('0'..='9')) {
            return Err(ParseError::InvalidNumber);
        }
        self.skip_digits();
        if self.peek() == Some('.') {
            is_float = true;
            self.advance();
            if !matches!(self.peek(), Some('0'..='9')) {
                return Err(ParseError::InvalidNumber);
            }
            self.skip_digits();
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            is_float = true;
            self.advance();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.advance();
            }
            if !matches!(self.peek(), Some('0'..='9')) {
                return Err(ParseError::InvalidNumber);
            }
            self.skip_digits();
        }

        let text = &self.input[start..self.pos];
        if !is_float {
            if let Ok(int) = text.parse::<i64>() {
                return Ok(Value::from(int));
            }
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or(ParseError::InvalidNumber)
    }

    fn skip_digits(&mut self) {
        while matches!(self.peek(), Some('0'..='9')) {
            self.advance();
        }
    }

    fn peek_comparison_operator(&self) -> Option<ComparisonToken> {
        let (operator, len) = if self.peek_str("==") {
            (ComparisonOperator::Equal, 2)
        } else if self.peek_str("!=") {
            (ComparisonOperator::NotEqual, 2)
        } else if self.peek_str("<=") {
            (ComparisonOperator::LessEqual, 2)
        } else if self.peek_str(">=") {
            (ComparisonOperator::GreaterEqual, 2)
        } else if self.peek_str("<") {
            (ComparisonOperator::Less, 1)
        } else if self.peek_str(">") {
            (ComparisonOperator::Greater, 1)
        } else {
            return None;
        };
        Some(ComparisonToken { operator, len })
    }

    /// `word` not followed by another identifier character.
    fn peek_keyword(&self, word: &str) -> bool {
        self.peek_str(word)
            && !matches!(self.input[self.pos + word.len()..].chars().next(),
                Some(c) if c.is_alphanumeric() || c == '_')
    }

    fn peek_str(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), ParseError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.advance();
                Ok(())
            }
            Some(c) => Err(ParseError::UnexpectedChar(c, self.pos)),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_only() {
        assert!(QueryParser::parse("$").unwrap().segments.is_empty());
    }

    #[test]
    fn dot_and_bracket_notation_agree() {
        assert_eq!(
            QueryParser::parse("$.store.books").unwrap(),
            QueryParser::parse("$['store']['books']").unwrap()
        );
    }

    #[test]
    fn at_prefixed_member_names() {
        let path = QueryParser::parse("$..@type").unwrap();
        assert_eq!(path.segments[0].selectors, [Selector::Name("@type".into())]);
        assert!(path.segments[0].recursive);
    }

    #[test]
    fn slices_and_unions() {
        let path = QueryParser::parse("$[0:2, 5, ::-1]").unwrap();
        assert_eq!(
            path.segments[0].selectors,
            [
                Selector::Slice { start: Some(0), end: Some(2), step: None },
                Selector::Index(5),
                Selector::Slice { start: None, end: None, step: Some(-1) },
            ]
        );
    }

    #[test]
    fn filter_with_and_without_parens() {
        for query in ["$[?(@.price < 10)]", "$[?@.price < 10]"] {
            let path = QueryParser::parse(query).unwrap();
            let Selector::Filter(expr) = &path.segments[0].selectors[0] else {
                panic!("expected filter in {query}");
            };
            let inner = match expr {
                FilterExpression::Paren(inner) => inner.as_ref(),
                other => other,
            };
            assert!(matches!(
                inner,
                FilterExpression::Comparison { operator: ComparisonOperator::Less, .. }
            ));
        }
    }

    #[test]
    fn filter_paths_remember_their_origin() {
        let path = QueryParser::parse("$[?($.limit > @.n)]").unwrap();
        let Selector::Filter(FilterExpression::Paren(expr)) = &path.segments[0].selectors[0] else {
            panic!("expected filter");
        };
        let FilterExpression::Comparison { left, right, .. } = expr.as_ref() else {
            panic!("expected comparison");
        };
        assert!(matches!(left, ValueExpression::Path { origin: Origin::Root, .. }));
        assert!(matches!(right, ValueExpression::Path { origin: Origin::Current, .. }));
    }

    #[test]
    fn integer_literals_stay_integers() {
        let path = QueryParser::parse("$[?(@.n == 3)]").unwrap();
        let Selector::Filter(FilterExpression::Paren(expr)) = &path.segments[0].selectors[0] else {
            panic!("expected filter");
        };
        let FilterExpression::Comparison { right, .. } = expr.as_ref() else {
            panic!("expected comparison");
        };
        assert_eq!(right, &ValueExpression::Literal(Value::from(3)));
    }

    #[test]
    fn malformed_queries() {
        for query in ["", "foo", "$.", "$..", "$[]", "$[", "$['a", "$.a?b", "$[?(@.a ==)]", "$[?nope(@)]"] {
            assert!(QueryParser::parse(query).is_err(), "{query:?} should not parse");
        }
    }

    #[test]
    fn unknown_function_is_named() {
        assert_eq!(
            QueryParser::parse("$[?frobnicate(@)]"),
            Err(ParseError::UnknownFunction("frobnicate".into()))
        );
        assert_eq!(
            QueryParser::parse("$[?length(@.a, 2)]"),
            Err(ParseError::ArgumentCount { name: "length".into(), expected: 1, found: 2 })
        );
    }
}
