//! Recursive-descent parser for the rule language.
//!
//! Grammar, lowest to highest precedence:
//!
//! ```text
//! Or      := And ("||" And)*
//! And     := Unary ("&&" Unary)*
//! Unary   := "!" Unary | "(" Or ")" | Matcher
//! Matcher := Name "{" Value "}"
//! ```
//!
//! `Value` runs to the matching close brace; nested braces are accepted as
//! long as they balance, so regex payloads like `HeaderRegex{UA=a{2,3}}`
//! parse. Whitespace between tokens is ignored.

use regex::Regex;

use crate::routing::matcher::{
    HeaderMatcher, HeaderRegexMatcher, HostMatcher, MethodMatcher, PathMatcher,
    PathPrefixMatcher, QueryMatcher,
};
use crate::routing::rule::Rule;

/// A parse failure with the byte offset it occurred at.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub pos: usize,
    pub message: String,
}

impl ParseError {
    fn new(pos: usize, message: impl Into<String>) -> Self {
        Self {
            pos,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at position {}", self.message, self.pos)
    }
}

impl std::error::Error for ParseError {}

/// Parse a rule string into a predicate tree.
pub fn parse_rule(input: &str) -> Result<Rule, ParseError> {
    let mut parser = Parser {
        input: input.trim(),
        pos: 0,
    };
    let rule = parser.parse_or()?;

    parser.skip_whitespace();
    if parser.pos < parser.input.len() {
        return Err(ParseError::new(parser.pos, "unexpected input"));
    }

    Ok(rule)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn parse_or(&mut self) -> Result<Rule, ParseError> {
        let mut left = self.parse_and()?;

        loop {
            self.skip_whitespace();
            if !self.match_str("||") {
                break;
            }
            self.pos += 2;
            self.skip_whitespace();

            let right = self.parse_and()?;
            left = Rule::Or(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Rule, ParseError> {
        let mut left = self.parse_unary()?;

        loop {
            self.skip_whitespace();
            if !self.match_str("&&") {
                break;
            }
            self.pos += 2;
            self.skip_whitespace();

            let right = self.parse_unary()?;
            left = Rule::And(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Rule, ParseError> {
        self.skip_whitespace();

        if self.match_byte(b'!') {
            self.pos += 1;
            self.skip_whitespace();
            let inner = self.parse_unary()?;
            return Ok(Rule::Not(Box::new(inner)));
        }

        if self.match_byte(b'(') {
            self.pos += 1;
            self.skip_whitespace();
            let rule = self.parse_or()?;
            self.skip_whitespace();
            if !self.match_byte(b')') {
                return Err(ParseError::new(self.pos, "expected ')'"));
            }
            self.pos += 1;
            return Ok(rule);
        }

        self.parse_matcher()
    }

    fn parse_matcher(&mut self) -> Result<Rule, ParseError> {
        self.skip_whitespace();

        let name_start = self.pos;
        while self.pos < self.input.len()
            && !matches!(self.byte(), b'{' | b' ' | b'\t' | b'\n' | b'\r')
        {
            self.pos += 1;
        }
        if name_start == self.pos {
            return Err(ParseError::new(self.pos, "expected matcher name"));
        }
        let name = &self.input[name_start..self.pos];

        self.skip_whitespace();
        if !self.match_byte(b'{') {
            return Err(ParseError::new(self.pos, "expected '{' after matcher name"));
        }
        self.pos += 1;

        // Track brace depth so balanced braces inside the value survive.
        let value_start = self.pos;
        let mut depth = 1usize;
        while self.pos < self.input.len() && depth > 0 {
            match self.byte() {
                b'{' => depth += 1,
                b'}' => depth -= 1,
                _ => {}
            }
            if depth > 0 {
                self.pos += 1;
            }
        }
        if depth != 0 {
            return Err(ParseError::new(self.pos, "unmatched braces"));
        }
        let value = &self.input[value_start..self.pos];
        self.pos += 1; // closing brace

        build_matcher(name, value, value_start)
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len()
            && matches!(self.byte(), b' ' | b'\t' | b'\n' | b'\r')
        {
            self.pos += 1;
        }
    }

    fn byte(&self) -> u8 {
        self.input.as_bytes()[self.pos]
    }

    fn match_byte(&self, b: u8) -> bool {
        self.pos < self.input.len() && self.byte() == b
    }

    fn match_str(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }
}

fn build_matcher(name: &str, value: &str, value_pos: usize) -> Result<Rule, ParseError> {
    match name {
        "Host" => Ok(Rule::Host(HostMatcher::new(value))),
        "Path" => Ok(Rule::Path(PathMatcher::new(value))),
        "PathPrefix" => Ok(Rule::PathPrefix(PathPrefixMatcher::new(value))),
        "Method" => Ok(Rule::Method(MethodMatcher::new(value.split(',')))),
        "Header" => {
            let (key, val) = split_key_value(value, value_pos, "Header", "Key=Value")?;
            Ok(Rule::Header(HeaderMatcher::new(key, val)))
        }
        "HeaderRegex" => {
            let (key, pattern) = split_key_value(value, value_pos, "HeaderRegex", "Key=Pattern")?;
            let regex = Regex::new(pattern).map_err(|e| {
                ParseError::new(value_pos, format!("invalid regex pattern: {}", e))
            })?;
            Ok(Rule::HeaderRegex(HeaderRegexMatcher::new(key, regex)))
        }
        "Query" => {
            let (key, val) = split_key_value(value, value_pos, "Query", "Key=Value")?;
            Ok(Rule::Query(QueryMatcher::new(key, val)))
        }
        other => Err(ParseError::new(
            value_pos,
            format!("unknown matcher: {}", other),
        )),
    }
}

fn split_key_value<'a>(
    value: &'a str,
    pos: usize,
    matcher: &str,
    expected: &str,
) -> Result<(&'a str, &'a str), ParseError> {
    match value.split_once('=') {
        Some((key, val)) => Ok((key.trim(), val.trim())),
        None => Err(ParseError::new(
            pos,
            format!("invalid {} matcher format, expected {}", matcher, expected),
        )),
    }
}
