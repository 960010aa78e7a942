//! The rule predicate tree.
//!
//! Leaves wrap the concrete matchers; interior nodes combine them with
//! boolean logic. Trees are immutable after parsing and cheap to clone
//! (compiled regexes are reference-counted), so routes can hand copies to
//! long-lived relay tasks.

use http::Request;

use crate::routing::matcher::{
    HeaderMatcher, HeaderRegexMatcher, HostMatcher, MethodMatcher, PathMatcher,
    PathPrefixMatcher, QueryMatcher,
};

/// A parsed rule expression, evaluated per request.
#[derive(Debug, Clone)]
pub enum Rule {
    Host(HostMatcher),
    Path(PathMatcher),
    PathPrefix(PathPrefixMatcher),
    Method(MethodMatcher),
    Header(HeaderMatcher),
    HeaderRegex(HeaderRegexMatcher),
    Query(QueryMatcher),
    And(Box<Rule>, Box<Rule>),
    Or(Box<Rule>, Box<Rule>),
    Not(Box<Rule>),
}

impl Rule {
    /// Evaluate the tree against a request. Matchers are pure, so the
    /// short-circuiting order of `&&`/`||` is unobservable.
    pub fn matches<B>(&self, req: &Request<B>) -> bool {
        match self {
            Rule::Host(m) => m.matches(req),
            Rule::Path(m) => m.matches(req),
            Rule::PathPrefix(m) => m.matches(req),
            Rule::Method(m) => m.matches(req),
            Rule::Header(m) => m.matches(req),
            Rule::HeaderRegex(m) => m.matches(req),
            Rule::Query(m) => m.matches(req),
            Rule::And(left, right) => left.matches(req) && right.matches(req),
            Rule::Or(left, right) => left.matches(req) || right.matches(req),
            Rule::Not(inner) => !inner.matches(req),
        }
    }
}
