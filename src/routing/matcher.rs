//! Per-request predicates over method, host, path, header and query.
//!
//! Every matcher is stateless after construction and safe to share across
//! requests; anything expensive (regex compilation, method uppercasing)
//! happens once when the matcher is built.

use http::{header, Request};
use regex::Regex;

/// Effective request host with any `:port` stripped.
///
/// Prefers the `Host` header, falling back to the request URI authority
/// (the form CONNECT and absolute-URI requests arrive in).
pub fn request_host<B>(req: &Request<B>) -> Option<&str> {
    raw_host(req).map(strip_port)
}

/// Request host as sent, port included.
pub fn raw_host<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))
}

/// Strip a trailing `:port` from an authority, keeping IPv6 bracket
/// literals intact ("[::1]:8080" → "[::1]").
pub fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        }
    } else {
        match host.rfind(':') {
            Some(idx) if host[idx + 1..].bytes().all(|b| b.is_ascii_digit()) => &host[..idx],
            _ => host,
        }
    }
}

/// Matches the effective host against a pattern.
///
/// A pattern starting with `*.` matches the bare domain and any subdomain
/// of it. Comparison is byte-exact and case-sensitive as configured;
/// patterns are expected in lowercase.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    pattern: String,
}

impl HostMatcher {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub fn matches<B>(&self, req: &Request<B>) -> bool {
        let Some(host) = request_host(req) else {
            return false;
        };

        if self.pattern == host {
            return true;
        }

        if let Some(domain) = self.pattern.strip_prefix("*.") {
            return host == domain || host.ends_with(&format!(".{}", domain));
        }

        false
    }
}

/// Matches the request path exactly. No normalization.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    path: String,
}

impl PathMatcher {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn matches<B>(&self, req: &Request<B>) -> bool {
        req.uri().path() == self.path
    }
}

/// Matches when the request path starts with the prefix. No trailing-slash
/// normalization.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn matches<B>(&self, req: &Request<B>) -> bool {
        req.uri().path().starts_with(&self.prefix)
    }
}

/// Matches the request method against a set, case-insensitively.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    methods: Vec<String>,
}

impl MethodMatcher {
    /// Methods are uppercased once here rather than per request.
    pub fn new<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            methods: methods
                .into_iter()
                .map(|m| m.as_ref().trim().to_ascii_uppercase())
                .collect(),
        }
    }

    pub fn matches<B>(&self, req: &Request<B>) -> bool {
        let method = req.method().as_str().to_ascii_uppercase();
        self.methods.iter().any(|m| *m == method)
    }
}

/// Matches the first value of a header for exact equality. Header name
/// lookup is case-insensitive per HTTP semantics.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    key: String,
    value: String,
}

impl HeaderMatcher {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn matches<B>(&self, req: &Request<B>) -> bool {
        req.headers()
            .get(self.key.as_str())
            .and_then(|v| v.to_str().ok())
            .map(|v| v == self.value)
            .unwrap_or(false)
    }
}

/// Matches the first value of a header against a pre-compiled regex.
///
/// An absent or empty value never matches; otherwise the regex searches
/// anywhere in the value (substring semantics, not anchored).
#[derive(Debug, Clone)]
pub struct HeaderRegexMatcher {
    key: String,
    pattern: Regex,
}

impl HeaderRegexMatcher {
    pub fn new(key: impl Into<String>, pattern: Regex) -> Self {
        Self {
            key: key.into(),
            pattern,
        }
    }

    pub fn matches<B>(&self, req: &Request<B>) -> bool {
        match req.headers().get(self.key.as_str()).and_then(|v| v.to_str().ok()) {
            Some("") | None => false,
            Some(value) => self.pattern.is_match(value),
        }
    }
}

/// Matches the first value of a query parameter for exact equality.
#[derive(Debug, Clone)]
pub struct QueryMatcher {
    key: String,
    value: String,
}

impl QueryMatcher {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn matches<B>(&self, req: &Request<B>) -> bool {
        let Some(query) = req.uri().query() else {
            return false;
        };
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == self.key.as_str())
            .map(|(_, v)| v == self.value)
            .unwrap_or(false)
    }
}
