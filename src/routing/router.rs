//! Routing table construction, lookup and hot swap.
//!
//! A table is an ordered list of compiled routes with first-match
//! semantics; order is services as configured, nodes within each service.
//! `SharedRouter` publishes tables through an atomic pointer swap: readers
//! snapshot once at dispatch entry and hold that generation for the whole
//! request, so a concurrent replace can never expose a mixed state.

use std::sync::Arc;

use arc_swap::ArcSwap;
use http::Request;
use tracing::{debug, info};

use crate::config::schema::Service;
use crate::routing::matcher::{raw_host, HostMatcher};
use crate::routing::parser::{parse_rule, ParseError};
use crate::routing::rule::Rule;

/// A compiled node: predicate tree plus forwarding destination.
///
/// Immutable after construction; its lifetime is bounded by the table
/// generation that contains it.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub rule: Rule,
    pub addr: String,
    pub proxy: Option<String>,
}

/// Error building a table from configured services.
#[derive(Debug)]
pub enum TableError {
    /// The node's rule expression failed to parse.
    Rule { node: String, source: ParseError },
    /// The node carries neither a filter nor a matcher.
    MissingRule { node: String },
}

impl std::fmt::Display for TableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableError::Rule { node, source } => {
                write!(f, "failed to build route for node {}: {}", node, source)
            }
            TableError::MissingRule { node } => {
                write!(f, "node {} must have either filter or matcher", node)
            }
        }
    }
}

impl std::error::Error for TableError {}

/// Ordered, immutable sequence of routes.
#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: Vec<Route>,
}

impl RoutingTable {
    /// Compile services into a table, walking services and nodes in
    /// configuration order. The first failure aborts the whole build;
    /// partial tables are never produced.
    pub fn build(services: &[Service]) -> Result<Self, TableError> {
        let mut routes = Vec::new();

        for service in services {
            for node in &service.forwarder.nodes {
                let rule = match (&node.filter, &node.matcher) {
                    (Some(filter), _) => Rule::Host(HostMatcher::new(filter.host.clone())),
                    (None, Some(matcher)) => {
                        parse_rule(&matcher.rule).map_err(|source| TableError::Rule {
                            node: node.name.clone(),
                            source,
                        })?
                    }
                    (None, None) => {
                        return Err(TableError::MissingRule {
                            node: node.name.clone(),
                        })
                    }
                };

                routes.push(Route {
                    name: node.name.clone(),
                    rule,
                    addr: node.addr.clone(),
                    proxy: node.proxy.clone(),
                });
            }
        }

        Ok(Self { routes })
    }

    /// First route whose predicate matches the request, or `None`.
    pub fn matches<B>(&self, req: &Request<B>) -> Option<&Route> {
        let found = self.routes.iter().find(|route| route.rule.matches(req));

        match found {
            Some(route) => debug!(
                route = %route.name,
                host = raw_host(req).unwrap_or(""),
                path = req.uri().path(),
                "route matched"
            ),
            None => debug!(
                host = raw_host(req).unwrap_or(""),
                path = req.uri().path(),
                "no route matched"
            ),
        }

        found
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Atomically swappable handle to the active routing table.
///
/// Reads are lock-free; writers serialize externally (the config watcher
/// applies reloads one at a time).
pub struct SharedRouter {
    table: ArcSwap<RoutingTable>,
}

impl SharedRouter {
    pub fn new(table: RoutingTable) -> Self {
        info!(count = table.len(), "routes updated");
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    /// Capture the current table. Callers hold the snapshot for the life
    /// of one request.
    pub fn snapshot(&self) -> Arc<RoutingTable> {
        self.table.load_full()
    }

    /// Publish a new table. Concurrent readers observe either the old or
    /// the new generation, never a mix.
    pub fn replace(&self, table: RoutingTable) {
        info!(count = table.len(), "routes updated");
        self.table.store(Arc::new(table));
    }
}
