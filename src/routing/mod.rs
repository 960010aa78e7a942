//! Request routing subsystem.
//!
//! # Data Flow
//! ```text
//! node config (filter.host | matcher.rule)
//!     → parser.rs (rule language → predicate tree)
//!     → router.rs (ordered table, first-match lookup)
//!     → SharedRouter (atomic publish, per-request snapshot)
//!
//! matcher.rs holds the leaf predicates the tree evaluates.
//! ```

pub mod matcher;
pub mod parser;
pub mod router;
pub mod rule;

pub use parser::{parse_rule, ParseError};
pub use router::{Route, RoutingTable, SharedRouter, TableError};
pub use rule::Rule;
