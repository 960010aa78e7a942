//! Observability: structured logging via `tracing`.
//!
//! Level, format (json/text) and output (stdout/stderr/file) come from the
//! `logging` config section; `RUST_LOG` wins when set.

pub mod logging;
