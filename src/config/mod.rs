//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (YAML)
//!     → loader.rs (parse, apply defaults)
//!     → validation.rs (semantic checks)
//!     → Config (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects write/create
//!     → loader.rs loads + validates
//!     → on_change callback rebuilds the routing table
//!     → failure keeps the previous configuration
//! ```

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::Config;
pub use watcher::ConfigWatcher;
