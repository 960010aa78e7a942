//! Process lifecycle: shutdown coordination and OS signals.
//!
//! Startup order is config → logging → server → watcher; shutdown is
//! signal → stop accepting → drain (bounded) → exit.

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
