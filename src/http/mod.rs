//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper http1 + upgrades, classify request)
//!         CONNECT            → connect.rs (hijack + byte splice)
//!         WebSocket upgrade  → websocket.rs (message bridge)
//!         otherwise          → forwarder.rs (pooled reverse proxy)
//!     → response.rs (JSON / plain-text error bodies)
//! ```

pub mod connect;
pub mod forwarder;
pub mod response;
pub mod server;
pub mod websocket;

pub use forwarder::{ForwardError, Forwarder};
pub use server::{AppState, Server};
