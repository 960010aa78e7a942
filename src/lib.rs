//! Routing-aware forwarding proxy.
//!
//! Accepts client HTTP, HTTPS-CONNECT and WebSocket traffic, selects a
//! backend node by evaluating a rule expression against each request, and
//! relays the traffic — optionally chaining through an upstream HTTP proxy
//! so an external inspector can observe the flows.
//!
//! ```text
//!                 ┌─────────────────────────────────────────────┐
//!                 │                  FORWARDER                   │
//!                 │                                              │
//!   Client ───────┼─▶ net/listener ─▶ http/server ─▶ routing ───┼──▶ Backend
//!                 │                       │         (rule tree,  │   (direct or
//!                 │                       │          hot swap)   │    via proxy)
//!                 │                       ▼                      │
//!                 │              ┌─────────────────┐             │
//!                 │              │ http/forwarder  │ plain HTTP  │
//!                 │              │ http/connect    │ CONNECT     │
//!                 │              │ http/websocket  │ WS bridge   │
//!                 │              └─────────────────┘             │
//!                 │                                              │
//!                 │  config (YAML + file watcher)                │
//!                 │  lifecycle (signals, shutdown)               │
//!                 │  observability (tracing)                     │
//!                 └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::schema::Config;
pub use http::server::Server;
pub use lifecycle::shutdown::Shutdown;
