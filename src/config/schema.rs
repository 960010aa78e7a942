//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from the YAML
//! configuration file. Defaults mirror what the loader applies, so a
//! minimal config only needs `services`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the forwarder.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Global server settings (bind address, connection timeouts).
    pub server: ServerConfig,

    /// Logging settings.
    pub logging: LoggingConfig,

    /// Upstream proxy URL applied to every node without an explicit `proxy`.
    pub default_proxy: Option<String>,

    /// Service definitions, each carrying its forwarding nodes.
    pub services: Vec<Service>,
}

/// Global server settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address. A leading-colon form (e.g. ":22222") binds all
    /// interfaces.
    pub addr: String,

    /// Request header read timeout in seconds.
    pub read_timeout: u64,

    /// Response write timeout in seconds.
    pub write_timeout: u64,

    /// Keep-alive idle timeout in seconds.
    pub idle_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: ":22222".to_string(),
            read_timeout: 30,
            write_timeout: 30,
            idle_timeout: 120,
        }
    }
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: debug, info, warn or error.
    pub level: String,

    /// Output format: json or text.
    pub format: String,

    /// Output destination: stdout, stderr, or a file path.
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
            output: "stdout".to_string(),
        }
    }
}

/// A service: one listener address and an ordered list of forwarding nodes.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct Service {
    pub name: String,

    /// Listener address; falls back to `server.addr` when omitted.
    pub addr: Option<String>,

    pub handler: HandlerConfig,

    pub listener: ListenerSpec,

    pub forwarder: ForwarderConfig,
}

/// Handler type for a service.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct HandlerConfig {
    /// "http" or "tcp". Defaulted to "http" by the loader.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Listener type for a service. Only "tcp" is supported.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ListenerSpec {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Forwarding configuration: the ordered node list.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ForwarderConfig {
    pub nodes: Vec<Node>,
}

/// A forwarding destination with its routing rule.
///
/// Exactly one of `filter` and `matcher` must be present: `filter` is a
/// bare host pattern, `matcher` a full rule expression.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct Node {
    pub name: String,

    /// Backend address, `host:port`.
    pub addr: String,

    pub filter: Option<Filter>,

    pub matcher: Option<Matcher>,

    /// Upstream HTTP proxy URL for this node's traffic.
    pub proxy: Option<String>,
}

/// Simple host-based filtering.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct Filter {
    pub host: String,
}

/// Rule-expression matching.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct Matcher {
    pub rule: String,
}
