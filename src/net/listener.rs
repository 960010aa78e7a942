//! TCP listener binding.

use std::net::SocketAddr;

use tokio::net::TcpListener;

/// Failure to bind a configured address. Always fatal at startup.
#[derive(Debug)]
pub struct BindError {
    pub addr: String,
    pub source: std::io::Error,
}

impl std::fmt::Display for BindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to bind {}: {}", self.addr, self.source)
    }
}

impl std::error::Error for BindError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Bind a TCP listener on a configured address.
///
/// Accepts the leading-colon shorthand (":22222") for all interfaces.
pub async fn bind(addr: &str) -> Result<TcpListener, BindError> {
    let normalized = normalize_addr(addr);

    let socket_addr: SocketAddr = normalized.parse().map_err(|e| BindError {
        addr: addr.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
    })?;

    let listener = TcpListener::bind(socket_addr).await.map_err(|e| BindError {
        addr: addr.to_string(),
        source: e,
    })?;

    let local = listener.local_addr().map_err(|e| BindError {
        addr: addr.to_string(),
        source: e,
    })?;
    tracing::info!(addr = %local, "listener bound");

    Ok(listener)
}

fn normalize_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{}", port)
    } else {
        addr.to_string()
    }
}
