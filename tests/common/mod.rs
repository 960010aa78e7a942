//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use forwarder::config::loader::apply_defaults;
use forwarder::config::schema::{Config, Filter, ForwarderConfig, Matcher, Node, Service};
use forwarder::http::Server;
use forwarder::lifecycle::Shutdown;

/// Start a mock HTTP backend that records each request head and returns a
/// fixed body with an `X-Backend` response header.
pub async fn start_http_backend(
    body: &'static str,
) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let _ = tx.send(head);

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nX-Backend: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body,
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, rx)
}

/// Start a raw TCP echo backend.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                while let Ok(n) = socket.read(&mut buf).await {
                    if n == 0 || socket.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    addr
}

/// Start a minimal CONNECT proxy: answers 200 and splices to the target.
/// Each handled CONNECT line is reported on the returned channel.
pub async fn start_connect_proxy() -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let request_line = head.lines().next().unwrap_or_default().to_string();
                let target = request_line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or_default()
                    .to_string();
                let _ = tx.send(request_line);

                let Ok(mut upstream) = TcpStream::connect(&target).await else {
                    let _ = socket
                        .write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n")
                        .await;
                    return;
                };
                let _ = socket
                    .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
                    .await;
                let _ = tokio::io::copy_bidirectional(&mut socket, &mut upstream).await;
            });
        }
    });

    (addr, rx)
}

/// Start a WebSocket backend that echoes text and binary frames.
pub async fn start_ws_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() || msg.is_binary() {
                        if ws.send(msg).await.is_err() {
                            break;
                        }
                    } else if msg.is_close() {
                        break;
                    }
                }
            });
        }
    });

    addr
}

/// Build a single-service config with the given nodes, defaulted the same
/// way the loader defaults a parsed file.
pub fn proxy_config(nodes: Vec<Node>) -> Config {
    let mut config = Config {
        services: vec![Service {
            name: "test".into(),
            forwarder: ForwarderConfig { nodes },
            ..Default::default()
        }],
        ..Default::default()
    };
    config.server.addr = "127.0.0.1:0".into();
    apply_defaults(&mut config);
    config
}

pub fn filter_node(name: &str, addr: SocketAddr, host: &str) -> Node {
    Node {
        name: name.into(),
        addr: addr.to_string(),
        filter: Some(Filter { host: host.into() }),
        ..Default::default()
    }
}

pub fn matcher_node(name: &str, addr: SocketAddr, rule: &str) -> Node {
    Node {
        name: name.into(),
        addr: addr.to_string(),
        matcher: Some(Matcher { rule: rule.into() }),
        ..Default::default()
    }
}

/// Boot a proxy server on an ephemeral port.
pub async fn start_proxy(config: Config) -> (SocketAddr, ProxyHandle) {
    let server = Server::new(config).unwrap();
    let router = server.router();
    let listeners = server.bind().await.unwrap();
    let addr = listeners[0].local_addr().unwrap();

    let shutdown = Arc::new(Shutdown::new());
    let handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            server
                .serve(listeners, shutdown, Duration::from_secs(5))
                .await;
        })
    };

    (
        addr,
        ProxyHandle {
            shutdown,
            handle,
            router,
        },
    )
}

/// Handle to a running test proxy.
pub struct ProxyHandle {
    pub shutdown: Arc<Shutdown>,
    pub handle: tokio::task::JoinHandle<()>,
    pub router: Arc<forwarder::routing::SharedRouter>,
}

impl ProxyHandle {
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = self.handle.await;
    }
}

async fn read_head(socket: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut chunk = [0u8; 512];
    loop {
        let Ok(n) = socket.read(&mut chunk).await else {
            break;
        };
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}
