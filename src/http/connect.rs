//! HTTPS CONNECT tunneling.
//!
//! A matched CONNECT request gets a TCP connection to the target — direct,
//! or through the node's upstream proxy via a nested CONNECT — then the
//! client connection is taken over and bytes are spliced both ways until
//! either direction finishes.

use std::io;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use hyper::ext::ReasonPhrase;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::http::response;
use crate::lifecycle::ShutdownSignal;
use crate::routing::matcher::raw_host;
use crate::routing::{Route, RoutingTable};

const DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on the proxy's CONNECT response head.
const MAX_PROXY_RESPONSE: usize = 8192;

/// Handle a CONNECT request against the captured routing table.
///
/// Everything that can fail is tried before the connection is taken over,
/// so failures still produce ordinary HTTP responses; afterwards errors
/// can only be logged. A live tunnel also ends when `signal` fires.
pub async fn handle(
    table: &RoutingTable,
    req: Request<Body>,
    mut signal: ShutdownSignal,
) -> Response<Body> {
    let host = raw_host(&req).unwrap_or_default().to_string();

    let Some(route) = table.matches(&req) else {
        warn!(host = %host, "no matching route for CONNECT");
        return response::text_error(StatusCode::BAD_GATEWAY, "No matching route found");
    };
    let route = route.clone();

    debug!(host = %host, node = %route.name, "handling CONNECT request");

    if req.extensions().get::<OnUpgrade>().is_none() {
        error!("client connection does not support hijacking");
        return response::text_error(StatusCode::INTERNAL_SERVER_ERROR, "Hijacking not supported");
    }

    let target = match open_target(&route).await {
        Ok(stream) => stream,
        Err(err) => {
            error!(error = %err, host = %host, node = %route.name, "failed to connect to target");
            return response::text_error(StatusCode::BAD_GATEWAY, "Failed to connect to target");
        }
    };

    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                info!(host = %host, node = %route.name, "CONNECT tunnel established");
                tokio::select! {
                    _ = tunnel(TokioIo::new(upgraded), target) => {}
                    _ = signal.recv() => debug!("shutdown, closing tunnel"),
                }
                debug!(host = %host, node = %route.name, "CONNECT tunnel closed");
            }
            Err(err) => error!(error = %err, "failed to take over client connection"),
        }
    });

    connection_established()
}

/// `HTTP/1.1 200 Connection Established` with the literal reason phrase.
fn connection_established() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    response
        .extensions_mut()
        .insert(ReasonPhrase::from_static(b"Connection Established"));
    response
}

async fn open_target(route: &Route) -> io::Result<TcpStream> {
    match &route.proxy {
        Some(proxy) => connect_through_proxy(proxy, &route.addr).await,
        None => timeout(DIAL_TIMEOUT, TcpStream::connect(route.addr.as_str()))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))?,
    }
}

/// Splice bytes both ways; the first direction to finish (EOF or error)
/// tears the other down by dropping its halves.
async fn tunnel<C>(client: C, target: TcpStream)
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut target_read, mut target_write) = target.into_split();

    let result = tokio::select! {
        res = tokio::io::copy(&mut client_read, &mut target_write) => res,
        res = tokio::io::copy(&mut target_read, &mut client_write) => res,
    };

    if let Err(err) = result {
        debug!(error = %err, "tunnel copy error");
    }
}

/// Open a tunnel to `target` through an upstream HTTP proxy.
///
/// Sends `CONNECT target HTTP/1.1` and requires the proxy to answer with
/// status exactly 200; anything else closes the connection and fails.
pub(crate) async fn connect_through_proxy(proxy_url: &str, target: &str) -> io::Result<TcpStream> {
    let url = url::Url::parse(proxy_url).map_err(|e| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("invalid proxy URL: {}", e))
    })?;
    let host = url
        .host_str()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "proxy URL missing host"))?;
    let port = url.port_or_known_default().unwrap_or(80);

    let mut stream = timeout(DIAL_TIMEOUT, TcpStream::connect((host, port)))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "proxy connect timed out"))??;

    let connect = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n");
    stream.write_all(connect.as_bytes()).await?;

    let status = read_proxy_status(&mut stream).await?;
    if status != 200 {
        return Err(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            format!("proxy returned non-200 response: {}", status),
        ));
    }

    Ok(stream)
}

/// Read the proxy's response head and parse the status-line code.
async fn read_proxy_status(stream: &mut TcpStream) -> io::Result<u16> {
    let mut head = Vec::with_capacity(256);
    let mut chunk = [0u8; 256];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "proxy closed connection during CONNECT",
            ));
        }
        head.extend_from_slice(&chunk[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if head.len() > MAX_PROXY_RESPONSE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "proxy response head too large",
            ));
        }
    }

    let head = String::from_utf8_lossy(&head);
    let status_line = head.lines().next().unwrap_or_default();
    status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed proxy response: {}", status_line),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// One-shot proxy stub: asserts the CONNECT head and answers with the
    /// given status line.
    async fn proxy_stub(response: &'static str) -> (std::net::SocketAddr, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut chunk = [0u8; 256];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                head.extend_from_slice(&chunk[..n]);
                if head.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            // Hold the socket open until the client is done with it.
            let _ = socket.read(&mut chunk).await;
            String::from_utf8(head).unwrap()
        });

        (addr, handle)
    }

    #[tokio::test]
    async fn proxy_connect_sends_target_and_accepts_200() {
        let (addr, handle) = proxy_stub("HTTP/1.1 200 Connection Established\r\n\r\n").await;

        let stream =
            connect_through_proxy(&format!("http://{}", addr), "api.example.com:443").await;
        assert!(stream.is_ok());
        drop(stream);

        let head = handle.await.unwrap();
        assert!(head.starts_with("CONNECT api.example.com:443 HTTP/1.1\r\n"));
        assert!(head.contains("Host: api.example.com:443\r\n"));
    }

    #[tokio::test]
    async fn proxy_connect_rejects_non_200() {
        let (addr, handle) = proxy_stub("HTTP/1.1 403 Forbidden\r\n\r\n").await;

        let err = connect_through_proxy(&format!("http://{}", addr), "api.example.com:443")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("non-200"));
        handle.abort();
    }

    #[tokio::test]
    async fn invalid_proxy_url_fails_fast() {
        let err = connect_through_proxy("not a url", "x:1").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
