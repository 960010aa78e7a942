//! WebSocket bridging.
//!
//! Upgrades the client, dials the backend (through the node's proxy when
//! configured) with the client's headers, and copies messages both ways
//! preserving frame types. One message in flight per direction; the first
//! failed read or write closes both sockets.

use std::time::Duration;

use axum::body::Body;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::http::{header, HeaderMap, HeaderName, Request, Response, StatusCode};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message as TgMessage};
use tracing::{debug, error, info, warn};

use crate::http::connect::connect_through_proxy;
use crate::http::response;
use crate::lifecycle::ShutdownSignal;
use crate::routing::matcher::raw_host;
use crate::routing::{Route, RoutingTable};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// True when the request asks for a WebSocket upgrade
/// (`Upgrade: websocket` plus an `upgrade` token in `Connection`,
/// case-insensitive).
pub fn is_upgrade(headers: &HeaderMap) -> bool {
    let upgrade = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    let connection = headers
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|token| token.trim().eq_ignore_ascii_case("upgrade")))
        .unwrap_or(false);

    upgrade && connection
}

/// Handle a WebSocket upgrade against the captured routing table.
///
/// The client is upgraded first (any origin accepted); backend dial
/// failures after that point can only be logged, mirroring the hijack
/// rules of the CONNECT path. A live bridge also ends when `signal`
/// fires.
pub async fn handle(
    table: &RoutingTable,
    ws: WebSocketUpgrade,
    req: Request<Body>,
    tls: bool,
    mut signal: ShutdownSignal,
) -> Response<Body> {
    let host = raw_host(&req).unwrap_or_default().to_string();
    let path = req.uri().path().to_string();

    let Some(route) = table.matches(&req) else {
        warn!(host = %host, path = %path, "no matching route for WebSocket");
        return response::text_error(StatusCode::BAD_GATEWAY, "No matching route found");
    };
    let route = route.clone();

    debug!(host = %host, path = %path, node = %route.name, "handling WebSocket upgrade");

    let scheme = if tls { "wss" } else { "ws" };
    let request_uri = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let backend_url = format!("{}://{}{}", scheme, route.addr, request_uri);
    let headers = req.headers().clone();

    ws.on_upgrade(move |client| async move {
        tokio::select! {
            _ = bridge(client, backend_url, headers, route, host, path) => {}
            _ = signal.recv() => debug!("shutdown, closing WebSocket bridge"),
        }
    })
}

async fn bridge(
    client: WebSocket,
    backend_url: String,
    headers: HeaderMap,
    route: Route,
    host: String,
    path: String,
) {
    let mut request = match backend_url.as_str().into_client_request() {
        Ok(request) => request,
        Err(err) => {
            error!(error = %err, url = %backend_url, "invalid backend WebSocket URL");
            return;
        }
    };

    // Forward the client's headers; the dial owns the handshake set.
    for (name, value) in headers.iter() {
        if is_handshake_header(name) {
            continue;
        }
        request.headers_mut().append(name.clone(), value.clone());
    }

    let stream = match &route.proxy {
        Some(proxy) => connect_through_proxy(proxy, &route.addr).await,
        None => TcpStream::connect(route.addr.as_str()).await,
    };
    let stream = match stream {
        Ok(stream) => stream,
        Err(err) => {
            error!(error = %err, url = %backend_url, "failed to connect to backend WebSocket");
            return;
        }
    };

    let backend = match timeout(
        HANDSHAKE_TIMEOUT,
        tokio_tungstenite::client_async_tls(request, stream),
    )
    .await
    {
        Ok(Ok((backend, _response))) => backend,
        Ok(Err(err)) => {
            error!(error = %err, url = %backend_url, "backend WebSocket handshake failed");
            return;
        }
        Err(_) => {
            error!(url = %backend_url, "backend WebSocket handshake timed out");
            return;
        }
    };

    info!(
        host = %host,
        path = %path,
        node = %route.name,
        backend = %backend_url,
        "WebSocket connection established"
    );

    let (mut backend_sink, mut backend_stream) = backend.split();
    let (mut client_sink, mut client_stream) = client.split();

    let client_to_backend = async {
        while let Some(Ok(msg)) = client_stream.next().await {
            if let Err(err) = backend_sink.send(into_backend(msg)).await {
                debug!(error = %err, "failed to forward message to backend");
                break;
            }
        }
    };

    let backend_to_client = async {
        while let Some(Ok(msg)) = backend_stream.next().await {
            let Some(msg) = into_client(msg) else { continue };
            if let Err(err) = client_sink.send(msg).await {
                debug!(error = %err, "failed to forward message to client");
                break;
            }
        }
    };

    tokio::select! {
        _ = client_to_backend => {}
        _ = backend_to_client => {}
    }

    debug!(host = %host, path = %path, node = %route.name, "WebSocket connection closed");
}

/// Headers the backend handshake generates itself.
fn is_handshake_header(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "host"
            | "connection"
            | "upgrade"
            | "sec-websocket-key"
            | "sec-websocket-version"
            | "sec-websocket-extensions"
            | "sec-websocket-accept"
    )
}

fn into_backend(msg: Message) -> TgMessage {
    match msg {
        Message::Text(t) => TgMessage::Text(t.to_string().into()),
        Message::Binary(b) => TgMessage::Binary(b.into()),
        Message::Ping(p) => TgMessage::Ping(p.into()),
        Message::Pong(p) => TgMessage::Pong(p.into()),
        Message::Close(frame) => TgMessage::Close(frame.map(|f| {
            tungstenite::protocol::CloseFrame {
                code: f.code.into(),
                reason: f.reason.to_string().into(),
            }
        })),
    }
}

fn into_client(msg: TgMessage) -> Option<Message> {
    match msg {
        TgMessage::Text(t) => Some(Message::Text(t.to_string().into())),
        TgMessage::Binary(b) => Some(Message::Binary(b.into())),
        TgMessage::Ping(p) => Some(Message::Ping(p.into())),
        TgMessage::Pong(p) => Some(Message::Pong(p.into())),
        TgMessage::Close(frame) => Some(Message::Close(frame.map(|f| CloseFrame {
            code: f.code.into(),
            reason: f.reason.to_string().into(),
        }))),
        // Raw frames only appear when the library is configured for them.
        TgMessage::Frame(_) => None,
    }
}
