//! End-to-end tests for the three relay paths and the wire behavior.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;

use forwarder::routing::RoutingTable;

mod common;

use common::{
    filter_node, matcher_node, proxy_config, start_connect_proxy, start_echo_backend,
    start_http_backend, start_proxy, start_ws_echo_backend,
};

#[tokio::test]
async fn forwards_http_and_preserves_headers() {
    let (backend_addr, mut requests) = start_http_backend("hello from backend").await;
    let config = proxy_config(vec![filter_node("api", backend_addr, "127.0.0.1")]);
    let (proxy_addr, proxy) = start_proxy(config).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/v1/users?env=prod", proxy_addr))
        .header("x-custom", "abc123")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-backend"], "hello from backend");
    assert_eq!(response.text().await.unwrap(), "hello from backend");

    let head = requests.recv().await.unwrap().to_lowercase();
    // Original URI, custom header and a Host rewritten to the node host
    // without its port.
    assert!(head.starts_with("get /v1/users?env=prod http/1.1"));
    assert!(head.contains("x-custom: abc123"));
    assert!(head.contains("host: 127.0.0.1\r\n"));

    drop(client);
    proxy.stop().await;
}

#[tokio::test]
async fn unmatched_request_gets_json_502() {
    let (backend_addr, _requests) = start_http_backend("unused").await;
    let config = proxy_config(vec![filter_node("api", backend_addr, "nomatch.example.com")]);
    let (proxy_addr, proxy) = start_proxy(config).await;

    let response = reqwest::Client::new()
        .delete(format!("http://{}/v2/things", proxy_addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "no matching route found");
    assert_eq!(body["path"], "/v2/things");
    assert_eq!(body["method"], "DELETE");
    assert!(body["host"].as_str().unwrap().starts_with("127.0.0.1"));

    proxy.stop().await;
}

#[tokio::test]
async fn first_matching_node_wins() {
    let (backend_a, _ra) = start_http_backend("from-a").await;
    let (backend_b, _rb) = start_http_backend("from-b").await;
    let config = proxy_config(vec![
        filter_node("a", backend_a, "127.0.0.1"),
        filter_node("b", backend_b, "127.0.0.1"),
    ]);
    let (proxy_addr, proxy) = start_proxy(config).await;

    let body = reqwest::get(format!("http://{}/", proxy_addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "from-a");

    proxy.stop().await;
}

#[tokio::test]
async fn dead_backend_gets_json_502() {
    // Nothing listens on this address after the listener is dropped.
    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let config = proxy_config(vec![filter_node("dead", dead_addr, "127.0.0.1")]);
    let (proxy_addr, proxy) = start_proxy(config).await;

    let response = reqwest::get(format!("http://{}/x", proxy_addr)).await.unwrap();
    assert_eq!(response.status(), 502);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "failed to forward request");
    assert_eq!(body["path"], "/x");

    proxy.stop().await;
}

#[tokio::test]
async fn connect_tunnel_is_transparent() {
    let echo_addr = start_echo_backend().await;
    let config = proxy_config(vec![matcher_node(
        "echo",
        echo_addr,
        "Host{echo.example.com}",
    )]);
    let (proxy_addr, proxy) = start_proxy(config).await;

    let mut stream = TcpStream::connect(proxy_addr).await.unwrap();
    stream
        .write_all(
            b"CONNECT echo.example.com:443 HTTP/1.1\r\nHost: echo.example.com:443\r\n\r\n",
        )
        .await
        .unwrap();

    let head = read_response_head(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 200"), "unexpected head: {head}");

    // Bytes written after the 200 must come back identically via the echo
    // backend, in both chunks.
    for payload in [&b"hello tunnel"[..], &b"\x00\x01\x02binary\xff"[..]] {
        stream.write_all(payload).await.unwrap();
        let mut back = vec![0u8; payload.len()];
        stream.read_exact(&mut back).await.unwrap();
        assert_eq!(back, payload);
    }

    drop(stream);
    proxy.stop().await;
}

#[tokio::test]
async fn connect_without_route_gets_502() {
    let echo_addr = start_echo_backend().await;
    let config = proxy_config(vec![matcher_node(
        "echo",
        echo_addr,
        "Host{echo.example.com}",
    )]);
    let (proxy_addr, proxy) = start_proxy(config).await;

    let mut stream = TcpStream::connect(proxy_addr).await.unwrap();
    stream
        .write_all(b"CONNECT other.example.com:443 HTTP/1.1\r\nHost: other.example.com:443\r\n\r\n")
        .await
        .unwrap();

    let head = read_response_head(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 502"), "unexpected head: {head}");

    drop(stream);
    proxy.stop().await;
}

#[tokio::test]
async fn connect_chains_through_upstream_proxy() {
    let echo_addr = start_echo_backend().await;
    let (upstream_addr, mut connects) = start_connect_proxy().await;

    let mut node = matcher_node("echo", echo_addr, "Host{echo.example.com}");
    node.proxy = Some(format!("http://{}", upstream_addr));
    let config = proxy_config(vec![node]);
    let (proxy_addr, proxy) = start_proxy(config).await;

    let mut stream = TcpStream::connect(proxy_addr).await.unwrap();
    stream
        .write_all(b"CONNECT echo.example.com:443 HTTP/1.1\r\nHost: echo.example.com:443\r\n\r\n")
        .await
        .unwrap();

    let head = read_response_head(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 200"), "unexpected head: {head}");

    // The upstream proxy must have been asked for the node address.
    let connect_line = connects.recv().await.unwrap();
    assert_eq!(connect_line, format!("CONNECT {} HTTP/1.1", echo_addr));

    stream.write_all(b"through the chain").await.unwrap();
    let mut back = [0u8; 17];
    stream.read_exact(&mut back).await.unwrap();
    assert_eq!(&back, b"through the chain");

    drop(stream);
    proxy.stop().await;
}

#[tokio::test]
async fn websocket_round_trip_preserves_frames() {
    let ws_addr = start_ws_echo_backend().await;
    let config = proxy_config(vec![filter_node("ws", ws_addr, "127.0.0.1")]);
    let (proxy_addr, proxy) = start_proxy(config).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/chat", proxy_addr))
        .await
        .unwrap();

    ws.send(Message::Text("ping".into())).await.unwrap();
    match ws.next().await.unwrap().unwrap() {
        Message::Text(text) => assert_eq!(text.as_str(), "ping"),
        other => panic!("expected text frame, got {:?}", other),
    }

    ws.send(Message::Binary(vec![1u8, 2, 3].into())).await.unwrap();
    match ws.next().await.unwrap().unwrap() {
        Message::Binary(data) => assert_eq!(data.as_ref(), &[1u8, 2, 3]),
        other => panic!("expected binary frame, got {:?}", other),
    }

    ws.close(None).await.unwrap();
    drop(ws);
    proxy.stop().await;
}

#[tokio::test]
async fn hot_swap_retargets_new_requests() {
    let (backend_a, _ra) = start_http_backend("from-a").await;
    let (backend_b, _rb) = start_http_backend("from-b").await;
    let config = proxy_config(vec![filter_node("a", backend_a, "127.0.0.1")]);
    let (proxy_addr, proxy) = start_proxy(config).await;

    let url = format!("http://{}/", proxy_addr);
    assert_eq!(reqwest::get(&url).await.unwrap().text().await.unwrap(), "from-a");

    let swapped = proxy_config(vec![filter_node("b", backend_b, "127.0.0.1")]);
    proxy
        .router
        .replace(RoutingTable::build(&swapped.services).unwrap());

    assert_eq!(reqwest::get(&url).await.unwrap().text().await.unwrap(), "from-b");

    proxy.stop().await;
}

#[tokio::test]
async fn shutdown_drains_within_bound() {
    let (backend_addr, _requests) = start_http_backend("bye").await;
    let config = proxy_config(vec![filter_node("api", backend_addr, "127.0.0.1")]);
    let (proxy_addr, proxy) = start_proxy(config).await;

    reqwest::get(format!("http://{}/", proxy_addr)).await.unwrap();

    proxy.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(10), proxy.handle)
        .await
        .expect("server did not stop within the drain bound")
        .unwrap();

    // The listener is gone after shutdown.
    assert!(TcpStream::connect(proxy_addr).await.is_err());
}

async fn read_response_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        assert_ne!(n, 0, "connection closed before response head completed");
        head.extend_from_slice(&chunk[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}
