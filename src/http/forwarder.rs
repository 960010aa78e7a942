//! Plaintext HTTP forwarding with per-proxy client pooling.
//!
//! Each upstream proxy URL gets one pooled client, created lazily on first
//! use and kept for the life of the server; direct traffic shares a client
//! under the `direct` sentinel key.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::uri::Authority;
use axum::http::{header, HeaderValue, Request, Response};
use tracing::info;

use crate::routing::matcher::raw_host;
use crate::routing::Route;

/// Registry key for nodes without an upstream proxy.
const DIRECT: &str = "direct";

const MAX_IDLE_PER_HOST: usize = 100;
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Error type for forwarding failures.
#[derive(Debug)]
pub enum ForwardError {
    /// A client could not be constructed (bad proxy URL, TLS setup).
    Client(reqwest::Error),
    /// The upstream request failed (dial, handshake, timeout).
    Upstream(reqwest::Error),
}

impl std::fmt::Display for ForwardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardError::Client(e) => write!(f, "failed to get client: {}", e),
            ForwardError::Upstream(e) => write!(f, "failed to forward request: {}", e),
        }
    }
}

impl std::error::Error for ForwardError {}

/// Forwards requests to backend nodes, optionally through their proxy.
pub struct Forwarder {
    clients: RwLock<HashMap<String, reqwest::Client>>,
}

impl Forwarder {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Relay one request to the matched node and stream the response back.
    ///
    /// The outbound target is `scheme://addr + original request URI` with
    /// scheme chosen by the inbound connection's TLS state. All request
    /// headers are copied verbatim except `Host`, which becomes the node
    /// host without its port.
    pub async fn forward(
        &self,
        req: Request<Body>,
        route: &Route,
        tls: bool,
    ) -> Result<Response<Body>, ForwardError> {
        let client = self.client(route.proxy.as_deref())?;

        let scheme = if tls { "https" } else { "http" };
        let request_uri = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target = format!("{}://{}{}", scheme, route.addr, request_uri);

        let method = req.method().clone();
        let host = raw_host(&req).unwrap_or_default().to_string();
        let path = req.uri().path().to_string();

        let mut headers = req.headers().clone();
        if let Some(value) = host_header(&route.addr) {
            headers.insert(header::HOST, value);
        }

        let body = reqwest::Body::wrap_stream(req.into_body().into_data_stream());

        let started = Instant::now();
        let upstream = client
            .request(method.clone(), &target)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(ForwardError::Upstream)?;

        info!(
            method = %method,
            host = %host,
            path = %path,
            node = %route.name,
            target = %target,
            status = upstream.status().as_u16(),
            duration_ms = started.elapsed().as_millis() as u64,
            "request forwarded"
        );

        let status = upstream.status();
        let response_headers = upstream.headers().clone();

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }

    /// Get or create the pooled client for a proxy URL.
    fn client(&self, proxy: Option<&str>) -> Result<reqwest::Client, ForwardError> {
        let key = proxy.unwrap_or(DIRECT);

        if let Some(client) = self.clients.read().expect("client registry poisoned").get(key) {
            return Ok(client.clone());
        }

        let client = build_client(proxy)?;
        let mut clients = self.clients.write().expect("client registry poisoned");
        // A concurrent creator may have won the race; keep the first entry.
        Ok(clients.entry(key.to_string()).or_insert(client).clone())
    }
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new()
    }
}

fn build_client(proxy: Option<&str>) -> Result<reqwest::Client, ForwardError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
        .pool_idle_timeout(IDLE_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        // Surface the first response as-is.
        .redirect(reqwest::redirect::Policy::none());

    builder = match proxy {
        Some(url) => builder.proxy(reqwest::Proxy::all(url).map_err(ForwardError::Client)?),
        None => builder.no_proxy(),
    };

    builder.build().map_err(ForwardError::Client)
}

/// Outbound Host header: the node host with any `:port` removed, parsed
/// as an authority so IPv6 literals survive.
fn host_header(addr: &str) -> Option<HeaderValue> {
    let host = match addr.parse::<Authority>() {
        Ok(authority) => authority.host().to_string(),
        Err(_) => addr.to_string(),
    };
    HeaderValue::from_str(&host).ok()
}
