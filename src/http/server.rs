//! Server frontend.
//!
//! One accept loop per unique configured address. Each connection is
//! served by hyper http1 with upgrades enabled; CONNECT is intercepted
//! before the axum router, which handles WebSocket upgrades and plain
//! HTTP. Every request captures one routing-table snapshot at dispatch
//! entry and keeps it for its whole lifetime.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, State};
use axum::http::{Method, Request, Response};
use axum::response::IntoResponse;
use axum::routing::any;
use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::schema::Config;
use crate::http::forwarder::Forwarder;
use crate::http::{connect, response, websocket};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::net::{self, BindError};
use crate::routing::matcher::raw_host;
use crate::routing::{RoutingTable, SharedRouter, TableError};

/// State shared with every request handler.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<SharedRouter>,
    pub forwarder: Arc<Forwarder>,
    /// Hands relay tasks a way to notice shutdown and drop their sockets.
    pub shutdown: Arc<Shutdown>,
    /// Whether the accepting listener terminates TLS. Plain `tcp`
    /// listeners never do; outbound scheme selection keys off this.
    pub tls: bool,
}

/// The proxy server: routing table, forwarder and listener set.
pub struct Server {
    config: Config,
    router: Arc<SharedRouter>,
    forwarder: Arc<Forwarder>,
}

impl Server {
    /// Build the initial routing table from config.
    pub fn new(config: Config) -> Result<Self, TableError> {
        let table = RoutingTable::build(&config.services)?;
        Ok(Self {
            config,
            router: Arc::new(SharedRouter::new(table)),
            forwarder: Arc::new(Forwarder::new()),
        })
    }

    /// Handle used by the config watcher to publish rebuilt tables.
    pub fn router(&self) -> Arc<SharedRouter> {
        self.router.clone()
    }

    /// Bind every unique configured address. Any bind failure is fatal.
    pub async fn bind(&self) -> Result<Vec<TcpListener>, BindError> {
        let mut listeners = Vec::new();
        for addr in self.unique_addresses() {
            listeners.push(net::bind(&addr).await?);
        }
        Ok(listeners)
    }

    /// Serve until shutdown triggers, then drain in-flight connections
    /// within `drain_timeout`. Connections still running at the deadline
    /// are aborted; CONNECT and WebSocket relays watch the same signal
    /// and drop their sockets when it fires.
    pub async fn serve(
        &self,
        listeners: Vec<TcpListener>,
        shutdown: Arc<Shutdown>,
        drain_timeout: Duration,
    ) {
        let state = AppState {
            router: self.router.clone(),
            forwarder: self.forwarder.clone(),
            shutdown: shutdown.clone(),
            tls: false,
        };
        let router = build_router(state.clone());
        let read_timeout = self.config.server.read_timeout();

        let mut accept_loops = JoinSet::new();
        for listener in listeners {
            accept_loops.spawn(accept_loop(
                listener,
                state.clone(),
                router.clone(),
                read_timeout,
                shutdown.subscribe(),
                drain_timeout,
            ));
        }

        while accept_loops.join_next().await.is_some() {}
        info!("server stopped");
    }

    /// The global address plus every service address, deduplicated in
    /// configuration order.
    fn unique_addresses(&self) -> Vec<String> {
        let mut addrs = vec![self.config.server.addr.clone()];
        for service in &self.config.services {
            if let Some(addr) = &service.addr {
                if !addrs.contains(addr) {
                    addrs.push(addr.clone());
                }
            }
        }
        addrs
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: AppState,
    router: Router,
    read_timeout: Duration,
    mut signal: ShutdownSignal,
    drain_timeout: Duration,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "connection accepted");
                    connections.spawn(serve_connection(
                        stream,
                        state.clone(),
                        router.clone(),
                        read_timeout,
                    ));
                }
                Err(err) => warn!(error = %err, "failed to accept connection"),
            },
            _ = signal.recv() => break,
        }
    }

    // Stop accepting, then drain what's in flight.
    drop(listener);
    let deadline = tokio::time::Instant::now() + drain_timeout;
    while !connections.is_empty() {
        match tokio::time::timeout_at(deadline, connections.join_next()).await {
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(_) => {
                warn!(
                    remaining = connections.len(),
                    "drain deadline reached, aborting remaining connections"
                );
                connections.shutdown().await;
                break;
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    state: AppState,
    router: Router,
    read_timeout: Duration,
) {
    let io = TokioIo::new(stream);
    let service = hyper::service::service_fn(move |req: Request<Incoming>| {
        let state = state.clone();
        let router = router.clone();
        async move { dispatch(state, router, req).await }
    });

    let mut builder = http1::Builder::new();
    builder
        .preserve_header_case(true)
        .title_case_headers(true)
        .timer(TokioTimer::new())
        .header_read_timeout(read_timeout);

    if let Err(err) = builder.serve_connection(io, service).with_upgrades().await {
        debug!(error = %err, "connection closed with error");
    }
}

/// Classify the request: CONNECT is answered outside the axum router so
/// the connection can be taken over; everything else flows through it.
async fn dispatch(
    state: AppState,
    router: Router,
    req: Request<Incoming>,
) -> Result<Response<Body>, Infallible> {
    let req = req.map(Body::new);

    if req.method() == Method::CONNECT {
        let table = state.router.snapshot();
        let signal = state.shutdown.subscribe();
        return Ok(connect::handle(&table, req, signal).await);
    }

    router.oneshot(req).await
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", any(dispatch_handler))
        .route("/{*path}", any(dispatch_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// WebSocket upgrades and plain HTTP, in that order.
async fn dispatch_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Response<Body> {
    let table = state.router.snapshot();

    if websocket::is_upgrade(request.headers()) {
        let (mut parts, body) = request.into_parts();
        return match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(ws) => {
                let request = Request::from_parts(parts, body);
                let signal = state.shutdown.subscribe();
                websocket::handle(&table, ws, request, state.tls, signal).await
            }
            Err(rejection) => rejection.into_response(),
        };
    }

    let Some(route) = table.matches(&request) else {
        warn!(
            host = raw_host(&request).unwrap_or(""),
            path = request.uri().path(),
            method = %request.method(),
            "no matching route found"
        );
        return response::no_match(&request);
    };
    let route = route.clone();

    let host = raw_host(&request).unwrap_or_default().to_string();
    let path = request.uri().path().to_string();

    match state.forwarder.forward(request, &route, state.tls).await {
        Ok(response) => response,
        Err(err) => {
            error!(
                error = %err,
                host = %host,
                path = %path,
                node = %route.name,
                "failed to forward request"
            );
            response::forward_failure(&host, &path)
        }
    }
}
