//! Wire-level error responses.
//!
//! Plain HTTP requests get JSON bodies; the CONNECT and WebSocket paths
//! answer with plain text before their connections are taken over.

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, StatusCode};
use serde_json::json;

use crate::routing::matcher::raw_host;

/// 502 for a request no route matched.
pub fn no_match<B>(req: &Request<B>) -> Response<Body> {
    let payload = json!({
        "error": "no matching route found",
        "host": raw_host(req).unwrap_or(""),
        "path": req.uri().path(),
        "method": req.method().as_str(),
    });
    json_error(StatusCode::BAD_GATEWAY, payload.to_string())
}

/// 502 for a request whose upstream forward failed.
pub fn forward_failure(host: &str, path: &str) -> Response<Body> {
    let payload = json!({
        "error": "failed to forward request",
        "host": host,
        "path": path,
    });
    json_error(StatusCode::BAD_GATEWAY, payload.to_string())
}

fn json_error(status: StatusCode, payload: String) -> Response<Body> {
    let mut response = Response::new(Body::from(payload));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// Plain-text error for pre-hijack CONNECT and pre-upgrade WebSocket
/// failures.
pub fn text_error(status: StatusCode, message: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(format!("{}\n", message)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
