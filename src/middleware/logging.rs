//! Request logging middleware.
//!
//! Logs every inbound request as a span carrying method, path, the queried
//! `user` address (most gateway routes take one), status, and latency.
//! Modeled on the teacher's span-based request logger, minus `ConnectInfo` —
//! the gateway runs behind a reverse proxy that does not forward the peer
//! address.
use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn, Span};

/// Pulls `user=...` out of the raw query string without a full parse —
/// every handler re-validates it as an [`crate::address::Address`] anyway,
/// this is for log correlation only.
fn query_user(query: &str) -> Option<&str> {
    query
        .split('&')
        .find_map(|kv| kv.strip_prefix("user="))
}

pub async fn request_logging_simple(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let path = uri.path().to_string();

    if path == "/health" {
        return next.run(request).await;
    }

    let user = uri.query().and_then(query_user).unwrap_or("");

    let span = tracing::info_span!(
        "gateway_request",
        method = %method,
        path = %path,
        user = %user,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );
    let _guard = span.enter();

    let start = Instant::now();
    let response = next.run(request).await;
    let latency = start.elapsed();
    let status = response.status().as_u16();

    Span::current().record("status", status);
    Span::current().record("latency_ms", latency.as_millis() as u64);

    if status >= 500 {
        warn!("request failed");
    } else {
        info!("request completed");
    }

    response
}
