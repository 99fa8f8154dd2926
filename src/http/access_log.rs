//! Access log and request metrics.
//!
//! Runs inside the request span, so the record also carries the request id.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::observability::metrics;

pub async fn log_request(request: Request<Body>, next: Next) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let response = next.run(request).await;

    let status = response.status();
    metrics::record_request(method.as_str(), status.as_u16(), start_time);
    tracing::info!(
        remote_addr = %remote_addr,
        proto = ?version,
        method = %method,
        uri = %uri,
        status = status.as_u16(),
        latency_ms = start_time.elapsed().as_millis() as u64,
        "Request completed"
    );

    response
}
