//! Panic containment.
//!
//! Outermost middleware. A panic anywhere below it, in the limiter, the
//! authenticator or a handler, becomes a single 500 envelope with
//! `Connection: close`; the listener and every other request carry on.
//!
//! The panic hook installed by `observability::logging` has already logged
//! the message with its location and backtrace by the time this layer sees
//! the unwind; this layer adds the request context.

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;

use crate::http::response::ApiError;
use crate::observability::metrics;

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

pub async fn contain_panics(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            metrics::record_recovered_panic();
            tracing::error!(
                method = %method,
                path = %path,
                remote_addr = %remote_addr,
                panic = %message,
                "Recovered from panic while handling request"
            );

            let mut response = ApiError::UnrecoverableFault(message).into_response();
            response
                .headers_mut()
                .insert(header::CONNECTION, HeaderValue::from_static("close"));
            response
        }
    }
}
