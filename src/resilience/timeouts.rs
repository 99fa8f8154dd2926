//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap external store calls with a deadline
//! - Bound the whole request with the same deadline helper
//! - Cancel the wrapped future cleanly when the deadline passes
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout is reported as `None`; callers map it to their own error
//! - An expired request answers with the 408 JSON envelope

use std::future::Future;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::response::ApiError;

/// Run `operation` for at most `limit`.
///
/// Returns `None` and logs a warning if the deadline passed. The inner
/// future is dropped at that point.
pub async fn with_deadline<F>(limit: Duration, name: &'static str, operation: F) -> Option<F::Output>
where
    F: Future,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(output) => Some(output),
        Err(_) => {
            tracing::warn!(
                operation = name,
                timeout_ms = limit.as_millis() as u64,
                "Operation timed out"
            );
            None
        }
    }
}

/// Middleware bounding everything below it by `limit`.
///
/// The inner future, handler and store calls included, is dropped when the
/// deadline passes.
pub async fn request_timeout(
    State(limit): State<Duration>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match with_deadline(limit, "request", next.run(request)).await {
        Some(response) => response,
        None => ApiError::RequestTimeout.into_response(),
    }
}
