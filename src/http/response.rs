//! JSON envelope and HTTP error mapping.
//!
//! # Responsibilities
//! - Render every response body as `{"code": 0 | -1, ...}`
//! - Map API errors to status codes and fixed client messages
//! - Log server-side failures without leaking them to the client
//!
//! # Design Decisions
//! - Payload keys are flattened next to `code`, never nested
//! - Bodies end with a newline
//! - Only 5xx outcomes are logged at error level

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

pub const CODE_OK: i32 = 0;
pub const CODE_ERROR: i32 = -1;

const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

/// A successful response: `{"code": 0, ...payload}`.
#[derive(Debug, Clone)]
pub struct Envelope<T>(pub T);

#[derive(Serialize)]
struct Wire<'a, T: Serialize> {
    code: i32,
    #[serde(flatten)]
    payload: &'a T,
}

#[derive(Serialize)]
struct Message<'a> {
    message: &'a str,
}

/// Empty success payload, rendered as `{"code": 0}`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Empty {}

/// Serialize `payload` under `code` and write it as a JSON response.
pub fn write_json<T: Serialize>(status: StatusCode, code: i32, payload: &T) -> Response {
    match serde_json::to_vec(&Wire { code, payload }) {
        Ok(mut body) => {
            body.push(b'\n');
            (
                status,
                [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
                body,
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response body");
            let fallback =
                format!("{{\"code\":{CODE_ERROR},\"message\":\"{SERVER_ERROR_MESSAGE}\"}}\n");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
                fallback,
            )
                .into_response()
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        write_json(StatusCode::OK, CODE_OK, &self.0)
    }
}

/// Errors surfaced to API clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("failed validation")]
    FailedValidation(Vec<(String, String)>),

    #[error("invalid authentication credentials")]
    InvalidCredentials,

    #[error("Password is Not Set")]
    PasswordNotSet,

    #[error("invalid or expired authentication token")]
    InvalidAuthenticationToken,

    #[error("authentication required to access this resource")]
    AuthenticationRequired,

    #[error("the requested resource could not be found")]
    NotFound,

    #[error("the request method is not allowed")]
    MethodNotAllowed,

    #[error("the request took too long to process")]
    RequestTimeout,

    #[error("rate limit exceeded")]
    RateLimitExceeded { retry_after_secs: u64 },

    /// Internal failure; the cause is logged, never sent.
    #[error("server error: {0}")]
    ServerError(String),

    /// A panic caught at the outermost layer.
    #[error("unrecoverable fault: {0}")]
    UnrecoverableFault(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InvalidCredentials
            | ApiError::PasswordNotSet
            | ApiError::InvalidAuthenticationToken
            | ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServerError(_) | ApiError::UnrecoverableFault(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The message sent to the client.
    pub fn message(&self) -> String {
        match self {
            ApiError::FailedValidation(problems) => validation_message(problems),
            ApiError::ServerError(_) | ApiError::UnrecoverableFault(_) => {
                SERVER_ERROR_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }
}

/// `field: problem, field: problem.`
fn validation_message(problems: &[(String, String)]) -> String {
    if problems.is_empty() {
        return String::new();
    }
    let joined = problems
        .iter()
        .map(|(field, problem)| format!("{field}: {problem}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{joined}.")
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::ServerError(cause) => {
                tracing::error!(error = %cause, "Request failed");
            }
            // Already logged with its backtrace by the panic boundary.
            ApiError::UnrecoverableFault(_) => {}
            other => {
                tracing::debug!(status = other.status().as_u16(), error = %other, "Request rejected");
            }
        }

        let message = self.message();
        let mut response = write_json(self.status(), CODE_ERROR, &Message { message: &message });

        if let ApiError::RateLimitExceeded { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

/// Collects field problems for a 422 response.
#[derive(Debug, Default)]
pub struct Validator {
    problems: Vec<(String, String)>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `problem` for `field` unless `ok`. Only the first problem per
    /// field is kept.
    pub fn check(&mut self, ok: bool, field: &str, problem: &str) {
        if !ok && !self.problems.iter().any(|(f, _)| f == field) {
            self.problems.push((field.to_string(), problem.to_string()));
        }
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.problems.is_empty() {
            Ok(())
        } else {
            Err(ApiError::FailedValidation(self.problems))
        }
    }
}
