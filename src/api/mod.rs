//! Route table.
//!
//! Thin handlers over the admission layer: they only ever see requests
//! that were admitted by the rate limiter and carry a resolved identity.

pub mod health;
pub mod user;

use axum::{
    routing::{get, post},
    Router,
};

use crate::http::response::ApiError;
use crate::http::server::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/healthcheck", get(health::healthcheck))
        .route("/v1/user/login", post(user::login))
        .route("/v1/user/logout", post(user::logout))
        .route("/v1/user/brief", get(user::brief))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
