//! Authenticator middleware.
//!
//! Resolves the caller of every request exactly once and attaches the
//! result with [`identity::attach`]:
//!
//! ```text
//! no Authorization header        → Anonymous, continue
//! not "Bearer <token>"           → 401, stop
//! token fails structural check   → 401, stop (store never called)
//! store: not found/expired/scope → 401, stop
//! store: error or timeout        → 500 (cause logged), stop
//! resolved                       → Authenticated(user), continue
//! ```
//!
//! Every response, including rejections, carries `Vary: Authorization`.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::token::{TokenError, TokenService};
use crate::http::response::ApiError;
use crate::identity::{self, Identity};
use crate::observability::metrics;

/// State for the authenticator.
#[derive(Clone)]
pub struct Authenticator {
    pub tokens: Arc<TokenService>,
    pub scope: Arc<str>,
}

impl Authenticator {
    pub fn new(tokens: Arc<TokenService>, scope: &str) -> Self {
        Self {
            tokens,
            scope: Arc::from(scope),
        }
    }
}

/// Why an `Authorization` header could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderProblem {
    NotUtf8,
    NotBearer,
}

/// Extract the token from an `Authorization` header.
///
/// `Ok(None)` when the header is absent. The value must be exactly
/// `Bearer <token>` with a single space.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, HeaderProblem> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| HeaderProblem::NotUtf8)?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Ok(Some(token)),
        _ => Err(HeaderProblem::NotBearer),
    }
}

pub async fn authenticate(
    State(auth): State<Authenticator>,
    request: Request<Body>,
    next: Next,
) -> Response {
    // Owned so no borrow of the request is held across the store call.
    let presented = bearer_token(request.headers()).map(|token| token.map(str::to_owned));

    let mut response = match resolve_identity(&auth, presented).await {
        Ok(identity) => match identity::attach(request, identity) {
            Ok(request) => next.run(request).await,
            Err(e) => ApiError::ServerError(e.to_string()).into_response(),
        },
        Err(e) => e.into_response(),
    };

    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("authorization"));
    response
}

async fn resolve_identity(
    auth: &Authenticator,
    presented: Result<Option<String>, HeaderProblem>,
) -> Result<Identity, ApiError> {
    let token = match presented {
        Ok(Some(token)) => token,
        Ok(None) => {
            metrics::record_auth_outcome("anonymous");
            return Ok(Identity::Anonymous);
        }
        Err(problem) => {
            tracing::debug!(?problem, "Rejected Authorization header");
            metrics::record_auth_outcome("malformed");
            return Err(ApiError::InvalidAuthenticationToken);
        }
    };

    match auth.tokens.resolve(&token, &auth.scope).await {
        Ok(user) => {
            metrics::record_auth_outcome("authenticated");
            tracing::debug!(user_id = user.id, "Request authenticated");
            Ok(Identity::Authenticated(user))
        }
        Err(TokenError::Malformed) => {
            metrics::record_auth_outcome("malformed");
            Err(ApiError::InvalidAuthenticationToken)
        }
        Err(TokenError::Invalid) => {
            metrics::record_auth_outcome("invalid");
            Err(ApiError::InvalidAuthenticationToken)
        }
        // Resolution never checks a lifetime, so only store failures land here.
        Err(e @ (TokenError::Store(_) | TokenError::TtlOutOfRange(_))) => {
            metrics::record_auth_outcome("store_error");
            Err(ApiError::ServerError(format!("token lookup failed: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn absent_header_is_none() {
        assert_eq!(bearer_token(&HeaderMap::new()), Ok(None));
    }

    #[test]
    fn accepts_exact_bearer_form() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Ok(Some("abc")));
    }

    #[test]
    fn rejects_other_shapes() {
        for value in [
            "",
            "Bearer",
            "bearer abc",
            "Basic dXNlcjpwYXNz",
            "Bearer abc def",
            "Bearer  abc",
            "Token abc",
        ] {
            assert_eq!(
                bearer_token(&headers(value)),
                Err(HeaderProblem::NotBearer),
                "{value:?}"
            );
        }
    }

    #[test]
    fn rejects_non_utf8() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_bytes(b"Bearer \xff\xfe").unwrap(),
        );
        assert_eq!(bearer_token(&headers), Err(HeaderProblem::NotUtf8));
    }
}
