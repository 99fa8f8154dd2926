//! Account endpoints: login, logout, brief.

use std::future::Future;

use axum::{extract::State, http::HeaderMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{bearer_token, password, StoreError, UserBrief};
use crate::http::request::JsonBody;
use crate::http::response::{ApiError, Empty, Envelope, Validator};
use crate::http::server::AppState;
use crate::identity::RequireUser;
use crate::resilience::timeouts::with_deadline;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginInput {
    /// Login method; only password login exists, so it is accepted and ignored.
    #[serde(rename = "type", default)]
    pub method: i32,
    #[serde(default)]
    pub account: String,
    /// The password.
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct LoginOutput {
    pub token: String,
    pub expiry: DateTime<Utc>,
    pub brief: UserBrief,
}

#[derive(Debug, Serialize)]
pub struct BriefOutput {
    pub brief: UserBrief,
}

/// Loose shape check: `local@domain.tld`, no whitespace.
pub fn is_email(value: &str) -> bool {
    if value.len() > 254 || value.chars().any(char::is_whitespace) {
        return false;
    }
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && domain.split('.').all(|label| !label.is_empty())
        }
        None => false,
    }
}

async fn user_lookup<T>(
    state: &AppState,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    with_deadline(state.config.auth.store_timeout(), "user_store", call)
        .await
        .unwrap_or(Err(StoreError::Timeout))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<LoginInput>,
) -> Result<Envelope<LoginOutput>, ApiError> {
    let mut v = Validator::new();
    v.check(is_email(&input.account), "account", "must be a valid email address");
    v.check(!input.code.is_empty(), "code", "must be provided");
    v.finish()?;

    let user = match user_lookup(&state, state.users.find_by_account(&input.account)).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(ApiError::InvalidCredentials),
        Err(e) => return Err(ApiError::ServerError(format!("user lookup failed: {e}"))),
    };

    let Some(digest) = user.password_hash.clone() else {
        return Err(ApiError::PasswordNotSet);
    };

    let code = input.code;
    let matched = tokio::task::spawn_blocking(move || password::verify(&code, &digest))
        .await
        .map_err(|e| ApiError::ServerError(format!("password verification task failed: {e}")))?
        .map_err(|e| ApiError::ServerError(format!("user {}: {e}", user.id)))?;
    if !matched {
        return Err(ApiError::InvalidCredentials);
    }

    let auth = &state.config.auth;
    let token = state
        .tokens
        .issue(user.id, auth.token_ttl(), &auth.scope)
        .await
        .map_err(|e| ApiError::ServerError(format!("token issue failed: {e}")))?;

    tracing::info!(user_id = user.id, "User logged in");
    Ok(Envelope(LoginOutput {
        token: token.plaintext,
        expiry: token.expiry,
        brief: user,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    headers: HeaderMap,
) -> Result<Envelope<Empty>, ApiError> {
    // The authenticator already accepted this header.
    let Ok(Some(token)) = bearer_token(&headers) else {
        return Err(ApiError::InvalidAuthenticationToken);
    };

    state
        .tokens
        .revoke(token)
        .await
        .map_err(|e| ApiError::ServerError(format!("token revoke failed: {e}")))?;

    tracing::info!(user_id = user.id, "User logged out");
    Ok(Envelope(Empty {}))
}

pub async fn brief(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Envelope<BriefOutput>, ApiError> {
    match user_lookup(&state, state.users.find_by_id(user.id)).await {
        Ok(brief) => Ok(Envelope(BriefOutput { brief })),
        Err(StoreError::NotFound) => Err(ApiError::NotFound),
        Err(e) => Err(ApiError::ServerError(format!("user lookup failed: {e}"))),
    }
}
