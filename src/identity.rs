//! Request identity.
//!
//! # Responsibilities
//! - Model the resolved caller: an authenticated user or anonymous
//! - Carry it on the in-flight request in a private extension slot
//! - Give handlers extractors that read it back
//!
//! # Design Decisions
//! - The extension key is a private newtype, so no other code can insert
//!   or overwrite an `Identity` by accident
//! - Reading before the authenticator ran is an ordering bug and fails
//!   loudly instead of defaulting to anonymous

use axum::{extract::FromRequestParts, http::request::Parts, http::Request};
use serde::Serialize;

use crate::http::response::ApiError;

/// An authenticated account as seen by request handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

/// The caller of the current request. Resolved once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    Authenticated(User),
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(user) => Some(user),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("no identity attached to request; is the authenticator installed?")]
    Missing,

    #[error("an identity is already attached to this request")]
    AlreadyAttached,
}

#[derive(Clone)]
struct Slot(Identity);

/// Attach `identity` to the request.
pub fn attach<B>(mut req: Request<B>, identity: Identity) -> Result<Request<B>, IdentityError> {
    if req.extensions().get::<Slot>().is_some() {
        return Err(IdentityError::AlreadyAttached);
    }
    req.extensions_mut().insert(Slot(identity));
    Ok(req)
}

/// Read the identity attached by the authenticator.
pub fn read<B>(req: &Request<B>) -> Result<&Identity, IdentityError> {
    from_extensions(req.extensions())
}

fn from_extensions(extensions: &axum::http::Extensions) -> Result<&Identity, IdentityError> {
    extensions
        .get::<Slot>()
        .map(|slot| &slot.0)
        .ok_or(IdentityError::Missing)
}

/// Extractor for the identity of the current request, anonymous or not.
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub Identity);

impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match from_extensions(&parts.extensions) {
            Ok(identity) => Ok(CurrentIdentity(identity.clone())),
            Err(e) => {
                tracing::error!(path = %parts.uri.path(), error = %e, "Identity read outside authenticator");
                Err(ApiError::ServerError(e.to_string()))
            }
        }
    }
}

/// Extractor that only accepts authenticated callers.
#[derive(Debug, Clone)]
pub struct RequireUser(pub User);

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentIdentity(identity) = CurrentIdentity::from_request_parts(parts, state).await?;
        match identity {
            Identity::Authenticated(user) => Ok(RequireUser(user)),
            Identity::Anonymous => Err(ApiError::AuthenticationRequired),
        }
    }
}
