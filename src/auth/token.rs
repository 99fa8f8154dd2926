//! Opaque bearer token issuance and resolution.
//!
//! # Data Flow
//! ```text
//! issue:   OsRng (24 bytes) → base64url (32 chars) → SHA-256 → store.insert_token
//! resolve: structural check → SHA-256 → store.find_by_digest(digest, scope, now)
//! revoke:  SHA-256 → store.delete_by_digest
//! ```
//!
//! # Design Decisions
//! - Plaintext leaves this module exactly once, inside the issued `Token`
//! - Malformed plaintexts are rejected before the store is touched
//! - Every store call runs under `store_timeout`; dropping the caller's
//!   future drops the store call with it

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest as _, Sha256};

use crate::auth::store::{Digest, StoreError, TokenRecord, TokenStore};
use crate::identity::User;
use crate::resilience::timeouts::with_deadline;

/// Scope of session tokens handed out by the login endpoint.
pub const SCOPE_AUTHENTICATION: &str = "authentication";

/// Random bytes per token.
const TOKEN_BYTES: usize = 24;

/// Length of the encoded plaintext (24 bytes, base64 without padding).
pub const TOKEN_LENGTH: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token is invalid, expired or out of scope")]
    Invalid,

    #[error("token lifetime of {0:?} is out of range")]
    TtlOutOfRange(Duration),

    #[error(transparent)]
    Store(StoreError),
}

/// A freshly issued token. Only returned from [`TokenService::issue`].
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub plaintext: String,
    pub digest: Digest,
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    pub scope: String,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("plaintext", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Cheap pre-filter: fixed length, URL-safe base64 alphabet.
pub fn is_well_formed(plaintext: &str) -> bool {
    plaintext.len() == TOKEN_LENGTH
        && plaintext
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

pub fn digest(plaintext: &str) -> Digest {
    Sha256::digest(plaintext.as_bytes()).into()
}

fn generate_plaintext() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Issues, resolves and revokes tokens against a [`TokenStore`].
pub struct TokenService {
    store: Arc<dyn TokenStore>,
    store_timeout: Duration,
}

impl TokenService {
    pub fn new(store: Arc<dyn TokenStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    /// Create and persist a token for `user_id` valid for `ttl`.
    pub async fn issue(&self, user_id: i64, ttl: Duration, scope: &str) -> Result<Token, TokenError> {
        let expiry = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .ok_or(TokenError::TtlOutOfRange(ttl))?;

        let plaintext = generate_plaintext();
        let token = Token {
            digest: digest(&plaintext),
            plaintext,
            user_id,
            expiry,
            scope: scope.to_string(),
        };

        let record = TokenRecord {
            digest: token.digest,
            user_id,
            scope: token.scope.clone(),
            expiry: token.expiry,
        };
        self.bounded(self.store.insert_token(record))
            .await
            .map_err(TokenError::Store)?;

        tracing::debug!(user_id, scope, expiry = %token.expiry, "Token issued");
        Ok(token)
    }

    /// Resolve a presented plaintext to the user it was issued for.
    pub async fn resolve(&self, plaintext: &str, scope: &str) -> Result<User, TokenError> {
        self.resolve_at(plaintext, scope, Utc::now()).await
    }

    /// [`resolve`](Self::resolve) against an explicit clock reading.
    pub async fn resolve_at(
        &self,
        plaintext: &str,
        scope: &str,
        now: DateTime<Utc>,
    ) -> Result<User, TokenError> {
        if !is_well_formed(plaintext) {
            return Err(TokenError::Malformed);
        }

        let digest = digest(plaintext);
        match self.bounded(self.store.find_by_digest(&digest, scope, now)).await {
            Ok(user) => Ok(user),
            Err(StoreError::NotFound) => Err(TokenError::Invalid),
            Err(e) => Err(TokenError::Store(e)),
        }
    }

    /// Delete the record for `plaintext`. Unknown tokens are not an error.
    pub async fn revoke(&self, plaintext: &str) -> Result<(), StoreError> {
        let digest = digest(plaintext);
        match self.bounded(self.store.delete_by_digest(&digest)).await {
            Ok(()) | Err(StoreError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        with_deadline(self.store_timeout, "token_store", call)
            .await
            .unwrap_or(Err(StoreError::Timeout))
    }
}
