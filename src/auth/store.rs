//! Token and user store contracts.
//!
//! # Responsibilities
//! - Define the lookup contract the token service persists through
//! - Define the user lookup used by the login and profile handlers
//! - Provide an in-memory implementation for the binary and tests
//!
//! # Design Decisions
//! - Stores only ever see token digests, never plaintext
//! - Expiry and scope filtering is the store's job so a real database can
//!   do it in the query
//! - `delete_by_digest` is idempotent

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::config::UserSeed;
use crate::identity::User;

/// SHA-256 of a token plaintext.
pub type Digest = [u8; 32];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("store call timed out")]
    Timeout,

    #[error("store backend error: {0}")]
    Backend(String),
}

/// A persisted token. The plaintext is never part of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub digest: Digest,
    pub user_id: i64,
    pub scope: String,
    pub expiry: DateTime<Utc>,
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Find the user owning a token with this digest and scope whose expiry
    /// is after `now`. Absent, expired and wrong-scope records are all
    /// `StoreError::NotFound`.
    async fn find_by_digest(
        &self,
        digest: &Digest,
        scope: &str,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError>;

    /// Remove a token record. Removing an absent record succeeds.
    async fn delete_by_digest(&self, digest: &Digest) -> Result<(), StoreError>;

    async fn insert_token(&self, record: TokenRecord) -> Result<(), StoreError>;
}

/// Public profile of an account, as returned to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserBrief {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub password_hash: Option<String>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_account(&self, account: &str) -> Result<UserBrief, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<UserBrief, StoreError>;
}

/// In-memory token and user store.
pub struct MemoryStore {
    tokens: DashMap<Digest, TokenRecord>,
    users: DashMap<i64, UserBrief>,
    // lowercase account -> user id
    accounts: DashMap<String, i64>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tokens: DashMap::new(),
            users: DashMap::new(),
            accounts: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    /// Build a store pre-populated with the configured seed accounts.
    pub fn with_users(seeds: &[UserSeed]) -> Self {
        let store = Self::new();
        for seed in seeds {
            store.insert_user(
                seed.id,
                &seed.account,
                &seed.name,
                &seed.kind,
                seed.password_hash.clone(),
            );
        }
        store
    }

    /// Register an account and return its brief.
    pub fn insert_user(
        &self,
        id: i64,
        account: &str,
        name: &str,
        kind: &str,
        password_hash: Option<String>,
    ) -> UserBrief {
        let brief = UserBrief {
            id,
            kind: kind.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
            password_hash,
        };
        self.users.insert(id, brief.clone());
        self.accounts.insert(account.to_lowercase(), id);
        self.next_id.fetch_max(id + 1, Ordering::Relaxed);
        brief
    }

    /// Register an account under the next free id.
    pub fn add_user(
        &self,
        account: &str,
        name: &str,
        kind: &str,
        password_hash: Option<String>,
    ) -> UserBrief {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.insert_user(id, account, name, kind, password_hash)
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn find_by_digest(
        &self,
        digest: &Digest,
        scope: &str,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let user_id = match self.tokens.get(digest) {
            Some(record) if record.scope == scope && record.expiry > now => record.user_id,
            _ => return Err(StoreError::NotFound),
        };

        self.users
            .get(&user_id)
            .map(|brief| User {
                id: brief.id,
                kind: brief.kind.clone(),
            })
            .ok_or(StoreError::NotFound)
    }

    async fn delete_by_digest(&self, digest: &Digest) -> Result<(), StoreError> {
        self.tokens.remove(digest);
        Ok(())
    }

    async fn insert_token(&self, record: TokenRecord) -> Result<(), StoreError> {
        self.tokens.insert(record.digest, record);
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_account(&self, account: &str) -> Result<UserBrief, StoreError> {
        let id = self
            .accounts
            .get(&account.to_lowercase())
            .map(|entry| *entry.value())
            .ok_or(StoreError::NotFound)?;
        self.find_by_id(id).await
    }

    async fn find_by_id(&self, id: i64) -> Result<UserBrief, StoreError> {
        self.users
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(digest: Digest, user_id: i64, scope: &str, expiry: DateTime<Utc>) -> TokenRecord {
        TokenRecord {
            digest,
            user_id,
            scope: scope.to_string(),
            expiry,
        }
    }

    #[tokio::test]
    async fn find_filters_scope_and_expiry() {
        let store = MemoryStore::new();
        store.insert_user(3, "c@example.com", "C", "teacher", None);
        let now = Utc::now();
        store
            .insert_token(record([1; 32], 3, "authentication", now + Duration::hours(1)))
            .await
            .unwrap();

        let user = store.find_by_digest(&[1; 32], "authentication", now).await.unwrap();
        assert_eq!(user, User { id: 3, kind: "teacher".into() });

        assert!(matches!(
            store.find_by_digest(&[1; 32], "activation", now).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store
                .find_by_digest(&[1; 32], "authentication", now + Duration::hours(1))
                .await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.find_by_digest(&[2; 32], "authentication", now).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        store
            .insert_token(record([9; 32], 1, "authentication", Utc::now()))
            .await
            .unwrap();
        assert_eq!(store.token_count(), 1);

        store.delete_by_digest(&[9; 32]).await.unwrap();
        store.delete_by_digest(&[9; 32]).await.unwrap();
        assert_eq!(store.token_count(), 0);
    }

    #[tokio::test]
    async fn accounts_are_case_insensitive() {
        let store = MemoryStore::new();
        let added = store.add_user("Ada@Example.com", "Ada", "student", None);

        let found = store.find_by_account("ada@example.com").await.unwrap();
        assert_eq!(found.id, added.id);
        assert!(matches!(
            store.find_by_account("bob@example.com").await,
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn brief_serializes_type_and_hides_hash() {
        let brief = UserBrief {
            id: 1,
            kind: "student".into(),
            name: "Ada".into(),
            created_at: Utc::now(),
            password_hash: Some("secret".into()),
        };
        let json = serde_json::to_value(&brief).unwrap();
        assert_eq!(json["type"], "student");
        assert!(json.get("password_hash").is_none());
    }
}
