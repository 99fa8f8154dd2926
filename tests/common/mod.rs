//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tower::ServiceExt;

use portal_api::auth::store::Digest;
use portal_api::auth::{MemoryStore, StoreError, TokenRecord, TokenStore};
use portal_api::config::AppConfig;
use portal_api::identity::User;

pub const PASSWORD: &str = "pa55word";

/// Config with a limiter generous enough that API tests never trip it.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.environment = "test".to_string();
    config.limiter.requests_per_second = 1_000.0;
    config.limiter.burst = 1_000;
    config
}

/// A store with one account that has a password and one that doesn't.
pub fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    // Minimum cost keeps the suite fast; verify reads the cost from the digest.
    let digest = bcrypt::hash(PASSWORD, 4).unwrap();
    store.insert_user(1, "ada@example.com", "Ada", "student", Some(digest));
    store.insert_user(2, "grace@example.com", "Grace", "teacher", None);
    store
}

/// Counts every call that reaches the token store.
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    pub finds: AtomicUsize,
    pub deletes: AtomicUsize,
    pub inserts: AtomicUsize,
}

impl CountingStore {
    pub fn calls(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
            + self.inserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for CountingStore {
    async fn find_by_digest(
        &self,
        digest: &Digest,
        scope: &str,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_digest(digest, scope, now).await
    }

    async fn delete_by_digest(&self, digest: &Digest) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_by_digest(digest).await
    }

    async fn insert_token(&self, record: TokenRecord) -> Result<(), StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_token(record).await
    }
}

/// Answers every call after a fixed delay.
pub struct SlowStore {
    pub delay: Duration,
}

#[async_trait]
impl TokenStore for SlowStore {
    async fn find_by_digest(&self, _: &Digest, _: &str, _: DateTime<Utc>) -> Result<User, StoreError> {
        tokio::time::sleep(self.delay).await;
        Err(StoreError::NotFound)
    }

    async fn delete_by_digest(&self, _: &Digest) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn insert_token(&self, _: TokenRecord) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// Every call fails with a backend error.
pub struct BrokenStore;

#[async_trait]
impl TokenStore for BrokenStore {
    async fn find_by_digest(&self, _: &Digest, _: &str, _: DateTime<Utc>) -> Result<User, StoreError> {
        Err(StoreError::Backend("connection reset by db-primary:5432".into()))
    }

    async fn delete_by_digest(&self, _: &Digest) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection reset by db-primary:5432".into()))
    }

    async fn insert_token(&self, _: TokenRecord) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection reset by db-primary:5432".into()))
    }
}

/// Build a GET request from a given peer address.
pub fn get_from(uri: &str, peer: IpAddr) -> Request<Body> {
    let mut request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::new(peer, 40_000)));
    request
}

pub fn get_with_auth(uri: &str, authorization: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", authorization)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Drive one request through the router and decode the JSON envelope.
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
}
