//! Per-client token bucket rate limiting.
//!
//! # Responsibilities
//! - Admit or reject each request against its client's bucket
//! - Create buckets lazily, refresh `last_seen` on every request
//! - Drop idle buckets from a background sweep
//!
//! # Design Decisions
//! - One `Mutex` over the whole registry. Every operation under it is a
//!   few float ops and a map lookup, never I/O
//! - A token is withdrawn only if a whole one is available, so a bucket of
//!   `burst` admits exactly `burst` back-to-back requests
//! - `tokio::time::Instant` throughout, so paused-clock tests drive refill
//!   and eviction deterministically

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::LimiterConfig;
use crate::http::response::ApiError;
use crate::observability::metrics;
use crate::security::client_ip::client_ip;

/// A simple token bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    /// Withdraw one token, or report how long until one is available.
    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> Result<(), Duration> {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            // Saturates for rates so small the wait overflows a Duration.
            Err(Duration::try_from_secs_f64((1.0 - self.tokens) / refill_rate)
                .unwrap_or(Duration::MAX))
        }
    }
}

#[derive(Debug)]
struct ClientBucket {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Registry of client buckets.
pub struct RateLimiter {
    clients: Mutex<HashMap<IpAddr, ClientBucket>>,
    config: LimiterConfig,
}

impl RateLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    // Bucket state stays consistent even if a holder panicked: every update
    // is a single assignment.
    fn clients(&self) -> MutexGuard<'_, HashMap<IpAddr, ClientBucket>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn check(&self, ip: IpAddr) -> Admission {
        self.check_at(ip, Instant::now())
    }

    /// Charge one request from `ip` at `now`.
    pub fn check_at(&self, ip: IpAddr, now: Instant) -> Admission {
        if !self.config.enabled {
            return Admission::Admitted;
        }

        let capacity = f64::from(self.config.burst);
        let rps = self.config.requests_per_second;

        let mut clients = self.clients();
        let before = clients.len();
        let client = clients.entry(ip).or_insert_with(|| ClientBucket {
            bucket: TokenBucket::new(capacity, now),
            last_seen: now,
        });
        client.last_seen = now;
        let outcome = client.bucket.try_acquire(capacity, rps, now);

        if clients.len() != before {
            metrics::record_rate_limit_clients(clients.len());
        }

        match outcome {
            Ok(()) => Admission::Admitted,
            Err(retry_after) => Admission::Rejected { retry_after },
        }
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Drop buckets not seen for longer than the idle timeout. Returns how
    /// many were dropped.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let idle_timeout = self.config.idle_timeout();
        let mut clients = self.clients();
        let before = clients.len();
        clients.retain(|_, client| now.saturating_duration_since(client.last_seen) <= idle_timeout);
        let evicted = before - clients.len();

        if evicted > 0 {
            metrics::record_rate_limit_evictions(evicted);
            metrics::record_rate_limit_clients(clients.len());
            tracing::debug!(evicted, remaining = clients.len(), "Swept idle rate limit buckets");
        }
        evicted
    }

    pub fn client_count(&self) -> usize {
        self.clients().len()
    }

    pub fn is_tracking(&self, ip: IpAddr) -> bool {
        self.clients().contains_key(&ip)
    }

    /// Start the periodic eviction sweep. It stops when `shutdown` fires.
    ///
    /// Returns `None` for a disabled limiter, which keeps no buckets.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            return None;
        }

        let limiter = Arc::clone(self);
        let period = self.config.sweep_interval();
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            tracing::debug!(interval_secs = period.as_secs(), "Rate limit sweeper started");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        limiter.sweep();
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Rate limit sweeper stopping");
                        break;
                    }
                }
            }
        }))
    }
}

/// Whole seconds for a `Retry-After` header, at least 1.
fn retry_after_secs(wait: Duration) -> u64 {
    // Float-to-int casts saturate, so `Duration::MAX` becomes `u64::MAX`.
    wait.as_secs_f64().ceil().max(1.0) as u64
}

/// Middleware function for per-client rate limiting.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(request).await;
    }

    let ip = client_ip(&request, limiter.config().trust_proxy_headers);
    match limiter.check(ip) {
        Admission::Admitted => next.run(request).await,
        Admission::Rejected { retry_after } => {
            tracing::warn!(client = %ip, "Rate limit exceeded");
            metrics::record_rate_limited();
            ApiError::RateLimitExceeded {
                retry_after_secs: retry_after_secs(retry_after),
            }
            .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn config(rps: f64, burst: u32) -> LimiterConfig {
        LimiterConfig {
            enabled: true,
            requests_per_second: rps,
            burst,
            ..LimiterConfig::default()
        }
    }

    const CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
    const OTHER: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 2));

    #[test]
    fn burst_then_reject() {
        let limiter = RateLimiter::new(config(1.0, 3));
        let now = Instant::now();

        for i in 0..3 {
            assert!(limiter.check_at(CLIENT, now).is_admitted(), "request {i}");
        }
        match limiter.check_at(CLIENT, now) {
            Admission::Rejected { retry_after } => assert_eq!(retry_after, Duration::from_secs(1)),
            Admission::Admitted => panic!("fourth request admitted"),
        }
    }

    #[test]
    fn refills_at_configured_rate() {
        let limiter = RateLimiter::new(config(2.0, 1));
        let now = Instant::now();

        assert!(limiter.check_at(CLIENT, now).is_admitted());
        assert!(!limiter.check_at(CLIENT, now).is_admitted());
        assert!(!limiter
            .check_at(CLIENT, now + Duration::from_millis(400))
            .is_admitted());
        assert!(limiter
            .check_at(CLIENT, now + Duration::from_millis(600))
            .is_admitted());
    }

    #[test]
    fn refill_is_capped_at_burst() {
        let limiter = RateLimiter::new(config(10.0, 2));
        let now = Instant::now();
        assert!(limiter.check_at(CLIENT, now).is_admitted());

        let later = now + Duration::from_secs(60);
        assert!(limiter.check_at(CLIENT, later).is_admitted());
        assert!(limiter.check_at(CLIENT, later).is_admitted());
        assert!(!limiter.check_at(CLIENT, later).is_admitted());
    }

    #[test]
    fn clients_are_independent() {
        let limiter = RateLimiter::new(config(1.0, 1));
        let now = Instant::now();
        assert!(limiter.check_at(CLIENT, now).is_admitted());
        assert!(!limiter.check_at(CLIENT, now).is_admitted());
        assert!(limiter.check_at(OTHER, now).is_admitted());
    }

    #[test]
    fn disabled_limiter_admits_and_tracks_nothing() {
        let limiter = RateLimiter::new(LimiterConfig {
            enabled: false,
            ..config(1.0, 1)
        });
        let now = Instant::now();
        for _ in 0..100 {
            assert!(limiter.check_at(CLIENT, now).is_admitted());
        }
        assert_eq!(limiter.client_count(), 0);
    }

    #[test]
    fn sweep_drops_only_idle_clients() {
        let limiter = RateLimiter::new(config(1.0, 1));
        let start = Instant::now();
        limiter.check_at(CLIENT, start);
        limiter.check_at(OTHER, start + Duration::from_secs(30));

        // Exactly at the idle timeout is still kept.
        assert_eq!(limiter.sweep_at(start + Duration::from_secs(60)), 0);
        assert_eq!(limiter.sweep_at(start + Duration::from_secs(61)), 1);
        assert!(!limiter.is_tracking(CLIENT));
        assert!(limiter.is_tracking(OTHER));
    }

    #[test]
    fn rejected_requests_refresh_last_seen() {
        let limiter = RateLimiter::new(config(0.001, 1));
        let start = Instant::now();
        limiter.check_at(CLIENT, start);
        assert!(!limiter
            .check_at(CLIENT, start + Duration::from_secs(50))
            .is_admitted());

        assert_eq!(limiter.sweep_at(start + Duration::from_secs(100)), 0);
    }

    #[test]
    fn tiny_rate_saturates_retry_hint() {
        let limiter = RateLimiter::new(config(1e-20, 1));
        let now = Instant::now();
        assert!(limiter.check_at(CLIENT, now).is_admitted());

        match limiter.check_at(CLIENT, now) {
            Admission::Rejected { retry_after } => {
                assert_eq!(retry_after, Duration::MAX);
                assert_eq!(retry_after_secs(retry_after), u64::MAX);
            }
            Admission::Admitted => panic!("second request admitted"),
        }
    }

    #[test]
    fn retry_after_rounds_up_to_whole_seconds() {
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(200)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(2_001)), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_and_stops_on_shutdown() {
        let limiter = Arc::new(RateLimiter::new(LimiterConfig {
            sweep_interval_secs: 10,
            idle_timeout_secs: 15,
            ..config(1.0, 1)
        }));
        let (tx, rx) = broadcast::channel(1);
        let handle = limiter.spawn_sweeper(rx).unwrap();

        limiter.check(CLIENT);
        assert!(!limiter.check(CLIENT).is_admitted());

        // Tick at 10s keeps it (idle 10s), tick at 20s drops it.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(limiter.is_tracking(CLIENT));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!limiter.is_tracking(CLIENT));

        // Fresh bucket after eviction.
        assert!(limiter.check(CLIENT).is_admitted());

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
