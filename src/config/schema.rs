//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the API.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the portal API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Deployment environment name ("development", "production", ...).
    pub environment: String,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Per-client rate limiting.
    pub limiter: LimiterConfig,

    /// Token issuance and verification.
    pub auth: AuthConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Seed accounts for the in-memory user store.
    pub users: Vec<UserSeed>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            listener: ListenerConfig::default(),
            limiter: LimiterConfig::default(),
            auth: AuthConfig::default(),
            timeouts: TimeoutConfig::default(),
            limits: LimitsConfig::default(),
            observability: ObservabilityConfig::default(),
            users: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
            || self.environment.eq_ignore_ascii_case("dev")
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:4000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4000".to_string(),
        }
    }
}

/// Rate limiting configuration.
///
/// Read-only after startup; every client bucket copies these values.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Continuous refill rate per client, in tokens per second.
    pub requests_per_second: f64,

    /// Bucket capacity per client.
    pub burst: u32,

    /// How often idle clients are swept, in seconds.
    pub sweep_interval_secs: u64,

    /// Idle time after which a client's bucket is dropped, in seconds.
    pub idle_timeout_secs: u64,

    /// Take the client address from X-Forwarded-For / X-Real-IP.
    /// Only enable behind a proxy that overwrites these headers.
    pub trust_proxy_headers: bool,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 2.0,
            burst: 4,
            sweep_interval_secs: 60,
            idle_timeout_secs: 60,
            trust_proxy_headers: false,
        }
    }
}

impl LimiterConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Scope tag stamped on session tokens and required when resolving them.
    pub scope: String,

    /// Lifetime of an issued session token, in seconds.
    pub token_ttl_secs: u64,

    /// Upper bound on every token store call, in milliseconds.
    pub store_timeout_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            scope: crate::auth::token::SCOPE_AUTHENTICATION.to_string(),
            token_ttl_secs: 30 * 24 * 60 * 60,
            store_timeout_ms: 3_000,
        }
    }
}

impl AuthConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024, // 1MB
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log format. Defaults to pretty in development and JSON elsewhere.
    pub log_format: Option<LogFormat>,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: None,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// A seeded account for the in-memory user store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserSeed {
    pub id: i64,

    /// Login handle (email address).
    pub account: String,

    pub name: String,

    /// Account type, e.g. "student" or "teacher".
    #[serde(rename = "type", default = "default_user_type")]
    pub kind: String,

    /// bcrypt digest produced by the `hash-password` binary.
    #[serde(default)]
    pub password_hash: Option<String>,
}

fn default_user_type() -> String {
    "student".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            environment = "production"

            [limiter]
            burst = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.environment, "production");
        assert_eq!(config.limiter.burst, 10);
        assert!(config.limiter.enabled);
        assert_eq!(config.limiter.requests_per_second, 2.0);
        assert_eq!(config.auth.scope, "authentication");
        assert_eq!(config.auth.store_timeout(), Duration::from_secs(3));
        assert!(!config.is_development());
    }

    #[test]
    fn user_seed_reads_type_field() {
        let config: AppConfig = toml::from_str(
            r#"
            [[users]]
            id = 7
            account = "ada@example.com"
            name = "Ada"
            type = "teacher"
            "#,
        )
        .unwrap();

        assert_eq!(config.users.len(), 1);
        assert_eq!(config.users[0].kind, "teacher");
        assert!(config.users[0].password_hash.is_none());
    }
}
