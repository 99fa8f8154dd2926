//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (rates > 0, timeouts > 0, addresses parse)
//! - Check seed accounts for duplicate ids/accounts and malformed digests
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::AppConfig;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Slowest accepted refill rate: one request per ~17 minutes.
pub const MIN_REQUESTS_PER_SECOND: f64 = 0.001;

/// Longest accepted session token lifetime (ten years).
pub const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Check the configuration for semantic errors.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            "must be a socket address such as 0.0.0.0:4000",
        ));
    }

    let limiter = &config.limiter;
    if limiter.enabled {
        if !limiter.requests_per_second.is_finite()
            || limiter.requests_per_second < MIN_REQUESTS_PER_SECOND
        {
            errors.push(ValidationError::new(
                "limiter.requests_per_second",
                format!("must be a number of at least {MIN_REQUESTS_PER_SECOND}"),
            ));
        }
        if limiter.burst == 0 {
            errors.push(ValidationError::new("limiter.burst", "must be at least 1"));
        }
        if limiter.sweep_interval_secs == 0 {
            errors.push(ValidationError::new(
                "limiter.sweep_interval_secs",
                "must be greater than zero",
            ));
        }
        if limiter.idle_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "limiter.idle_timeout_secs",
                "must be greater than zero",
            ));
        }
    }

    if config.auth.scope.trim().is_empty() {
        errors.push(ValidationError::new("auth.scope", "must not be empty"));
    }
    if config.auth.token_ttl_secs == 0 {
        errors.push(ValidationError::new("auth.token_ttl_secs", "must be greater than zero"));
    } else if config.auth.token_ttl_secs > MAX_TOKEN_TTL_SECS {
        errors.push(ValidationError::new(
            "auth.token_ttl_secs",
            format!("must be at most {MAX_TOKEN_TTL_SECS}"),
        ));
    }
    if config.auth.store_timeout_ms == 0 {
        errors.push(ValidationError::new("auth.store_timeout_ms", "must be greater than zero"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than zero"));
    }
    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::new("limits.max_body_bytes", "must be greater than zero"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address when metrics are enabled",
        ));
    }

    let mut ids = HashSet::new();
    let mut accounts = HashSet::new();
    for (i, user) in config.users.iter().enumerate() {
        if !ids.insert(user.id) {
            errors.push(ValidationError::new(
                format!("users[{i}].id"),
                format!("duplicate user id {}", user.id),
            ));
        }
        if !accounts.insert(user.account.to_lowercase()) {
            errors.push(ValidationError::new(
                format!("users[{i}].account"),
                format!("duplicate account {}", user.account),
            ));
        }
        if let Some(hash) = &user.password_hash {
            if !looks_like_bcrypt(hash) {
                errors.push(ValidationError::new(
                    format!("users[{i}].password_hash"),
                    "must be a bcrypt digest (use the hash-password binary)",
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// $2b$12$ + 53 chars of salt and hash
fn looks_like_bcrypt(hash: &str) -> bool {
    hash.len() == 60 && ["$2a$", "$2b$", "$2x$", "$2y$"].iter().any(|p| hash.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::UserSeed;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = AppConfig::default();
        config.limiter.requests_per_second = 0.0;
        config.limiter.burst = 0;
        config.auth.scope = "  ".to_string();
        config.listener.bind_address = "not-an-addr".to_string();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "limiter.requests_per_second",
                "limiter.burst",
                "auth.scope",
            ]
        );
    }

    #[test]
    fn rejects_out_of_range_rate_and_ttl() {
        let mut config = AppConfig::default();
        config.limiter.requests_per_second = 1e-20;
        config.auth.token_ttl_secs = 9_000_000_000_000;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["limiter.requests_per_second", "auth.token_ttl_secs"]);

        config.limiter.requests_per_second = MIN_REQUESTS_PER_SECOND;
        config.auth.token_ttl_secs = MAX_TOKEN_TTL_SECS;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn disabled_limiter_skips_rate_checks() {
        let mut config = AppConfig::default();
        config.limiter.enabled = false;
        config.limiter.burst = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn rejects_duplicate_accounts_and_bad_digests() {
        let mut config = AppConfig::default();
        let seed = |id, account: &str, hash: Option<&str>| UserSeed {
            id,
            account: account.to_string(),
            name: "x".to_string(),
            kind: "student".to_string(),
            password_hash: hash.map(str::to_string),
        };
        config.users = vec![
            seed(1, "a@example.com", None),
            seed(1, "A@example.com", Some("plaintext")),
        ];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].field, "users[1].id");
        assert_eq!(errors[1].field, "users[1].account");
        assert_eq!(errors[2].field, "users[1].password_hash");
    }
}
