//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → client_ip.rs (peer address, or trusted forwarding headers)
//!     → rate_limit.rs (per-client token bucket)
//!     → Pass to authenticator
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input unless configured

pub mod client_ip;
pub mod rate_limit;

pub use rate_limit::{rate_limit, Admission, RateLimiter};
