//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to token/user store:
//!     → timeouts.rs (enforce per-call deadline)
//!     → On timeout: caller reports a store error, request gets a 500
//!
//! Whole request:
//!     → timeouts.rs (request_timeout middleware)
//!     → On timeout: 408 envelope, in-flight work dropped
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No retries: a failed lookup fails the request

pub mod timeouts;
