//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → panic.rs (outermost fault boundary)
//!     → access_log.rs (access log + request metrics)
//!     → [rate limiter, authenticator]
//!     → request.rs (JSON body extraction)
//!     → response.rs (JSON envelope, error mapping)
//!     → Send to client
//! ```

pub mod access_log;
pub mod panic;
pub mod request;
pub mod response;
pub mod server;

pub use request::{JsonBody, X_REQUEST_ID};
pub use response::{ApiError, Envelope};
pub use server::{with_admission, AppState, HttpServer};
