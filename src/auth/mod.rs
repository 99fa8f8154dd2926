//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Authorization: Bearer <token>
//!     → middleware.rs (parse header, pick outcome)
//!     → token.rs (structural check, digest, bounded store lookup)
//!     → store.rs (TokenStore / UserStore contracts)
//!     → identity attached to the request
//!
//! POST /v1/user/login
//!     → password.rs (bcrypt verify on the blocking pool)
//!     → token.rs (issue)
//! ```

pub mod middleware;
pub mod password;
pub mod store;
pub mod token;

pub use middleware::{authenticate, bearer_token, Authenticator};
pub use password::PasswordError;
pub use store::{MemoryStore, StoreError, TokenRecord, TokenStore, UserBrief, UserStore};
pub use token::{Token, TokenError, TokenService, SCOPE_AUTHENTICATION};
