//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → auth.rs (API key check, correlation id, RequestContext)
//!     → rate_limit.rs (per-client bucket admission)
//!     → Pass to logging + handlers
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - Sanitation is allow-list based, unknown constructs are rejected
//! - No trust in client input

pub mod auth;
pub mod rate_limit;
pub mod sanitize;

pub use auth::RequestContext;
pub use rate_limit::{Admission, Bucket, RateLimiter};
