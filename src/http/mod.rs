//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → server.rs (router + ordered middleware pipeline)
//!         security (auth, size check, correlation id)
//!         → rate limit (bucket admission)
//!         → request logger (timing, one line per request)
//!     → handlers.rs (thin dispatch into the daemon client and stores)
//! ```

pub mod handlers;
pub mod server;

pub use server::{AppState, GatewayServer};
