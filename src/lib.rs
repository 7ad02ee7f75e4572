//! Agent Gateway Library
//!
//! HTTP gateway in front of a local agent runtime: authenticates and
//! rate-limits inbound requests, logs every request, and relays streamed
//! agent output from a supervised daemon process.

pub mod config;
pub mod daemon;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod stores;

pub use config::schema::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
