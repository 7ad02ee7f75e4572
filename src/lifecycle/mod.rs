//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup: load config → validate → initialize subsystems → serve
//! Shutdown: signal received → stop accepting → kill daemon → exit
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accepting first, then terminate the daemon
//! - All long-running tasks subscribe to one broadcast channel

pub mod shutdown;

pub use shutdown::Shutdown;
