//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request pipeline produces:
//!     → logging.rs (one structured log line per completed request)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging via tracing; correlation id on every line
//! - Metrics are cheap (atomic increments)
//! - Log emission never blocks the response path

pub mod logging;
pub mod metrics;

pub use logging::request_logger;
