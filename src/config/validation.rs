//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, timeouts > 0)
//! - Check the bind address parses
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    InvalidBindAddress(String),
    ZeroRateLimit(&'static str),
    ZeroWindow(&'static str),
    ZeroTimeout(&'static str),
    EmptyDaemonCommand,
    ZeroBodyLimit,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidBindAddress(addr) => {
                write!(f, "invalid bind address: {}", addr)
            }
            ValidationError::ZeroRateLimit(bucket) => {
                write!(f, "rate limit for bucket '{}' must be > 0", bucket)
            }
            ValidationError::ZeroWindow(bucket) => {
                write!(f, "rate window for bucket '{}' must be > 0", bucket)
            }
            ValidationError::ZeroTimeout(which) => {
                write!(f, "timeout '{}' must be > 0", which)
            }
            ValidationError::EmptyDaemonCommand => write!(f, "daemon command must not be empty"),
            ValidationError::ZeroBodyLimit => write!(f, "max_body_bytes must be > 0"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Run all semantic checks against a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.server.bind_address.clone(),
        ));
    }

    for (name, bucket) in [
        ("general", &config.rate_limit.general),
        ("chat", &config.rate_limit.chat),
    ] {
        if bucket.limit == 0 {
            errors.push(ValidationError::ZeroRateLimit(name));
        }
        if bucket.window_ms == 0 {
            errors.push(ValidationError::ZeroWindow(name));
        }
    }

    if config.daemon.startup_timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("daemon.startup_timeout_ms"));
    }
    if config.daemon.request_timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("daemon.request_timeout_ms"));
    }
    if config.daemon.command.trim().is_empty() {
        errors.push(ValidationError::EmptyDaemonCommand);
    }
    if config.security.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
