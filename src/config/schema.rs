//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the agent gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Server configuration (bind address).
    pub server: ServerConfig,

    /// Security settings (API keys, input limits).
    pub security: SecurityConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Request logging settings.
    pub logging: LoggingConfig,

    /// Supervised agent daemon settings.
    pub daemon: DaemonConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// File-backed metadata store locations.
    pub stores: StoresConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind_address: String,

    /// Total request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            request_timeout_secs: 300,
        }
    }
}

/// Security settings for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Accepted API keys. Empty list disables the key check (dev mode).
    pub api_keys: Vec<String>,

    /// Path prefixes exempt from the API key check (liveness probes).
    pub exempt_paths: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            exempt_paths: vec!["/health".to_string()],
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// A single rate-limit bucket policy.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct BucketConfig {
    /// Maximum admitted requests per window.
    pub limit: u32,

    /// Window duration in milliseconds.
    pub window_ms: u64,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            window_ms: 60_000,
        }
    }
}

/// Rate limiting configuration.
///
/// Chat endpoints get their own, lower ceiling because each admitted call
/// is expensive for the backend daemon.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Policy for general traffic.
    pub general: BucketConfig,

    /// Policy for chat/streaming endpoints.
    pub chat: BucketConfig,

    /// Path prefixes billed against the chat bucket.
    pub chat_paths: Vec<String>,

    /// Interval for the stale-window sweep in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            general: BucketConfig {
                limit: 100,
                window_ms: 60_000,
            },
            chat: BucketConfig {
                limit: 10,
                window_ms: 60_000,
            },
            chat_paths: vec!["/api/chat".to_string()],
            sweep_interval_secs: 120,
        }
    }
}

/// Request logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Latency above which a request is logged at warn level (ms).
    pub slow_threshold_ms: u64,

    /// Path prefixes that bypass request logging entirely.
    pub skip_paths: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            slow_threshold_ms: 5_000,
            skip_paths: vec!["/health".to_string()],
        }
    }
}

/// Supervised agent daemon settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Executable to spawn for the backend agent process.
    pub command: String,

    /// Extra arguments passed before the socket argument.
    pub args: Vec<String>,

    /// Unix socket path the daemon binds for IPC.
    pub socket_path: String,

    /// Maximum wait for the daemon to become ready after spawn (ms).
    pub startup_timeout_ms: u64,

    /// Per-call reply timeout for unary requests (ms).
    pub request_timeout_ms: u64,

    /// Terminate the daemon after this many idle seconds, if set.
    pub idle_shutdown_secs: Option<u64>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            command: "echo-agent".to_string(),
            args: Vec::new(),
            socket_path: "/tmp/agent-gateway.sock".to_string(),
            startup_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            idle_shutdown_secs: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// File-backed metadata store locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoresConfig {
    /// JSON file holding artifact listings.
    pub artifacts_path: String,

    /// JSON file holding tool listings.
    pub tools_path: String,
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self {
            artifacts_path: "data/artifacts.json".to_string(),
            tools_path: "data/tools.json".to_string(),
        }
    }
}
