//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files and
//! every field has a default, so a minimal config only names what differs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP listener settings.
    pub listener: ListenerConfig,

    /// Remote completion endpoint.
    pub upstream: UpstreamConfig,

    /// Process lifecycle (pid file, drain, maintenance tick).
    pub lifecycle: LifecycleConfig,

    /// Rotating file log.
    pub logger: LogConfig,

    /// Console output and metrics exporter.
    pub observability: ObservabilityConfig,

    /// Debug mode: mirrors logs to the console.
    pub debug: bool,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Total time allowed for one request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 60,
        }
    }
}

/// Upstream completion endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Full URL requests are POSTed to.
    pub endpoint: String,

    /// Name of the environment variable holding the bearer key.
    /// The key itself never appears in config files.
    pub api_key_env: String,

    /// Upstream request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000/v1/chat/completions".to_string(),
            api_key_env: "PROMPT_GATEWAY_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Process lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Single-instance guard file.
    pub pid_file: String,

    /// Grace period for in-flight requests on a graceful exit.
    pub shutdown_wait_ms: u64,

    /// Upper bound for the listener to finish after the grace period.
    pub stop_timeout_ms: u64,

    /// Coordinator tick interval.
    pub tick_interval_ms: u64,

    /// Minimum seconds between periodic log flushes.
    pub flush_interval_secs: u64,

    /// Event sink capacity.
    pub sink_capacity: usize,

    /// Debug time offset in seconds. Keep at 0 in production.
    pub time_offset_secs: i64,
}

impl LifecycleConfig {
    pub fn shutdown_wait(&self) -> Duration {
        Duration::from_millis(self.shutdown_wait_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            pid_file: "prompt-gateway.pid".to_string(),
            shutdown_wait_ms: 10_000,
            stop_timeout_ms: 5_000,
            tick_interval_ms: 20,
            flush_interval_secs: 30,
            sink_capacity: 40_000,
            time_offset_secs: 0,
        }
    }
}

/// Rotating log writer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log directory, relative to the working directory.
    pub log_path: String,

    /// Minimum level: -1 trace, 0 debug, 1 info, 2 warn, 3+ error.
    pub log_level: i32,

    /// Segment size cap in MB for size rotation (0 means 20).
    pub max_size: u32,

    /// Hours per segment; > 0 switches to time rotation.
    pub hour_rotate: u32,

    /// Age in days after which segments are swept; 0 disables sweeping.
    pub max_hold_days: u32,

    /// Expired uncompressed segments kept by the sweep; 0 keeps all.
    pub max_backups: u32,

    /// Gzip expired segments.
    pub enable_compress: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_path: "logs".to_string(),
            log_level: 0,
            max_size: 20,
            hour_rotate: 0,
            max_hold_days: 0,
            max_backups: 0,
            enable_compress: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Mirror logs to stderr in a human-readable format.
    pub console: bool,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            console: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
