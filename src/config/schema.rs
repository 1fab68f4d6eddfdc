//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::security::mode::OperatingMode;

/// Root configuration for the admission gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Origin application every admitted request is relayed to.
    pub upstream: UpstreamConfig,

    /// Client identity derivation.
    pub client_key: ClientKeyConfig,

    /// Agent-string deny-list.
    pub signatures: SignatureConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Operating mode at startup.
    pub mode: ModeConfig,

    /// Rule-based request inspection.
    pub inspection: InspectionConfig,

    /// In-memory decision log.
    pub event_log: EventLogConfig,

    /// Administrative surface.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream (origin) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream base URL. Only scheme and authority are used.
    pub url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientKeyConfig {
    /// Use the first hop of `X-Forwarded-For` instead of the peer address.
    pub trust_forwarded_for: bool,
}

impl Default for ClientKeyConfig {
    fn default() -> Self {
        Self {
            trust_forwarded_for: true,
        }
    }
}

/// Agent-string deny-list configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignatureConfig {
    /// Substrings matched case-insensitively against `User-Agent`.
    pub deny_list: Vec<String>,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            deny_list: vec![
                "python-requests".to_string(),
                "go-http-client".to_string(),
                "malicious-bot".to_string(),
                "sqlmap".to_string(),
                "nikto".to_string(),
            ],
        }
    }
}

/// Where per-client rate state lives.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RateBackend {
    /// In-process sliding log (single instance).
    Memory,
    /// Shared fixed-window counters in Redis (fleet).
    Redis,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Trailing window duration in seconds.
    pub window_secs: u64,

    /// Maximum admitted requests per window in normal mode.
    pub normal_max: u64,

    /// Maximum admitted requests per window in restricted mode.
    pub restricted_max: u64,

    /// Backing store strategy.
    pub backend: RateBackend,

    /// Redis connection URL (redis backend only).
    pub redis_url: String,

    /// Key prefix for redis counters.
    pub key_prefix: String,

    /// Interval between sweeps of idle in-memory windows, in seconds.
    pub gc_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 10,
            normal_max: 50,
            restricted_max: 5,
            backend: RateBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "rate_limit:".to_string(),
            gc_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ModeConfig {
    /// Mode the gateway boots in.
    pub initial: OperatingMode,
}

/// Inspection phase a rule is evaluated in.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RulePhase {
    Headers,
    Body,
}

/// Request part a rule pattern is matched against.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleTarget {
    /// Raw request target.
    Uri,
    /// Decoded query and form arguments.
    Args,
    /// Every `name: value` header line.
    Headers,
    /// Raw body bytes (lossy UTF-8).
    Body,
}

/// A single pattern rule for the built-in engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    /// Rule identifier reported on interruption.
    pub id: String,

    /// Phase the rule is evaluated in.
    pub phase: RulePhase,

    /// Parts of the request to match.
    pub targets: Vec<RuleTarget>,

    /// Regular expression.
    pub pattern: String,

    /// Message reported on interruption.
    pub message: String,
}

/// Inspection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InspectionConfig {
    /// Enable header/body inspection.
    pub enabled: bool,

    /// Largest body buffered for inspection; larger requests get 413.
    pub max_body_bytes: usize,

    /// Largest body the built-in engine evaluates before reporting an error.
    pub max_inspect_bytes: usize,

    /// Rule set for the built-in engine.
    pub rules: Vec<RuleConfig>,
}

impl Default for InspectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_body_bytes: 1024 * 1024,
            max_inspect_bytes: 128 * 1024,
            rules: default_rules(),
        }
    }
}

fn default_rules() -> Vec<RuleConfig> {
    vec![
        RuleConfig {
            id: "1001".to_string(),
            phase: RulePhase::Body,
            targets: vec![RuleTarget::Args],
            pattern: r"(?i)(union\s+select|select.+from|drop\s+table|insert\s+into)".to_string(),
            message: "SQL Injection Attempt Detected".to_string(),
        },
        RuleConfig {
            id: "1002".to_string(),
            phase: RulePhase::Body,
            targets: vec![RuleTarget::Args],
            pattern: r"(?i)<script.*?>".to_string(),
            message: "XSS Detected".to_string(),
        },
        RuleConfig {
            id: "1003".to_string(),
            phase: RulePhase::Headers,
            targets: vec![RuleTarget::Uri],
            pattern: r"(\.\./|\.\.\\|%2e%2e%2f)".to_string(),
            message: "Path Traversal Attempt Detected".to_string(),
        },
    ]
}

/// Decision log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// Maximum retained entries (oldest evicted first).
    pub capacity: usize,

    /// Record one of every N allowed requests (0 disables).
    pub allow_sample_rate: u64,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            allow_sample_rate: 0,
        }
    }
}

/// Admin surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin surface.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // no usable default; an enabled admin surface needs a configured key
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Output format for logs.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}
