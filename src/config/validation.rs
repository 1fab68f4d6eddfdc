//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (window > 0, restricted threshold below normal)
//! - Check that addresses, URLs and rule patterns are usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use regex::Regex;
use url::Url;

use crate::config::schema::{GatewayConfig, RateBackend};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_upstream(&mut errors, &config.upstream.url);

    let rl = &config.rate_limit;
    if rl.window_secs == 0 {
        errors.push(ValidationError::new("rate_limit.window_secs", "must be greater than 0"));
    }
    if rl.normal_max == 0 {
        errors.push(ValidationError::new("rate_limit.normal_max", "must be greater than 0"));
    }
    if rl.restricted_max >= rl.normal_max {
        errors.push(ValidationError::new(
            "rate_limit.restricted_max",
            format!(
                "must be strictly lower than normal_max ({} >= {})",
                rl.restricted_max, rl.normal_max
            ),
        ));
    }
    if rl.backend == RateBackend::Redis {
        if let Err(e) = redis::Client::open(rl.redis_url.as_str()) {
            errors.push(ValidationError::new("rate_limit.redis_url", e.to_string()));
        }
    }
    if rl.backend == RateBackend::Memory && rl.gc_interval_secs == 0 {
        errors.push(ValidationError::new("rate_limit.gc_interval_secs", "must be greater than 0"));
    }

    for (i, pattern) in config.signatures.deny_list.iter().enumerate() {
        if pattern.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("signatures.deny_list[{}]", i),
                "must not be empty",
            ));
        }
    }

    let inspection = &config.inspection;
    if inspection.enabled && inspection.max_body_bytes == 0 {
        errors.push(ValidationError::new("inspection.max_body_bytes", "must be greater than 0"));
    }
    for (i, rule) in inspection.rules.iter().enumerate() {
        let field = format!("inspection.rules[{}]", i);
        if rule.id.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.id", field), "must not be empty"));
        }
        if rule.targets.is_empty() {
            errors.push(ValidationError::new(format!("{}.targets", field), "must name at least one target"));
        }
        if let Err(e) = Regex::new(&rule.pattern) {
            errors.push(ValidationError::new(format!("{}.pattern", field), e.to_string()));
        }
    }

    if config.event_log.capacity == 0 {
        errors.push(ValidationError::new("event_log.capacity", "must be greater than 0"));
    }

    if config.admin.enabled {
        check_socket_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must be set when admin is enabled"));
        }
    }

    if config.observability.metrics_enabled {
        check_socket_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("'{}' is not a socket address", value)));
    }
}

fn check_upstream(errors: &mut Vec<ValidationError>, value: &str) {
    match Url::parse(value) {
        Ok(url) => {
            if url.scheme() != "http" {
                errors.push(ValidationError::new(
                    "upstream.url",
                    format!("unsupported scheme '{}', expected http", url.scheme()),
                ));
            }
            if url.host_str().is_none() {
                errors.push(ValidationError::new("upstream.url", "missing host"));
            }
        }
        Err(e) => errors.push(ValidationError::new("upstream.url", e.to_string())),
    }
}
