//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → consumed once by lifecycle::startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the operating mode changes at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, ClientKeyConfig, EventLogConfig, GatewayConfig, InspectionConfig, ListenerConfig,
    LogFormat, ModeConfig, ObservabilityConfig, RateBackend, RateLimitConfig, RuleConfig,
    RulePhase, RuleTarget, SignatureConfig, TimeoutConfig, UpstreamConfig,
};
