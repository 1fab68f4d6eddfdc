//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → client_key.rs (peer address or first forwarded hop)
//!     → signature.rs (agent deny-list)
//!     → rate_limit/ (per-client window, threshold from mode.rs)
//!     → Pass to inspection
//! ```
//!
//! # Design Decisions
//! - Each stage is a pure decision; logging of denials happens in the pipeline
//! - Mode is read at decision time, never cached per request
//! - Rate state is keyed per client with per-key synchronization

pub mod client_key;
pub mod mode;
pub mod rate_limit;
pub mod signature;

pub use client_key::{ClientKey, ClientKeyExtractor};
pub use mode::{ModeController, OperatingMode};
pub use rate_limit::RateLimiter;
pub use signature::SignatureFilter;
