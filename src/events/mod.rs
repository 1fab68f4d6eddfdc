//! Decision records.
//!
//! # Data Flow
//! ```text
//! pipeline (every denial, sampled allows)
//!     → log.rs EventLog::append
//! admin stats endpoint
//!     → EventLog::stats / EventLog::recent
//! ```

pub mod log;

pub use log::{EventLog, EventStats, LogEntry, ReasonCount};
