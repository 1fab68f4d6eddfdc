//! Process-wide operating mode.
//!
//! # Responsibilities
//! - Hold the current mode (normal / restricted)
//! - Publish every transition as an informational event
//!
//! # Design Decisions
//! - Single atomic word; every read goes to the shared cell
//! - SeqCst on both sides so a completed `set` is seen by every later `get`
//! - No transition validation: any mode may follow any other

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::observability::metrics;

/// Operating mode of the gateway.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    #[default]
    Normal = 0,
    Restricted = 1,
}

impl OperatingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingMode::Normal => "normal",
            OperatingMode::Restricted => "restricted",
        }
    }

    pub fn is_restricted(&self) -> bool {
        matches!(self, OperatingMode::Restricted)
    }
}

impl From<u8> for OperatingMode {
    fn from(val: u8) -> Self {
        match val {
            1 => OperatingMode::Restricted,
            _ => OperatingMode::Normal,
        }
    }
}

impl From<bool> for OperatingMode {
    fn from(restricted: bool) -> Self {
        if restricted {
            OperatingMode::Restricted
        } else {
            OperatingMode::Normal
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(OperatingMode::Normal),
            "restricted" => Ok(OperatingMode::Restricted),
            other => Err(format!("unknown operating mode '{}'", other)),
        }
    }
}

/// Holder of the process-wide operating mode.
#[derive(Debug)]
pub struct ModeController {
    mode: AtomicU8,
}

impl ModeController {
    pub fn new(initial: OperatingMode) -> Self {
        metrics::record_mode(initial);
        Self {
            mode: AtomicU8::new(initial as u8),
        }
    }

    /// Current mode.
    pub fn get(&self) -> OperatingMode {
        OperatingMode::from(self.mode.load(Ordering::SeqCst))
    }

    /// Switch to `mode`, returning the previous one.
    pub fn set(&self, mode: OperatingMode) -> OperatingMode {
        let previous = OperatingMode::from(self.mode.swap(mode as u8, Ordering::SeqCst));

        tracing::info!(from = %previous, to = %mode, "Operating mode changed");
        metrics::record_mode(mode);
        metrics::record_mode_change();

        previous
    }
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new(OperatingMode::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn set_returns_previous() {
        let mode = ModeController::default();
        assert_eq!(mode.get(), OperatingMode::Normal);

        assert_eq!(mode.set(OperatingMode::Restricted), OperatingMode::Normal);
        assert_eq!(mode.get(), OperatingMode::Restricted);

        // same-value transitions are allowed
        assert_eq!(mode.set(OperatingMode::Restricted), OperatingMode::Restricted);
    }

    #[test]
    fn set_is_visible_across_threads() {
        let mode = Arc::new(ModeController::default());
        let writer = Arc::clone(&mode);

        std::thread::spawn(move || {
            writer.set(OperatingMode::Restricted);
        })
        .join()
        .unwrap();

        assert_eq!(mode.get(), OperatingMode::Restricted);
    }

    #[test]
    fn parse_and_display() {
        assert_eq!("Restricted".parse::<OperatingMode>().unwrap(), OperatingMode::Restricted);
        assert_eq!("normal".parse::<OperatingMode>().unwrap(), OperatingMode::Normal);
        assert!("bunker".parse::<OperatingMode>().is_err());
        assert_eq!(OperatingMode::Restricted.to_string(), "restricted");
        assert_eq!(OperatingMode::from(true), OperatingMode::Restricted);
    }
}
