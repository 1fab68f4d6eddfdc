//! Per-client rate limiting with mode-dependent thresholds.
//!
//! # Data Flow
//! ```text
//! check(client, mode)
//!     → limit_for(mode)               (threshold read fresh on every call)
//!     → RateStore::acquire(client, limit)
//!         memory.rs: sliding log per client (single instance)
//!         shared.rs: fixed window counter in a shared store (fleet)
//!     → Allow | Deny(RATE_LIMIT)
//! ```
//!
//! # Design Decisions
//! - A denied request is never recorded; only admitted requests consume quota
//! - Mode changes swap the threshold only; recorded windows are not rescaled
//! - Store failures fail open and are reported as dependency failures

pub mod memory;
pub mod shared;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::{RateBackend, RateLimitConfig};
use crate::observability::metrics;
use crate::pipeline::verdict::Verdict;
use crate::security::client_key::ClientKey;
use crate::security::mode::OperatingMode;

pub use self::memory::SlidingLogStore;
pub use self::shared::RedisStore;

/// Errors raised by a backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("rate store unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),

    #[error("unexpected rate store reply: {0}")]
    Protocol(String),
}

/// Result of asking a store for one more slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Recorded; `count` includes this request.
    Admitted { count: u64 },
    /// Window exhausted; nothing recorded.
    Rejected { retry_after: Option<Duration> },
}

/// Backing strategy for per-client window state.
///
/// Implementations must make `acquire` atomic per key: two concurrent calls
/// for the same client never both succeed past `limit`.
#[async_trait]
pub trait RateStore: Send + Sync {
    async fn acquire(&self, key: &ClientKey, limit: u64) -> Result<Admission, StoreError>;

    /// Drop state for clients whose window has fully elapsed. Returns evicted count.
    fn sweep(&self) -> usize {
        0
    }

    /// Number of clients currently holding state, when known locally.
    fn tracked_clients(&self) -> Option<usize> {
        None
    }

    fn name(&self) -> &'static str;
}

/// Mode-aware front for a [`RateStore`].
pub struct RateLimiter {
    store: Arc<dyn RateStore>,
    window: Duration,
    normal_max: u64,
    restricted_max: u64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateStore>, window: Duration, normal_max: u64, restricted_max: u64) -> Self {
        Self {
            store,
            window,
            normal_max,
            restricted_max,
        }
    }

    /// Build the limiter and store selected by configuration.
    pub fn from_config(config: &RateLimitConfig) -> Result<Self, StoreError> {
        let window = Duration::from_secs(config.window_secs);
        let store: Arc<dyn RateStore> = match config.backend {
            RateBackend::Memory => Arc::new(SlidingLogStore::new(window)),
            RateBackend::Redis => Arc::new(RedisStore::open(
                &config.redis_url,
                config.key_prefix.clone(),
                window,
            )?),
        };

        tracing::info!(
            backend = store.name(),
            window_secs = config.window_secs,
            normal_max = config.normal_max,
            restricted_max = config.restricted_max,
            "Rate limiter configured"
        );

        Ok(Self::new(store, window, config.normal_max, config.restricted_max))
    }

    /// Threshold in force for `mode`.
    pub fn limit_for(&self, mode: OperatingMode) -> u64 {
        match mode {
            OperatingMode::Normal => self.normal_max,
            OperatingMode::Restricted => self.restricted_max,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.name()
    }

    /// Admit or deny one request from `key` under `mode`.
    pub async fn check(&self, key: &ClientKey, mode: OperatingMode) -> Verdict {
        let limit = self.limit_for(mode);

        match self.store.acquire(key, limit).await {
            Ok(Admission::Admitted { count }) => {
                tracing::trace!(client = %key, count, limit, "Rate check passed");
                Verdict::Allow
            }
            Ok(Admission::Rejected { retry_after }) => {
                tracing::debug!(client = %key, limit, mode = %mode, "Rate limit exceeded");
                Verdict::rate_limited(retry_after)
            }
            Err(e) => {
                tracing::error!(
                    client = %key,
                    backend = self.store.name(),
                    error = %e,
                    "Rate store failure, admitting request"
                );
                metrics::record_dependency_failure("rate_store");
                Verdict::Allow
            }
        }
    }

    /// Evict idle state now.
    pub fn sweep(&self) -> usize {
        let evicted = self.store.sweep();
        if let Some(tracked) = self.store.tracked_clients() {
            metrics::record_tracked_clients(tracked);
        }
        evicted
    }

    pub fn tracked_clients(&self) -> Option<usize> {
        self.store.tracked_clients()
    }

    /// Periodically sweep idle windows until shutdown.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = limiter.sweep();
                        if evicted > 0 {
                            tracing::debug!(evicted, "Swept idle rate windows");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Rate sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }
}
