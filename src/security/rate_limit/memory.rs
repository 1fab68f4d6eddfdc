//! In-process sliding-log store.
//!
//! Each client owns a queue of admission instants inside the trailing window.
//! The per-key `DashMap` entry guard serialises calls for one client while
//! other clients proceed on other shards. Counts are exact: an instant is
//! dropped as soon as it is a full window old.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{Admission, RateStore, StoreError};
use crate::security::client_key::ClientKey;

pub struct SlidingLogStore {
    logs: DashMap<ClientKey, VecDeque<Instant>>,
    window: Duration,
}

impl SlidingLogStore {
    pub fn new(window: Duration) -> Self {
        Self {
            logs: DashMap::new(),
            window,
        }
    }

    /// Admission decision for `key` at `now`.
    pub fn acquire_at(&self, key: &ClientKey, limit: u64, now: Instant) -> Admission {
        let mut log = self.logs.entry(key.clone()).or_default();

        while let Some(oldest) = log.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                log.pop_front();
            } else {
                break;
            }
        }

        if log.len() as u64 >= limit {
            let retry_after = log
                .front()
                .map(|oldest| (*oldest + self.window).saturating_duration_since(now));
            return Admission::Rejected { retry_after };
        }

        log.push_back(now);
        Admission::Admitted {
            count: log.len() as u64,
        }
    }

    /// Evict logs whose newest admission is a full window old.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.logs.len();
        let window = self.window;
        self.logs.retain(|_, log| {
            log.back()
                .map(|newest| now.saturating_duration_since(*newest) < window)
                .unwrap_or(false)
        });
        before.saturating_sub(self.logs.len())
    }

    /// Admissions currently inside the window for `key`, as of the last call.
    pub fn recorded(&self, key: &ClientKey) -> usize {
        self.logs.get(key).map(|log| log.len()).unwrap_or(0)
    }
}

#[async_trait]
impl RateStore for SlidingLogStore {
    async fn acquire(&self, key: &ClientKey, limit: u64) -> Result<Admission, StoreError> {
        Ok(self.acquire_at(key, limit, Instant::now()))
    }

    fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn tracked_clients(&self) -> Option<usize> {
        Some(self.logs.len())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ip: &str) -> ClientKey {
        ClientKey::from(ip.parse::<std::net::IpAddr>().unwrap())
    }

    #[test]
    fn denial_does_not_consume_quota() {
        let store = SlidingLogStore::new(Duration::from_secs(1));
        let k = key("192.0.2.1");
        let t0 = Instant::now();

        assert_eq!(store.acquire_at(&k, 2, t0), Admission::Admitted { count: 1 });
        assert_eq!(store.acquire_at(&k, 2, t0), Admission::Admitted { count: 2 });
        assert!(matches!(store.acquire_at(&k, 2, t0), Admission::Rejected { .. }));
        assert!(matches!(store.acquire_at(&k, 2, t0), Admission::Rejected { .. }));
        assert_eq!(store.recorded(&k), 2);
    }

    #[test]
    fn window_slides_per_request() {
        let store = SlidingLogStore::new(Duration::from_secs(10));
        let k = key("192.0.2.2");
        let t0 = Instant::now();

        store.acquire_at(&k, 2, t0);
        store.acquire_at(&k, 2, t0 + Duration::from_secs(6));
        assert!(matches!(
            store.acquire_at(&k, 2, t0 + Duration::from_secs(9)),
            Admission::Rejected { .. }
        ));

        // first admission ages out at exactly one window
        assert_eq!(
            store.acquire_at(&k, 2, t0 + Duration::from_secs(10)),
            Admission::Admitted { count: 2 }
        );
    }

    #[test]
    fn sweep_keeps_active_clients() {
        let store = SlidingLogStore::new(Duration::from_secs(10));
        let t0 = Instant::now();

        store.acquire_at(&key("192.0.2.3"), 5, t0);
        store.acquire_at(&key("192.0.2.4"), 5, t0);
        store.acquire_at(&key("192.0.2.4"), 5, t0 + Duration::from_secs(8));

        let evicted = store.sweep_at(t0 + Duration::from_secs(12));
        assert_eq!(evicted, 1);
        assert_eq!(store.tracked_clients(), Some(1));
        assert_eq!(store.recorded(&key("192.0.2.4")), 2);
    }
}
