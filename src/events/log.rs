//! Bounded decision log.
//!
//! # Responsibilities
//! - Append one record per denied request (and sampled allowed ones)
//! - Evict oldest records first when full
//! - Keep lifetime per-reason counters that survive eviction
//!
//! # Design Decisions
//! - One short critical section per append; records are never partially visible
//! - Readers take a snapshot copy, so they never block writers for long
//! - Counters are atomics outside the lock

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::pipeline::verdict::{DenyReason, Verdict};
use crate::security::client_key::ClientKey;

/// One decision record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub client_key: ClientKey,
    pub verdict: Verdict,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub path: String,
}

impl LogEntry {
    pub fn now(client_key: ClientKey, verdict: Verdict, request_id: Option<String>, path: impl Into<String>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            client_key,
            verdict,
            timestamp_ms,
            request_id,
            path: path.into(),
        }
    }
}

/// Lifetime counters for one denial reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonCount {
    pub reason: DenyReason,
    pub count: u64,
}

/// Snapshot of log state for the reporting surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStats {
    pub total_denials: u64,
    pub denials: Vec<ReasonCount>,
    pub allows_recorded: u64,
    pub retained: usize,
    pub capacity: usize,
}

pub struct EventLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    denials: [AtomicU64; 4],
    allows_seen: AtomicU64,
    allows_recorded: AtomicU64,
    allow_sample_rate: u64,
}

impl EventLog {
    /// `allow_sample_rate` of N records one in every N allowed requests; 0 records none.
    pub fn new(capacity: usize, allow_sample_rate: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            denials: Default::default(),
            allows_seen: AtomicU64::new(0),
            allows_recorded: AtomicU64::new(0),
            allow_sample_rate,
        }
    }

    /// Record a decision. Allowed entries pass through sampling first.
    /// Returns whether the entry was retained.
    pub fn append(&self, entry: LogEntry) -> bool {
        match entry.verdict.reason() {
            Some(reason) => {
                self.denials[slot(reason)].fetch_add(1, Ordering::Relaxed);
            }
            None => {
                if !self.sample_allow() {
                    return false;
                }
                self.allows_recorded.fetch_add(1, Ordering::Relaxed);
            }
        }

        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
        true
    }

    fn sample_allow(&self) -> bool {
        if self.allow_sample_rate == 0 {
            return false;
        }
        let seen = self.allows_seen.fetch_add(1, Ordering::Relaxed);
        seen % self.allow_sample_rate == 0
    }

    /// Up to `limit` most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let entries = self.entries.lock();
        entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lifetime denials for `reason`, including evicted entries.
    pub fn denials(&self, reason: DenyReason) -> u64 {
        self.denials[slot(reason)].load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> EventStats {
        let denials: Vec<ReasonCount> = DenyReason::ALL
            .iter()
            .map(|&reason| ReasonCount {
                reason,
                count: self.denials(reason),
            })
            .collect();

        EventStats {
            total_denials: denials.iter().map(|d| d.count).sum(),
            denials,
            allows_recorded: self.allows_recorded.load(Ordering::Relaxed),
            retained: self.len(),
            capacity: self.capacity,
        }
    }
}

fn slot(reason: DenyReason) -> usize {
    match reason {
        DenyReason::Bot => 0,
        DenyReason::RateLimit => 1,
        DenyReason::WafHeader => 2,
        DenyReason::WafBody => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn entry(ip: &str, verdict: Verdict) -> LogEntry {
        LogEntry::now(
            ClientKey::from(ip.parse::<std::net::IpAddr>().unwrap()),
            verdict,
            None,
            "/",
        )
    }

    #[test]
    fn evicts_oldest_first() {
        let log = EventLog::new(3, 0);
        for i in 1..=5 {
            log.append(entry(&format!("192.0.2.{}", i), Verdict::deny(DenyReason::Bot)));
        }

        let recent = log.recent(10);
        let keys: Vec<&str> = recent.iter().map(|e| e.client_key.as_str()).collect();
        assert_eq!(keys, vec!["192.0.2.5", "192.0.2.4", "192.0.2.3"]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn counters_survive_eviction() {
        let log = EventLog::new(2, 0);
        log.append(entry("192.0.2.1", Verdict::deny(DenyReason::Bot)));
        log.append(entry("192.0.2.1", Verdict::rate_limited(None)));
        log.append(entry("192.0.2.1", Verdict::rate_limited(None)));
        log.append(entry("192.0.2.1", Verdict::deny_rule(DenyReason::WafBody, "1001", "SQL Injection Detected")));

        let stats = log.stats();
        assert_eq!(stats.total_denials, 4);
        assert_eq!(log.denials(DenyReason::Bot), 1);
        assert_eq!(log.denials(DenyReason::RateLimit), 2);
        assert_eq!(log.denials(DenyReason::WafHeader), 0);
        assert_eq!(stats.retained, 2);
        assert_eq!(stats.capacity, 2);
    }

    #[test]
    fn allows_are_dropped_unless_sampled() {
        let off = EventLog::new(10, 0);
        assert!(!off.append(entry("192.0.2.1", Verdict::Allow)));
        assert!(off.is_empty());

        let sampled = EventLog::new(10, 3);
        let kept = (0..9)
            .filter(|_| sampled.append(entry("192.0.2.1", Verdict::Allow)))
            .count();
        assert_eq!(kept, 3);
        assert_eq!(sampled.stats().allows_recorded, 3);
        assert_eq!(sampled.stats().total_denials, 0);
    }

    #[test]
    fn entry_serializes_with_verdict_tag() {
        let e = entry("192.0.2.7", Verdict::deny_rule(DenyReason::WafHeader, "1003", "Path Traversal Detected"));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["client_key"], "192.0.2.7");
        assert_eq!(json["verdict"]["action"], "DENY");
        assert_eq!(json["verdict"]["reason"], "WAF_HEADER");
        assert_eq!(json["verdict"]["rule"]["id"], "1003");
    }

    #[test]
    fn concurrent_appends_are_all_counted() {
        let log = Arc::new(EventLog::new(64, 0));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        log.append(entry(&format!("198.51.100.{}", t), Verdict::deny(DenyReason::Bot)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(log.denials(DenyReason::Bot), 800);
        assert_eq!(log.len(), 64);
    }
}
