//! Shared fixed-window store backed by Redis.
//!
//! One Lua script per check keeps read-compare-increment atomic across the
//! whole fleet. The window starts at a client's first admitted request and
//! ends when the key expires.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisResult, Script};

use super::{Admission, RateStore, StoreError};
use crate::security::client_key::ClientKey;

/// KEYS[1] = counter, ARGV[1] = limit, ARGV[2] = window in ms.
/// Returns {admitted, count, ttl_ms}.
const ACQUIRE_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current >= tonumber(ARGV[1]) then
    return {0, current, redis.call('PTTL', KEYS[1])}
end
current = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    ttl = tonumber(ARGV[2])
end
return {1, current, ttl}
"#;

pub struct RedisStore {
    client: Client,
    /// Established lazily, dropped on failure so the next call reconnects.
    conn: ArcSwapOption<MultiplexedConnection>,
    script: Script,
    key_prefix: String,
    window: Duration,
}

impl RedisStore {
    /// Parse the URL without connecting; an unreachable store is not a startup error.
    pub fn open(url: &str, key_prefix: String, window: Duration) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            conn: ArcSwapOption::empty(),
            script: Script::new(ACQUIRE_SCRIPT),
            key_prefix,
            window,
        })
    }

    fn full_key(&self, key: &ClientKey) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        if let Some(conn) = self.conn.load_full() {
            return Ok((*conn).clone());
        }

        let conn = self.client.get_multiplexed_async_connection().await?;
        tracing::info!("Connected to shared rate store");
        self.conn.store(Some(Arc::new(conn.clone())));
        Ok(conn)
    }

    fn window_ms(&self) -> u64 {
        self.window.as_millis().max(1) as u64
    }
}

#[async_trait]
impl RateStore for RedisStore {
    async fn acquire(&self, key: &ClientKey, limit: u64) -> Result<Admission, StoreError> {
        let mut conn = self.connection().await?;

        let mut invocation = self.script.key(self.full_key(key));
        invocation.arg(limit).arg(self.window_ms());
        let reply: RedisResult<(i64, i64, i64)> = invocation.invoke_async(&mut conn).await;

        let (admitted, count, ttl_ms) = match reply {
            Ok(reply) => reply,
            Err(e) => {
                self.conn.store(None);
                return Err(e.into());
            }
        };

        match admitted {
            1 => Ok(Admission::Admitted {
                count: count.max(0) as u64,
            }),
            0 => Ok(Admission::Rejected {
                retry_after: (ttl_ms > 0).then(|| Duration::from_millis(ttl_ms as u64)),
            }),
            other => Err(StoreError::Protocol(format!("admitted flag {}", other))),
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
