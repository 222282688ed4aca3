//! TTL-bounded mutual exclusion for processing passes.
//!
//! A holder that crashes mid-pass never releases; the TTL lets the next
//! pass proceed once it expires. Every acquire hands out a fresh token and
//! release only deletes the lock while that token still owns it, so a pass
//! that overran its TTL cannot free a lock someone else has since taken.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::Script;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;
use uuid::Uuid;

use herald_common::error::AppError;

use crate::clock::Clock;

/// Compare-and-delete: only the holder of `ARGV[1]` may drop the key.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

#[async_trait]
pub trait QueueLock: Send + Sync {
    /// Try to take `name` for `ttl`. Returns the holder token, or `None`
    /// when someone else holds it.
    async fn acquire(&self, name: &str, ttl: Duration) -> Result<Option<String>, AppError>;

    /// Release `name` if `token` still holds it. Returns `false` when the
    /// lock had already expired or passed to another holder.
    async fn release(&self, name: &str, token: &str) -> Result<bool, AppError>;
}

fn new_token() -> String {
    Uuid::new_v4().to_string()
}

/// Redis-backed lock using `SET key token NX EX ttl`.
pub struct RedisLock {
    redis: ConnectionManager,
    release: Script,
}

impl RedisLock {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            release: Script::new(RELEASE_SCRIPT),
        }
    }
}

#[async_trait]
impl QueueLock for RedisLock {
    async fn acquire(&self, name: &str, ttl: Duration) -> Result<Option<String>, AppError> {
        let mut conn = self.redis.clone();
        let token = new_token();
        // Some("OK") when set, None when the key already exists
        let result: Option<String> = redis::cmd("SET")
            .arg(name)
            .arg(&token)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::Lock(format!("Failed to acquire {}: {}", name, e)))?;
        Ok(result.map(|_| token))
    }

    async fn release(&self, name: &str, token: &str) -> Result<bool, AppError> {
        let mut conn = self.redis.clone();
        let deleted: i64 = self
            .release
            .key(name)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::Lock(format!("Failed to release {}: {}", name, e)))?;
        Ok(deleted == 1)
    }
}

/// Process-local lock honouring TTL expiry against the injected clock.
pub struct InMemoryLock {
    /// name -> (token, expires_at)
    held: Mutex<HashMap<String, (String, i64)>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryLock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub async fn is_held(&self, name: &str) -> bool {
        let now = self.clock.now();
        self.held
            .lock()
            .await
            .get(name)
            .is_some_and(|(_, expires_at)| *expires_at > now)
    }
}

#[async_trait]
impl QueueLock for InMemoryLock {
    async fn acquire(&self, name: &str, ttl: Duration) -> Result<Option<String>, AppError> {
        let now = self.clock.now();
        let mut held = self.held.lock().await;
        if let Some((_, expires_at)) = held.get(name)
            && *expires_at > now
        {
            return Ok(None);
        }
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let token = new_token();
        held.insert(name.to_string(), (token.clone(), now.saturating_add(ttl_secs)));
        Ok(Some(token))
    }

    async fn release(&self, name: &str, token: &str) -> Result<bool, AppError> {
        let mut held = self.held.lock().await;
        match held.get(name) {
            Some((owner, _)) if owner == token => {
                held.remove(name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
