//! Process-wide TTL cache implementations.
//!
//! The Redis implementation relies on `SETEX` for single-writer-per-key
//! atomicity; the in-memory one backs tests and single-process runs.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::domain::errors::SniperError;
use crate::domain::ports::TtlCache;

/// Cache key helpers; one place so the schema stays consistent.
pub mod keys {
    use solana_sdk::pubkey::Pubkey;
    use uuid::Uuid;

    pub fn order(id: Uuid) -> String {
        format!("order:{id}")
    }

    pub fn honeypot(mint: &Pubkey) -> String {
        format!("honeypot:{mint}")
    }

    pub fn fee_market(scope: Option<&Pubkey>) -> String {
        match scope {
            Some(account) => format!("fee_market:{account}"),
            None => "fee_market:global".to_string(),
        }
    }

    pub fn metadata(mint: &Pubkey) -> String {
        format!("metadata:{mint}")
    }

    pub fn lock(lp_mint: &Pubkey) -> String {
        format!("lock:{lp_mint}")
    }
}

pub struct RedisTtlCache {
    client: redis::Client,
}

impl RedisTtlCache {
    pub fn new(url: &str) -> Result<Self, SniperError> {
        let client = redis::Client::open(url)
            .map_err(|e| SniperError::Validation(format!("invalid redis url: {e}")))?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::Connection, SniperError> {
        self.client
            .get_async_connection()
            .await
            .map_err(|e| SniperError::Network(format!("redis connect: {e}")))
    }
}

#[async_trait]
impl TtlCache for RedisTtlCache {
    async fn get(&self, key: &str) -> Result<Option<String>, SniperError> {
        let mut conn = self.conn().await?;
        conn.get(key)
            .await
            .map_err(|e| SniperError::Network(format!("redis get {key}: {e}")))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), SniperError> {
        let mut conn = self.conn().await?;
        conn.set_ex(key, value, ttl_secs as usize)
            .await
            .map_err(|e| SniperError::Network(format!("redis setex {key}: {e}")))
    }

    async fn delete(&self, key: &str) -> Result<(), SniperError> {
        let mut conn = self.conn().await?;
        conn.del(key)
            .await
            .map_err(|e| SniperError::Network(format!("redis del {key}: {e}")))
    }
}

struct CacheEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-memory TTL cache with the same freshness contract as Redis.
#[derive(Clone, Default)]
pub struct InMemoryTtlCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl InMemoryTtlCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TtlCache for InMemoryTtlCache {
    async fn get(&self, key: &str) -> Result<Option<String>, SniperError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Utc::now() => Ok(Some(entry.value.clone())),
            _ => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), SniperError> {
        let mut entries = self.entries.write().await;
        // Opportunistic sweep so dead keys do not pile up.
        if entries.len() > 4_096 {
            let now = Utc::now();
            entries.retain(|_, e| e.expires_at > now);
            debug!("cache sweep, {} live entries remain", entries.len());
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: Utc::now() + ChronoDuration::seconds(ttl_secs as i64),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), SniperError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Claim token helper shared by single-flight callers.
pub fn claimant_id() -> String {
    format!("pipeline-{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::pubkey::Pubkey;

    #[tokio::test]
    async fn test_get_within_ttl_returns_last_write() {
        let cache = InMemoryTtlCache::new();
        cache.set_ex("k", "v1", 60).await.unwrap();
        cache.set_ex("k", "v2", 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v2".to_string()));
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_miss() {
        let cache = InMemoryTtlCache::new();
        cache.set_ex("k", "v", 0).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_removes_entry() {
        let cache = InMemoryTtlCache::new();
        cache.set_ex("k", "v", 60).await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[test]
    fn test_key_schema() {
        let id = Uuid::nil();
        let mint = Pubkey::new_unique();
        assert_eq!(
            keys::order(id),
            "order:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(keys::honeypot(&mint), format!("honeypot:{mint}"));
        assert_eq!(keys::fee_market(None), "fee_market:global");
        assert_eq!(keys::fee_market(Some(&mint)), format!("fee_market:{mint}"));
        assert_eq!(keys::lock(&mint), format!("lock:{mint}"));
    }
}
