//! Static knowledge cache
//!
//! Holds large, rarely-changing context (world data, product catalogs) so
//! it can be answered against without a tier search. Records expire after
//! their TTL; expiry is checked lazily on read. Capacity is bounded with
//! LRU eviction.

use std::num::NonZeroUsize;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use lru::LruCache;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::error::{Result, StrataError};

/// Key used for the world data cache created at initialization
pub const WORLD_CACHE_KEY: &str = "world";

/// One cached block of context
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    pub key: String,
    /// Display name, `{key}_cache_{created_at_millis}`
    pub name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub ttl: TimeDelta,
}

impl CacheRecord {
    fn new(key: &str, content: String, ttl: TimeDelta, now: DateTime<Utc>) -> Self {
        Self {
            key: key.to_string(),
            name: format!("{key}_cache_{}", now.timestamp_millis()),
            content,
            created_at: now,
            ttl,
        }
    }

    /// Usable while `now - created_at < ttl`
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at) < self.ttl
    }
}

/// Listing entry returned by [`StaticCache::list`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub key: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub ttl_ms: i64,
    pub expired: bool,
}

pub struct StaticCache {
    records: TokioMutex<LruCache<String, CacheRecord>>,
    default_ttl: TimeDelta,
}

impl StaticCache {
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            records: TokioMutex::new(LruCache::new(capacity)),
            default_ttl: to_delta(Duration::from_millis(config.ttl_ms)),
        }
    }

    /// Store `content` under `key` with the default TTL, replacing any
    /// existing record
    pub async fn create_cache(&self, key: &str, content: String) -> CacheRecord {
        let record = CacheRecord::new(key, content, self.default_ttl, Utc::now());
        self.records
            .lock()
            .await
            .put(key.to_string(), record.clone());
        info!(key, name = %record.name, "Cache created");
        record
    }

    /// Cache world data as pretty-printed JSON under [`WORLD_CACHE_KEY`]
    pub async fn create_world_cache(&self, world_data: &Value) -> Result<CacheRecord> {
        let content = serde_json::to_string_pretty(world_data)
            .map_err(|e| StrataError::Serialization(e.to_string()))?;
        Ok(self.create_cache(WORLD_CACHE_KEY, content).await)
    }

    /// Fresh record for `key`. Expired records are removed.
    pub async fn get(&self, key: &str) -> Option<CacheRecord> {
        self.get_at(key, Utc::now()).await
    }

    /// [`StaticCache::get`] evaluated at an explicit instant
    pub async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<CacheRecord> {
        let mut records = self.records.lock().await;
        let record = records.get(key)?.clone();
        if record.is_fresh_at(now) {
            Some(record)
        } else {
            debug!(key, "Cache record expired");
            records.pop(key);
            None
        }
    }

    /// Fresh record for `key`, or an error naming why there is none
    pub async fn require(&self, key: &str) -> Result<CacheRecord> {
        let mut records = self.records.lock().await;
        let record = records
            .get(key)
            .cloned()
            .ok_or_else(|| StrataError::Cache(format!("Cache '{key}' not found")))?;
        if !record.is_fresh_at(Utc::now()) {
            records.pop(key);
            return Err(StrataError::Cache(format!("Cache '{key}' expired")));
        }
        Ok(record)
    }

    /// Restart a record's timer, optionally with a new TTL. Returns false
    /// when the key is unknown.
    pub async fn refresh(&self, key: &str, ttl: Option<Duration>) -> bool {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(key) else {
            return false;
        };
        record.created_at = Utc::now();
        record.ttl = ttl.map(to_delta).unwrap_or(self.default_ttl);
        info!(key, "Cache refreshed");
        true
    }

    /// Every record, expired ones included, most recently used first
    pub async fn list(&self) -> Vec<CacheStatus> {
        let now = Utc::now();
        self.records
            .lock()
            .await
            .iter()
            .map(|(key, record)| CacheStatus {
                key: key.clone(),
                name: record.name.clone(),
                created_at: record.created_at,
                ttl_ms: record.ttl.num_milliseconds(),
                expired: !record.is_fresh_at(now),
            })
            .collect()
    }

    /// Remove one record. Returns false when the key is unknown.
    pub async fn clear(&self, key: &str) -> bool {
        let removed = self.records.lock().await.pop(key).is_some();
        if removed {
            info!(key, "Cache cleared");
        }
        removed
    }

    pub async fn clear_all(&self) {
        self.records.lock().await.clear();
        info!("All caches cleared");
    }
}

fn to_delta(ttl: Duration) -> TimeDelta {
    TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX)
}
