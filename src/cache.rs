//! Cache tiers behind an injected [`CacheStore`] seam
//!
//! Every entry is a postcard-serialized `StoredEntry` carrying its own expiry
//! timestamp; stale entries are purged lazily on read. Stores are injected
//! into their consumers (resolver, routing) so cache behavior stays mockable
//! and no process-wide state is hidden.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use fjall::Keyspace;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task;

#[derive(Serialize, Deserialize)]
struct StoredEntry<T> {
    value: T,
    expires_at: u64, // Unix timestamp (seconds)
}

/// Byte-level cache store with TTL-carrying entries
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put_bytes(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

fn now_secs() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Stores a serializable value with a time-to-live (TTL).
#[tracing::instrument(name = "put_cache", level = "debug", skip(store, value))]
pub async fn put<T: Serialize + Send + Debug>(
    store: &dyn CacheStore,
    key: &str,
    value: T,
    ttl: Duration,
) -> Result<()> {
    let expires_at = SystemTime::now()
        .checked_add(ttl)
        .ok_or(anyhow!("TTL overflow"))?
        .duration_since(UNIX_EPOCH)?
        .as_secs();
    let entry = StoredEntry { value, expires_at };
    let bytes = postcard::to_stdvec(&entry)?;
    store.put_bytes(key, bytes).await
}

/// Retrieves a value if it exists and has not expired.
/// Returns `None` for cache misses or expired entries.
#[tracing::instrument(name = "query_cache", level = "debug", skip(store))]
pub async fn get<T: DeserializeOwned + Send>(
    store: &dyn CacheStore,
    key: &str,
) -> Result<Option<T>> {
    let Some(bytes) = store.get_bytes(key).await? else {
        tracing::debug!("Key not found");
        return Ok(None);
    };

    let entry: StoredEntry<T> = postcard::from_bytes(&bytes)?;
    if now_secs()? < entry.expires_at {
        tracing::debug!("Key found and still fresh");
        Ok(Some(entry.value))
    } else {
        tracing::debug!("Key found but expired");
        store.remove(key).await?;
        Ok(None)
    }
}

/// Disk-backed cache store on a fjall keyspace
pub struct PersistentCache {
    store: Keyspace,
}

fn get_from_store(store: Keyspace, key: Vec<u8>) -> Result<Option<Vec<u8>>> {
    Ok(store.get(key)?.map(|v| v.to_vec()))
}

impl PersistentCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = fjall::Database::builder(&path).open()?;
        let items = db.keyspace("cache", fjall::KeyspaceCreateOptions::default)?;
        Ok(PersistentCache { store: items })
    }
}

#[async_trait]
impl CacheStore for PersistentCache {
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let store = self.store.clone();
        let key_bytes = key.as_bytes().to_vec();
        task::spawn_blocking(move || get_from_store(store, key_bytes)).await?
    }

    async fn put_bytes(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let store = self.store.clone();
        let key = key.as_bytes().to_vec();
        let _ = task::spawn_blocking(move || store.insert(key, value)).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let store = self.store.clone();
        let key = key.as_bytes().to_vec();
        let _ = task::spawn_blocking(move || store.remove(key)).await?;
        Ok(())
    }
}

/// In-memory cache store for tests and cacheless runs
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("Cache mutex poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    async fn put_bytes(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("Cache mutex poisoned"))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("Cache mutex poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_round_trip() {
        let store = MemoryCache::new();
        put(&store, "answer", 42u64, Duration::from_secs(60))
            .await
            .unwrap();
        let value: Option<u64> = get(&store, "answer").await.unwrap();
        assert_eq!(value, Some(42));
    }

    #[tokio::test]
    async fn test_miss_returns_none() {
        let store = MemoryCache::new();
        let value: Option<u64> = get(&store, "missing").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_purged_on_read() {
        let store = MemoryCache::new();
        put(&store, "stale", "old".to_string(), Duration::from_secs(0))
            .await
            .unwrap();
        // Entry expires immediately
        let value: Option<String> = get(&store, "stale").await.unwrap();
        assert_eq!(value, None);
        // And has been removed from the underlying store
        assert!(store.get_bytes("stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemoryCache::new();
        put(&store, "k", 7u32, Duration::from_secs(60))
            .await
            .unwrap();
        store.remove("k").await.unwrap();
        let value: Option<u32> = get(&store, "k").await.unwrap();
        assert_eq!(value, None);
    }
}
