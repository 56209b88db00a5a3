//! In-memory backend

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::DomainResult;
use crate::domain::cache::{Backend, CacheKey, EntryMetadata, unix_millis};

#[derive(Debug)]
struct StoredEntry {
    value: Vec<u8>,
    created_at: u64,
    expires_at: u64,
    /// Millis since epoch; atomic so reads can bump it under the shard's
    /// read lock.
    last_accessed: AtomicU64,
}

impl StoredEntry {
    fn new(value: Vec<u8>, ttl: Duration) -> Self {
        let now = unix_millis();
        Self {
            value,
            created_at: now,
            expires_at: now.saturating_add(ttl.as_millis() as u64),
            last_accessed: AtomicU64::new(now),
        }
    }

    fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            created_at: self.created_at,
            expires_at: self.expires_at,
            last_accessed: self.last_accessed.load(Ordering::Relaxed),
            size_bytes: self.value.len() as u64,
        }
    }
}

/// Process-lifetime in-memory backend.
///
/// Entries live in a sharded concurrent map, so writes to different keys
/// proceed independently and reads never take a cache-wide lock. Byte usage
/// is tracked with an atomic counter kept in step with inserts and removals.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<CacheKey, StoredEntry>,
    used_bytes: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn remove_entry(&self, key: &CacheKey) -> bool {
        match self.entries.remove(key) {
            Some((_, entry)) => {
                self.used_bytes
                    .fetch_sub(entry.value.len() as u64, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, key: &CacheKey) -> DomainResult<Option<(Vec<u8>, EntryMetadata)>> {
        let now = unix_millis();

        // The shard guard must be dropped before removal or the remove call
        // deadlocks on the same shard.
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_expired_at(now) => true,
            Some(entry) => {
                entry.last_accessed.store(now, Ordering::Relaxed);
                return Ok(Some((entry.value.clone(), entry.metadata())));
            }
            None => return Ok(None),
        };

        if expired {
            self.remove_entry(key);
        }

        Ok(None)
    }

    async fn put(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> DomainResult<()> {
        let entry = StoredEntry::new(value.to_vec(), ttl);

        self.used_bytes
            .fetch_add(value.len() as u64, Ordering::Relaxed);

        if let Some(old) = self.entries.insert(*key, entry) {
            self.used_bytes
                .fetch_sub(old.value.len() as u64, Ordering::Relaxed);
        }

        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> DomainResult<bool> {
        Ok(self.remove_entry(key))
    }

    async fn scan(&self, prefix: &str) -> DomainResult<Vec<CacheKey>> {
        Ok(self
            .entries
            .iter()
            .map(|entry| *entry.key())
            .filter(|key| key.to_hex().starts_with(prefix))
            .collect())
    }

    async fn stat(&self, key: &CacheKey) -> DomainResult<Option<EntryMetadata>> {
        Ok(self.entries.get(key).map(|entry| entry.metadata()))
    }

    async fn size_bytes(&self) -> DomainResult<u64> {
        Ok(self.used_bytes.load(Ordering::Relaxed))
    }

    async fn purge_expired(&self) -> DomainResult<usize> {
        let now = unix_millis();
        let expired: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|entry| entry.is_expired_at(now))
            .map(|entry| *entry.key())
            .collect();

        let mut purged = 0;
        for key in expired {
            if self.remove_entry(&key) {
                purged += 1;
            }
        }

        Ok(purged)
    }

    async fn clear(&self) -> DomainResult<()> {
        self.entries.clear();
        self.used_bytes.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::KeyGenerator;

    fn keys() -> KeyGenerator {
        KeyGenerator::new()
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let backend = MemoryBackend::new();
        let key = keys().input_key("a");

        backend
            .put(&key, b"value", Duration::from_secs(60))
            .await
            .unwrap();

        let (value, meta) = backend.get(&key).await.unwrap().unwrap();
        assert_eq!(value, b"value");
        assert_eq!(meta.size_bytes, 5);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let backend = MemoryBackend::new();
        let result = backend.get(&keys().input_key("missing")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry_is_lazy() {
        let backend = MemoryBackend::new();
        let key = keys().input_key("a");

        backend
            .put(&key, b"value", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(backend.get(&key).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(backend.get(&key).await.unwrap().is_none());
        // The expired entry was dropped on that access
        assert_eq!(backend.scan("").await.unwrap().len(), 0);
        assert_eq!(backend.size_bytes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ttl_boundary() {
        let backend = MemoryBackend::new();
        let key = keys().input_key("a");

        backend
            .put(&key, b"v", Duration::from_secs(1))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(backend.get(&key).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(backend.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let backend = MemoryBackend::new();
        let key = keys().input_key("a");

        backend
            .put(&key, b"value", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(backend.delete(&key).await.unwrap());
        assert!(!backend.delete(&key).await.unwrap());
        assert_eq!(backend.size_bytes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_overwrite_adjusts_usage() {
        let backend = MemoryBackend::new();
        let key = keys().input_key("a");

        backend
            .put(&key, b"four", Duration::from_secs(60))
            .await
            .unwrap();
        backend
            .put(&key, b"eight-by", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(backend.size_bytes().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_scan_with_prefix() {
        let backend = MemoryBackend::new();
        let key = keys().input_key("a");

        backend
            .put(&key, b"v", Duration::from_secs(60))
            .await
            .unwrap();

        let prefix = &key.to_hex()[..4];
        assert_eq!(backend.scan(prefix).await.unwrap(), vec![key]);
        assert!(backend.scan("~~~~").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stat_does_not_touch_access_time() {
        let backend = MemoryBackend::new();
        let key = keys().input_key("a");

        backend
            .put(&key, b"v", Duration::from_secs(60))
            .await
            .unwrap();

        let before = backend.stat(&key).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let after = backend.stat(&key).await.unwrap().unwrap();
        assert_eq!(before.last_accessed, after.last_accessed);

        // A get does move it
        tokio::time::sleep(Duration::from_millis(20)).await;
        backend.get(&key).await.unwrap();
        let touched = backend.stat(&key).await.unwrap().unwrap();
        assert!(touched.last_accessed > before.last_accessed);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let backend = MemoryBackend::new();

        backend
            .put(&keys().input_key("old"), b"v", Duration::from_millis(0))
            .await
            .unwrap();
        backend
            .put(&keys().input_key("new"), b"v", Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(backend.purge_expired().await.unwrap(), 1);
        assert_eq!(backend.scan("").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let backend = MemoryBackend::new();

        for i in 0..4 {
            backend
                .put(
                    &keys().input_key(&format!("k{}", i)),
                    b"v",
                    Duration::from_secs(60),
                )
                .await
                .unwrap();
        }

        backend.clear().await.unwrap();
        assert_eq!(backend.scan("").await.unwrap().len(), 0);
        assert_eq!(backend.size_bytes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_writers_distinct_keys() {
        let backend = std::sync::Arc::new(MemoryBackend::new());
        let mut handles = Vec::new();

        for i in 0..32 {
            let backend = backend.clone();
            handles.push(tokio::spawn(async move {
                let key = KeyGenerator::new().input_key(&format!("key-{}", i));
                let value = format!("value-{}", i);
                backend
                    .put(&key, value.as_bytes(), Duration::from_secs(60))
                    .await
                    .unwrap();
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..32 {
            let key = KeyGenerator::new().input_key(&format!("key-{}", i));
            let (value, _) = backend.get(&key).await.unwrap().unwrap();
            assert_eq!(value, format!("value-{}", i).into_bytes());
        }
    }
}
