//! Storage backend trait

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::DomainResult;
use crate::domain::cache::{CacheKey, EntryMetadata};

/// Byte-oriented key/value storage with TTL metadata.
///
/// One backend instance holds one cache layer. All implementations must be
/// safe for concurrent `get`/`put` from multiple callers; writes to a given
/// key are serialized, writes to different keys proceed independently.
///
/// `get` on an expired or corrupted entry returns `None` and opportunistically
/// deletes the stale entry (lazy expiry). A proactive sweep is available via
/// [`Backend::purge_expired`].
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    /// Fetches the value and metadata for `key`, bumping its access time.
    async fn get(&self, key: &CacheKey) -> DomainResult<Option<(Vec<u8>, EntryMetadata)>>;

    /// Stores `value` under `key` with the given time-to-live.
    async fn put(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> DomainResult<()>;

    /// Deletes the entry; returns whether it existed.
    async fn delete(&self, key: &CacheKey) -> DomainResult<bool>;

    /// Keys whose hex form starts with `prefix`. Finite and restartable; an
    /// empty prefix lists every key.
    async fn scan(&self, prefix: &str) -> DomainResult<Vec<CacheKey>>;

    /// Metadata for `key` without touching its access time. Expired entries
    /// are still reported so sweeps and eviction can see them.
    async fn stat(&self, key: &CacheKey) -> DomainResult<Option<EntryMetadata>>;

    /// Approximate bytes currently used by stored values.
    async fn size_bytes(&self) -> DomainResult<u64>;

    /// Removes expired entries; returns how many were dropped. Backends with
    /// queryable storage override this with a single sweep.
    async fn purge_expired(&self) -> DomainResult<usize> {
        let mut purged = 0;

        for key in self.scan("").await? {
            let expired = match self.stat(&key).await? {
                Some(meta) => meta.is_expired(),
                None => false,
            };

            if expired && self.delete(&key).await? {
                purged += 1;
            }
        }

        Ok(purged)
    }

    /// Removes every entry.
    async fn clear(&self) -> DomainResult<()>;

    /// Backend identifier for logs.
    fn name(&self) -> &'static str;
}
