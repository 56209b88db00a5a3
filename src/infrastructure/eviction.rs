//! LRU eviction policy

use tracing::debug;

use crate::domain::DomainResult;
use crate::domain::cache::{Backend, CacheKey, EntryMetadata};

/// Enforces a per-layer byte cap by deleting least-recently-used entries.
///
/// Ordering comes from the `last_accessed` field in entry metadata, which
/// backends update on every successful `get` and never on `put`. The policy
/// runs synchronously after any put that grows the layer past its cap, and
/// re-reads `size_bytes()` between deletions so the invariant
/// "usage ≤ cap after the pass" holds regardless of how a backend accounts
/// for storage overhead.
#[derive(Debug, Clone, Copy)]
pub struct LruEvictionPolicy {
    max_size_bytes: u64,
}

impl LruEvictionPolicy {
    pub fn new(max_size_bytes: u64) -> Self {
        Self { max_size_bytes }
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Evicts until the backend fits the cap; returns the evicted keys so the
    /// caller can drop dependent state (e.g. semantic index entries).
    pub async fn enforce(&self, backend: &dyn Backend) -> DomainResult<Vec<CacheKey>> {
        if backend.size_bytes().await? <= self.max_size_bytes {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<(CacheKey, EntryMetadata)> = Vec::new();
        for key in backend.scan("").await? {
            if let Some(meta) = backend.stat(&key).await? {
                candidates.push((key, meta));
            }
        }

        // Oldest access first; creation time breaks ties for never-read entries
        candidates.sort_by_key(|(_, meta)| (meta.last_accessed, meta.created_at));

        let mut evicted = Vec::new();
        let mut queue = candidates.into_iter();

        while backend.size_bytes().await? > self.max_size_bytes {
            let Some((key, _)) = queue.next() else { break };

            if backend.delete(&key).await? {
                evicted.push(key);
            }
        }

        if !evicted.is_empty() {
            debug!(
                backend = backend.name(),
                evicted = evicted.len(),
                cap = self.max_size_bytes,
                "evicted least-recently-used entries"
            );
        }

        Ok(evicted)
    }
}
