//! TTL-aware exact-match layer over a storage backend

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::timeout;
use tracing::warn;

use crate::domain::cache::{Backend, CacheKey, CacheLayer};

/// Exact-match cache for one layer.
///
/// Storage failures never propagate: a backend error or a blown operation
/// budget turns a lookup into a miss and a store into a dropped write, logged
/// at warning level. Generation must keep working with the cache degraded to
/// a no-op.
#[derive(Debug)]
pub struct ExactCache {
    layer: CacheLayer,
    backend: Arc<dyn Backend>,
    ttl: Duration,
    op_timeout: Duration,
}

impl ExactCache {
    pub fn new(
        layer: CacheLayer,
        backend: Arc<dyn Backend>,
        ttl: Duration,
        op_timeout: Duration,
    ) -> Self {
        Self {
            layer,
            backend,
            ttl,
            op_timeout,
        }
    }

    pub fn layer(&self) -> CacheLayer {
        self.layer
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Raw lookup. Expired entries are misses; the backend already drops
    /// them lazily, the metadata check here just never trusts it to.
    pub async fn lookup(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let result = match timeout(self.op_timeout, self.backend.get(key)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(layer = %self.layer, backend = self.backend.name(), "lookup timed out");
                return None;
            }
        };

        match result {
            Ok(Some((value, meta))) if !meta.is_expired() => Some(value),
            Ok(_) => None,
            Err(e) => {
                warn!(layer = %self.layer, error = %e, "lookup failed, treating as miss");
                None
            }
        }
    }

    /// Typed lookup; returns the value and its serialized size. An entry that
    /// fails to deserialize is deleted and treated as a miss.
    pub async fn lookup_typed<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<(T, u64)> {
        let bytes = self.lookup(key).await?;

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some((value, bytes.len() as u64)),
            Err(e) => {
                warn!(layer = %self.layer, key = %key, error = %e, "dropping corrupted entry");
                let _ = timeout(self.op_timeout, self.backend.delete(key)).await;
                None
            }
        }
    }

    /// Best-effort write with the layer TTL; returns whether it landed.
    pub async fn store(&self, key: &CacheKey, bytes: &[u8]) -> bool {
        match timeout(self.op_timeout, self.backend.put(key, bytes, self.ttl)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(layer = %self.layer, error = %e, "discarding failed cache write");
                false
            }
            Err(_) => {
                warn!(layer = %self.layer, backend = self.backend.name(), "cache write timed out");
                false
            }
        }
    }

    pub async fn store_typed<T: Serialize>(&self, key: &CacheKey, value: &T) -> bool {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.store(key, &bytes).await,
            Err(e) => {
                warn!(layer = %self.layer, error = %e, "discarding unserializable cache value");
                false
            }
        }
    }
}
