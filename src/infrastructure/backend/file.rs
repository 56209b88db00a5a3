//! Filesystem backend

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::DomainResult;
use crate::domain::cache::{Backend, CacheKey, EntryMetadata, unix_millis};
use crate::domain::error::CacheError;

/// On-disk representation: one JSON envelope per entry.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    created_at: u64,
    expires_at: u64,
    last_accessed: u64,
    /// base64 of the stored value
    value: String,
}

impl Envelope {
    fn new(value: &[u8], ttl: Duration) -> Self {
        let now = unix_millis();
        Self {
            created_at: now,
            expires_at: now.saturating_add(ttl.as_millis() as u64),
            last_accessed: now,
            value: STANDARD.encode(value),
        }
    }

    fn decode_value(&self) -> DomainResult<Vec<u8>> {
        STANDARD
            .decode(&self.value)
            .map_err(|e| CacheError::corrupted(format!("invalid value encoding: {}", e)))
    }

    fn metadata(&self, size_bytes: u64) -> EntryMetadata {
        EntryMetadata {
            created_at: self.created_at,
            expires_at: self.expires_at,
            last_accessed: self.last_accessed,
            size_bytes,
        }
    }
}

/// Content-addressed filesystem backend: one file per key, sharded into
/// subdirectories on the first two hex characters of the key so no single
/// directory grows unbounded.
///
/// Writes go through a temp file and an atomic rename; a put never leaves a
/// half-written entry visible. Unreadable envelopes are deleted on access and
/// treated as a miss.
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
}

/// Process-unique suffix for temp files so concurrent writers to the same
/// key never share one.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

impl FileBackend {
    pub async fn new(root: impl Into<PathBuf>) -> DomainResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| CacheError::backend(format!("cannot create cache dir: {}", e)))?;
        Ok(Self { root })
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let hex = key.to_hex();
        self.root.join(&hex[..2]).join(hex)
    }

    async fn read_envelope(&self, path: &Path) -> DomainResult<Option<Envelope>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::backend(format!("read failed: {}", e))),
        };

        match serde_json::from_slice(&bytes) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "dropping corrupted cache file");
                let _ = tokio::fs::remove_file(path).await;
                Ok(None)
            }
        }
    }

    async fn write_envelope(&self, path: &Path, envelope: &Envelope) -> DomainResult<()> {
        let data = serde_json::to_vec(envelope)
            .map_err(|e| CacheError::backend(format!("serialize failed: {}", e)))?;

        let tmp = path.with_extension(format!("tmp{}", TMP_COUNTER.fetch_add(1, Ordering::Relaxed)));
        tokio::fs::write(&tmp, &data)
            .await
            .map_err(|e| CacheError::backend(format!("write failed: {}", e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| CacheError::backend(format!("rename failed: {}", e)))?;

        Ok(())
    }

    async fn shard_dirs(&self) -> DomainResult<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| CacheError::backend(format!("list failed: {}", e)))?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| CacheError::backend(format!("list failed: {}", e)))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                dirs.push(entry.path());
            }
        }

        Ok(dirs)
    }
}

#[async_trait]
impl Backend for FileBackend {
    async fn get(&self, key: &CacheKey) -> DomainResult<Option<(Vec<u8>, EntryMetadata)>> {
        let path = self.entry_path(key);

        let mut envelope = match self.read_envelope(&path).await? {
            Some(envelope) => envelope,
            None => return Ok(None),
        };

        if unix_millis() >= envelope.expires_at {
            let _ = tokio::fs::remove_file(&path).await;
            return Ok(None);
        }

        let value = match envelope.decode_value() {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "dropping corrupted cache entry");
                let _ = tokio::fs::remove_file(&path).await;
                return Ok(None);
            }
        };

        // Persist the access time for LRU ordering; losing this write only
        // skews eviction order, so failures are not surfaced.
        envelope.last_accessed = unix_millis();
        if let Err(e) = self.write_envelope(&path, &envelope).await {
            warn!(key = %key, error = %e, "failed to record access time");
        }

        let meta = envelope.metadata(value.len() as u64);
        Ok(Some((value, meta)))
    }

    async fn put(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> DomainResult<()> {
        let path = self.entry_path(key);

        if let Some(shard) = path.parent() {
            tokio::fs::create_dir_all(shard)
                .await
                .map_err(|e| CacheError::backend(format!("cannot create shard dir: {}", e)))?;
        }

        self.write_envelope(&path, &Envelope::new(value, ttl)).await
    }

    async fn delete(&self, key: &CacheKey) -> DomainResult<bool> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::backend(format!("delete failed: {}", e))),
        }
    }

    async fn scan(&self, prefix: &str) -> DomainResult<Vec<CacheKey>> {
        let mut keys = Vec::new();

        for shard in self.shard_dirs().await? {
            // Shard name is the first two hex chars; skip shards the prefix
            // can never match.
            if prefix.len() >= 2 {
                let shard_name = shard.file_name().and_then(|n| n.to_str()).unwrap_or("");
                if !prefix.starts_with(shard_name) {
                    continue;
                }
            }

            let mut read_dir = tokio::fs::read_dir(&shard)
                .await
                .map_err(|e| CacheError::backend(format!("list failed: {}", e)))?;

            while let Some(entry) = read_dir
                .next_entry()
                .await
                .map_err(|e| CacheError::backend(format!("list failed: {}", e)))?
            {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };

                // Temp files and strays fail hex parsing and are skipped
                if let Ok(key) = CacheKey::from_hex(name) {
                    if name.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }

        Ok(keys)
    }

    async fn stat(&self, key: &CacheKey) -> DomainResult<Option<EntryMetadata>> {
        let path = self.entry_path(key);

        match self.read_envelope(&path).await? {
            Some(envelope) => {
                let size = envelope.decode_value().map(|v| v.len() as u64).unwrap_or(0);
                Ok(Some(envelope.metadata(size)))
            }
            None => Ok(None),
        }
    }

    async fn size_bytes(&self) -> DomainResult<u64> {
        let mut total = 0;

        for shard in self.shard_dirs().await? {
            let mut read_dir = tokio::fs::read_dir(&shard)
                .await
                .map_err(|e| CacheError::backend(format!("list failed: {}", e)))?;

            while let Some(entry) = read_dir
                .next_entry()
                .await
                .map_err(|e| CacheError::backend(format!("list failed: {}", e)))?
            {
                if let Ok(meta) = entry.metadata().await {
                    total += meta.len();
                }
            }
        }

        Ok(total)
    }

    async fn clear(&self) -> DomainResult<()> {
        tokio::fs::remove_dir_all(&self.root)
            .await
            .map_err(|e| CacheError::backend(format!("clear failed: {}", e)))?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CacheError::backend(format!("cannot recreate cache dir: {}", e)))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
