//! Semantic index trait and types

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::DomainResult;
use crate::domain::cache::CacheKey;

/// One indexed embedding, back-referencing a response-layer cache entry.
///
/// The reference is weak: the entry may expire or be evicted independently,
/// so a search match must be validated against the backend before it counts
/// as a hit, and removed from the index when validation fails.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Response-layer key the embedding belongs to
    pub key: CacheKey,
    /// Embedding of the rendered prompt
    pub embedding: Vec<f32>,
    /// Hash of the embedded text, for duplicate suppression
    pub source_hash: u64,
}

impl IndexEntry {
    pub fn new(key: CacheKey, embedding: Vec<f32>, source_hash: u64) -> Self {
        Self {
            key,
            embedding,
            source_hash,
        }
    }
}

/// Best match returned by a semantic search.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticMatch {
    pub key: CacheKey,
    /// Cosine similarity in [−1, 1]
    pub similarity: f32,
}

/// Vector store for near-duplicate prompt lookup.
///
/// Inserts are append-only; there is no update-in-place. `search` returns the
/// single highest-similarity entry at or above `threshold`, or `None`.
/// Implementations may scan linearly or use an approximate structure — the
/// contract is the same either way.
#[async_trait]
pub trait SemanticIndex: Send + Sync + Debug {
    /// Adds an entry. Inserting an already-indexed key is a no-op.
    async fn insert(&self, entry: IndexEntry) -> DomainResult<()>;

    /// Highest-cosine-similarity entry with score ≥ `threshold`, if any.
    async fn search(&self, query: &[f32], threshold: f32) -> DomainResult<Option<SemanticMatch>>;

    /// Drops the entry for `key`; returns whether it was present.
    async fn remove(&self, key: &CacheKey) -> DomainResult<bool>;

    /// Number of indexed entries.
    async fn len(&self) -> DomainResult<usize>;

    /// Drops every entry.
    async fn clear(&self) -> DomainResult<()>;
}
